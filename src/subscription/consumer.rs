use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::subscription::{
    ack::{Acknowledger, RetryPolicy},
    config::ConsumerConfig,
    dispatch::{DispatchQueue, EventHandler, QueueState},
    error::{Error, Result},
    hooks::{ConsumerHooks, PollReport},
    poller::Poller,
    transport::{HttpTransport, Transport},
    types::Event,
};

/// Lifecycle of a consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not polling and nothing in flight
    Stopped,
    /// Polling and dispatching events
    Running,
    /// No new polls; waiting for in-flight events to finish
    Draining,
}

/// Components created by one `start()`
///
/// Kept after the session stops so the next `start()` can wait for a poll
/// loop that is still finishing its last fetch.
struct Session {
    id: u64,
    queue: Arc<DispatchQueue>,
    stop: watch::Sender<bool>,
    poller: JoinHandle<()>,
}

/// Competing consumer for one subscription group
///
/// Polls the backend for batches sized to free capacity, runs the handler
/// for every event with bounded concurrency and acks or nacks each one.
///
/// # Example
///
/// ```no_run
/// use competing_consumer::subscription::{handler_fn, Consumer, ConsumerConfig, Event};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ConsumerConfig::new("orders", "billing")
///         .with_base_url("http://localhost:2113")
///         .with_concurrency(4);
///
///     let mut consumer = Consumer::new(config, handler_fn(|event: Event| async move {
///         println!("Processing {}", event.event_id);
///         Ok(())
///     }))?;
///
///     consumer.on_error(|err| eprintln!("consumer error: {}", err));
///
///     consumer.start()?;
///     tokio::signal::ctrl_c().await?;
///     consumer.stop().await;
///     Ok(())
/// }
/// ```
pub struct Consumer {
    config: ConsumerConfig,
    transport: Arc<dyn Transport>,
    handler: EventHandler,
    hooks: ConsumerHooks,
    run_state: watch::Sender<RunState>,
    session: Mutex<Option<Session>>,
}

impl Consumer {
    /// Create a consumer talking to the backend over HTTP
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the stream, group or base address
    /// is missing or invalid.
    pub fn new(config: ConsumerConfig, handler: EventHandler) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::from_config(&config)?;
        Self::with_transport(config, Arc::new(transport), handler)
    }

    /// Create a consumer on top of any transport
    pub fn with_transport(
        config: ConsumerConfig,
        transport: Arc<dyn Transport>,
        handler: EventHandler,
    ) -> Result<Self> {
        config.validate()?;
        let (run_state, _) = watch::channel(RunState::Stopped);

        Ok(Self {
            config,
            transport,
            handler,
            hooks: ConsumerHooks::new(),
            run_state,
            session: Mutex::new(None),
        })
    }

    /// Called for every event right before its handler runs
    pub fn on_event<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.hooks.on_event.push(Arc::new(hook));
        self
    }

    /// Called right before an ack is sent
    pub fn on_ack<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.hooks.on_ack.push(Arc::new(hook));
        self
    }

    /// Called right before a nack is sent
    pub fn on_nack<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.hooks.on_nack.push(Arc::new(hook));
        self
    }

    /// Called for fetch failures, handler failures and abandoned acks/nacks
    pub fn on_error<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.hooks.on_error.push(Arc::new(hook));
        self
    }

    /// Called once per completed poll attempt, successful or not
    pub fn on_poll<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&PollReport) + Send + Sync + 'static,
    {
        self.hooks.on_poll.push(Arc::new(hook));
        self
    }

    /// Called whenever the dispatch queue becomes empty
    pub fn on_drain<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hooks.on_drain.push(Arc::new(hook));
        self
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    pub fn run_state(&self) -> RunState {
        *self.run_state.borrow()
    }

    /// Pending and in-flight counts of the current session
    pub fn queue_state(&self) -> QueueState {
        queue_state_of(&self.session())
    }

    /// Begin polling
    ///
    /// Hooks registered so far are captured here; later registrations apply
    /// from the next `start()`. If the previous session's poll loop is still
    /// waiting on a fetch, the new loop starts once that fetch completes. Must
    /// be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] unless the consumer is stopped.
    pub fn start(&self) -> Result<()> {
        let mut session = self.session();
        if self.run_state() != RunState::Stopped {
            return Err(Error::AlreadyRunning);
        }
        self.run_state.send_replace(RunState::Running);

        let previous = session.take();
        let id = previous.as_ref().map_or(0, |previous| previous.id + 1);
        let (stop, stop_rx) = watch::channel(false);

        let hooks = Arc::new(self.hooks.clone());
        let acknowledger = Acknowledger::new(
            Arc::clone(&self.transport),
            Arc::clone(&hooks),
            RetryPolicy {
                max_attempts: self.config.ack_retry_attempts,
                delay: self.config.ack_retry_delay,
            },
        );
        let queue = Arc::new(DispatchQueue::new(
            self.config.concurrency,
            Arc::clone(&self.handler),
            acknowledger,
            Arc::clone(&hooks),
        ));
        let poller = Poller::new(
            &self.config,
            Arc::clone(&self.transport),
            Arc::clone(&queue),
            hooks,
            stop_rx,
        );

        let poller = tokio::spawn(async move {
            if let Some(previous) = previous {
                if !previous.poller.is_finished() {
                    debug!("Waiting for the previous poll loop to finish its fetch");
                }
                if let Err(e) = previous.poller.await {
                    error!(error = %e, "Previous poll loop terminated abnormally");
                }
            }
            poller.run().await;
        });

        *session = Some(Session {
            id,
            queue,
            stop,
            poller,
        });

        info!(
            stream = %self.config.stream,
            group = %self.config.group,
            "Consumer started"
        );
        Ok(())
    }

    /// Stop polling and wait for every accepted event to be acked or nacked
    ///
    /// The idle poll timer is cancelled at once. A fetch already on the wire is
    /// not awaited: it finishes in the background, its events are left to the
    /// backend and its poll loop exits without fetching again. Handlers and
    /// ack/nack retries in flight run to completion. There is no timeout: a
    /// handler that never returns keeps this future pending.
    ///
    /// Resolves immediately when the consumer is already stopped. Concurrent
    /// callers all resolve once draining completes, and dropping this future
    /// early leaves the consumer draining until the next `stop()` completes.
    pub async fn stop(&self) {
        let (id, queue) = {
            let session = self.session();
            let state = self.run_state();
            if state == RunState::Stopped {
                return;
            }
            if state == RunState::Running {
                let queue_state = queue_state_of(&session);
                info!(
                    stream = %self.config.stream,
                    group = %self.config.group,
                    pending = queue_state.pending,
                    in_flight = queue_state.in_flight,
                    "Stopping consumer, draining in-flight events"
                );
                self.run_state.send_replace(RunState::Draining);
            }
            match session.as_ref() {
                Some(session) => {
                    session.stop.send_replace(true);
                    (session.id, Arc::clone(&session.queue))
                }
                None => return,
            }
        };

        queue.drained().await;

        let session = self.session();
        let current = session.as_ref().map(|session| session.id);
        if self.run_state() == RunState::Draining && current == Some(id) {
            self.run_state.send_replace(RunState::Stopped);
            info!(
                stream = %self.config.stream,
                group = %self.config.group,
                "Consumer stopped"
            );
        }
    }

    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn queue_state_of(session: &Option<Session>) -> QueueState {
    session
        .as_ref()
        .map(|session| session.queue.state())
        .unwrap_or_default()
}
