//! Bounded-concurrency dispatch of events to the user handler
//!
//! Every submitted event runs on its own task, but at most `concurrency`
//! of them hold a permit at once. A permit covers the handler call and the
//! ack/nack that follows it, so the ceiling bounds all per-event work.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::futures::Notified;
use tokio::sync::{watch, Notify, Semaphore};
use tracing::{debug, warn, Instrument};

use super::ack::Acknowledger;
use super::error::{Error, Result};
use super::hooks::ConsumerHooks;
use super::types::{AckKind, Event};

/// Type alias for event handler functions
///
/// Handlers take ownership of an event and resolve to `Ok(())` when it was
/// processed (the event is acked) or to an error (the event is nacked).
pub type EventHandler = Arc<dyn Fn(Event) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wrap an async function or closure as an [`EventHandler`]
///
/// # Example
///
/// ```
/// use competing_consumer::subscription::{handler_fn, Error, Event};
///
/// let handler = handler_fn(|event: Event| async move {
///     if event.event_type.as_deref() == Some("Poison") {
///         return Err(Error::handler("cannot process poison events"));
///     }
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> EventHandler
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |event| f(event).boxed())
}

/// Snapshot of the work held by a dispatch queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueState {
    /// Submitted, waiting for a permit
    pub pending: usize,
    /// Holding a permit (handler or ack/nack running)
    pub in_flight: usize,
}

impl QueueState {
    pub fn outstanding(&self) -> usize {
        self.pending + self.in_flight
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding() == 0
    }

    /// Free slots under `limit`, never negative
    pub fn capacity(&self, limit: usize) -> usize {
        limit.saturating_sub(self.outstanding())
    }
}

/// Runs the handler for each event and reports the outcome
pub struct DispatchQueue {
    handler: EventHandler,
    acknowledger: Acknowledger,
    hooks: Arc<ConsumerHooks>,
    permits: Semaphore,
    state: watch::Sender<QueueState>,
    slot_freed: Notify,
}

impl DispatchQueue {
    pub fn new(
        concurrency: usize,
        handler: EventHandler,
        acknowledger: Acknowledger,
        hooks: Arc<ConsumerHooks>,
    ) -> Self {
        let (state, _) = watch::channel(QueueState::default());
        Self {
            handler,
            acknowledger,
            hooks,
            permits: Semaphore::new(concurrency.max(1)),
            state,
            slot_freed: Notify::new(),
        }
    }

    /// Current pending and in-flight counts
    pub fn state(&self) -> QueueState {
        *self.state.borrow()
    }

    /// Watch the queue state as it changes
    pub fn subscribe(&self) -> watch::Receiver<QueueState> {
        self.state.subscribe()
    }

    /// Future resolving the next time an event finishes
    ///
    /// Only futures created before the event finishes are woken; a slot that
    /// frees while nobody is waiting leaves no trace.
    pub fn slot_freed(&self) -> Notified<'_> {
        self.slot_freed.notified()
    }

    /// Wait until nothing is pending or in flight
    pub async fn drained(&self) {
        let mut state = self.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = state.wait_for(QueueState::is_empty).await;
    }

    /// Accept one event; the handler runs exactly once for it
    pub fn submit(self: &Arc<Self>, event: Event) {
        self.state.send_modify(|state| state.pending += 1);

        let span = tracing::debug_span!("event", event_id = %event.event_id);
        let queue = Arc::clone(self);
        tokio::spawn(async move { queue.process(event).await }.instrument(span));
    }

    async fn process(&self, event: Event) {
        // The semaphore is never closed.
        let permit = self.permits.acquire().await.ok();
        self.state.send_modify(|state| {
            state.pending -= 1;
            state.in_flight += 1;
        });

        self.hooks.event_received(&event);

        let kind = match self.invoke(&event).await {
            Ok(()) => AckKind::Ack,
            Err(e) => {
                warn!(error = %e, "Handler failed, event will be nacked");
                self.hooks.error(&e);
                AckKind::Nack
            }
        };

        if let Err(e) = self.acknowledger.settle(&event, kind).await {
            debug!(error = %e, "Event finished without a successful acknowledgement");
        }

        let mut drained = false;
        self.state.send_modify(|state| {
            state.in_flight -= 1;
            drained = state.is_empty();
        });
        // Release only after the count drops so in_flight never exceeds the ceiling.
        drop(permit);

        if drained {
            debug!("Dispatch queue drained");
            self.hooks.drain();
        }
        self.slot_freed.notify_waiters();
    }

    async fn invoke(&self, event: &Event) -> Result<()> {
        let handler = Arc::clone(&self.handler);
        let owned = event.clone();
        match AssertUnwindSafe(async move { handler(owned).await })
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => Err(Error::HandlerPanicked {
                event_id: event.event_id.clone(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
