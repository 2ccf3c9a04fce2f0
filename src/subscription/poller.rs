//! Adaptive poll loop
//!
//! Keeps the dispatch queue as full as the concurrency ceiling allows. The
//! loop owns the only fetch the consumer ever has outstanding and the only
//! re-check timer, so neither can be duplicated: a wait is always a single
//! `select!` between the idle delay, a freed slot and a stop request, and
//! whichever wins drops the others.
//!
//! Each loop listens to the stop signal of the session that spawned it. Once
//! signalled it never fetches again, even if the consumer is restarted while
//! its last fetch is still on the wire.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::futures::Notified;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::config::ConsumerConfig;
use super::dispatch::DispatchQueue;
use super::hooks::{ConsumerHooks, PollReport};
use super::transport::Transport;

pub(crate) struct Poller {
    stream: String,
    group: String,
    concurrency: usize,
    poll_delay: Duration,
    transport: Arc<dyn Transport>,
    queue: Arc<DispatchQueue>,
    hooks: Arc<ConsumerHooks>,
    stop: watch::Receiver<bool>,
}

impl Poller {
    pub(crate) fn new(
        config: &ConsumerConfig,
        transport: Arc<dyn Transport>,
        queue: Arc<DispatchQueue>,
        hooks: Arc<ConsumerHooks>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            stream: config.stream.clone(),
            group: config.group.clone(),
            concurrency: config.concurrency,
            poll_delay: config.poll_delay,
            transport,
            queue,
            hooks,
            stop,
        }
    }

    /// Poll until this session is told to stop
    pub(crate) async fn run(self) {
        info!(
            stream = %self.stream,
            group = %self.group,
            concurrency = self.concurrency,
            poll_delay_ms = self.poll_delay.as_millis() as u64,
            "Starting poll loop"
        );

        let mut stop = self.stop.clone();

        while self.is_running() {
            // Registered before reading capacity so a slot freed in between still wakes us.
            let slot_freed = self.queue.slot_freed();
            tokio::pin!(slot_freed);
            slot_freed.as_mut().enable();

            let capacity = self.queue.state().capacity(self.concurrency);
            if capacity == 0 {
                debug!("No free capacity, deferring poll");
                if !self.idle(slot_freed, &mut stop).await {
                    break;
                }
                continue;
            }

            let report = self.poll(capacity).await;
            self.hooks.poll(&report);

            if !self.is_running() {
                break;
            }
            if report.received > 0 {
                // More may be waiting server-side; refill without delay.
                continue;
            }

            // Slots freed while the fetch was outstanding are not carried over.
            let slot_freed = self.queue.slot_freed();
            tokio::pin!(slot_freed);
            if !self.idle(slot_freed, &mut stop).await {
                break;
            }
        }

        info!(stream = %self.stream, group = %self.group, "Poll loop stopped");
    }

    /// Issue one fetch for up to `capacity` events and hand them to the queue
    async fn poll(&self, capacity: usize) -> PollReport {
        debug!(capacity, "Polling subscription");

        match self
            .transport
            .fetch_batch(&self.stream, &self.group, capacity)
            .await
        {
            Ok(events) => {
                let received = events.len();
                if self.is_running() {
                    for event in events {
                        self.queue.submit(event);
                    }
                } else if received > 0 {
                    // Left leased; the backend redelivers them after its timeout.
                    debug!(received, "Poll loop stopped, discarding fetched events");
                }
                PollReport {
                    requested: capacity,
                    received,
                    failed: false,
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch events, will retry after poll delay");
                self.hooks.error(&e);
                PollReport {
                    requested: capacity,
                    received: 0,
                    failed: true,
                }
            }
        }
    }

    /// Wait for the poll delay or a freed slot
    ///
    /// Returns `false` when the session was stopped while waiting.
    async fn idle(
        &self,
        slot_freed: Pin<&mut Notified<'_>>,
        stop: &mut watch::Receiver<bool>,
    ) -> bool {
        tokio::select! {
            _ = slot_freed => true,
            _ = tokio::time::sleep(self.poll_delay) => true,
            _ = stop.wait_for(|stopped| *stopped) => false,
        }
    }

    fn is_running(&self) -> bool {
        // A dropped session closes the channel; treat that as a stop.
        let stopped = *self.stop.borrow();
        !stopped && self.stop.has_changed().is_ok()
    }
}
