//! Acknowledgement protocol
//!
//! Turns a handler outcome into an ack or nack call against the event's link.
//! Transport failures are retried a fixed number of times with a fixed delay
//! between attempts.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::error::{Error, Result};
use super::hooks::ConsumerHooks;
use super::transport::Transport;
use super::types::{AckKind, Event};

/// Bounded, fixed-delay retry settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Wait between consecutive attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

/// Reports handler outcomes to the backend
pub struct Acknowledger {
    transport: Arc<dyn Transport>,
    hooks: Arc<ConsumerHooks>,
    policy: RetryPolicy,
}

impl Acknowledger {
    pub fn new(transport: Arc<dyn Transport>, hooks: Arc<ConsumerHooks>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            hooks,
            policy,
        }
    }

    /// Send `kind` for `event`, retrying transient failures
    ///
    /// An event without a matching link is treated as settled. When every
    /// attempt fails, the error is reported through the error hook and also
    /// returned as [`Error::AcknowledgementFailed`] so callers can tell a
    /// terminal outcome apart from success.
    pub async fn settle(&self, event: &Event, kind: AckKind) -> Result<()> {
        let Some(reference) = event.link(kind) else {
            debug!(event_id = %event.event_id, %kind, "Event has no link for outcome, nothing to send");
            return Ok(());
        };

        match kind {
            AckKind::Ack => self.hooks.ack(event),
            AckKind::Nack => self.hooks.nack(event),
        }

        let mut attempt = 1;
        loop {
            match self.transport.acknowledge(reference, kind).await {
                Ok(()) => {
                    debug!(event_id = %event.event_id, %kind, attempt, "Acknowledgement sent");
                    return Ok(());
                }
                Err(e) if attempt < self.policy.max_attempts => {
                    warn!(
                        event_id = %event.event_id,
                        %kind,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %e,
                        "Acknowledgement failed, retrying"
                    );
                    tokio::time::sleep(self.policy.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    let err = Error::AcknowledgementFailed {
                        kind,
                        event_id: event.event_id.clone(),
                        attempts: attempt,
                        source: Box::new(e),
                    };
                    error!(error = %err, "Giving up on acknowledgement");
                    self.hooks.error(&err);
                    return Err(err);
                }
            }
        }
    }
}
