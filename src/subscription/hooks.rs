//! Observability hooks
//!
//! Hooks are plain callbacks registered on a [`Consumer`](super::Consumer)
//! before it starts. They never influence control flow; a consumer with no
//! hooks behaves identically apart from what it reports.

use std::sync::Arc;

use super::error::Error;
use super::types::Event;

/// Callback receiving an event
pub type EventHook = Arc<dyn Fn(&Event) + Send + Sync>;

/// Callback receiving an error
pub type ErrorHook = Arc<dyn Fn(&Error) + Send + Sync>;

/// Callback receiving a completed poll attempt
pub type PollHook = Arc<dyn Fn(&PollReport) + Send + Sync>;

/// Callback receiving a bare signal
pub type SignalHook = Arc<dyn Fn() + Send + Sync>;

/// Summary of one completed poll attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    /// Number of events asked for
    pub requested: usize,
    /// Number of events the backend returned
    pub received: usize,
    /// Whether the fetch failed
    pub failed: bool,
}

/// Registered observability callbacks
#[derive(Clone, Default)]
pub struct ConsumerHooks {
    pub(crate) on_event: Vec<EventHook>,
    pub(crate) on_ack: Vec<EventHook>,
    pub(crate) on_nack: Vec<EventHook>,
    pub(crate) on_error: Vec<ErrorHook>,
    pub(crate) on_poll: Vec<PollHook>,
    pub(crate) on_drain: Vec<SignalHook>,
}

impl ConsumerHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn event_received(&self, event: &Event) {
        for hook in &self.on_event {
            hook(event);
        }
    }

    pub(crate) fn ack(&self, event: &Event) {
        for hook in &self.on_ack {
            hook(event);
        }
    }

    pub(crate) fn nack(&self, event: &Event) {
        for hook in &self.on_nack {
            hook(event);
        }
    }

    pub(crate) fn error(&self, error: &Error) {
        for hook in &self.on_error {
            hook(error);
        }
    }

    pub(crate) fn poll(&self, report: &PollReport) {
        for hook in &self.on_poll {
            hook(report);
        }
    }

    pub(crate) fn drain(&self) {
        for hook in &self.on_drain {
            hook();
        }
    }
}

impl std::fmt::Debug for ConsumerHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerHooks")
            .field("on_event", &self.on_event.len())
            .field("on_ack", &self.on_ack.len())
            .field("on_nack", &self.on_nack.len())
            .field("on_error", &self.on_error.len())
            .field("on_poll", &self.on_poll.len())
            .field("on_drain", &self.on_drain.len())
            .finish()
    }
}
