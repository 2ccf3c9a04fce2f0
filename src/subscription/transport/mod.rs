//! Backend transport abstraction
//!
//! The consumer core only needs two capabilities from the backend: fetching a
//! batch of leased events and reporting an outcome for one of them.
//! [`HttpTransport`] is the production binding; tests substitute their own.

use async_trait::async_trait;

use super::error::Result;
use super::types::{AckKind, Event};

pub mod http;

pub use http::HttpTransport;

/// Interface every backend binding must satisfy
#[async_trait]
pub trait Transport: Send + Sync {
    /// Request up to `max_count` events from the `(stream, group)` subscription
    ///
    /// An empty vector means the subscription currently has nothing to lease.
    async fn fetch_batch(&self, stream: &str, group: &str, max_count: usize) -> Result<Vec<Event>>;

    /// Report an outcome against the address taken from an event's link
    async fn acknowledge(&self, reference: &str, kind: AckKind) -> Result<()>;
}
