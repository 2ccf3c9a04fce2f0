//! Competing-consumer client for HTTP subscription groups
//!
//! Several consumer instances share a named subscription group; the backend
//! leases each event to exactly one of them, and the consumer must ack or
//! nack every event it receives. This module provides the client side of
//! that contract:
//!
//! - `Consumer`: start/stop lifecycle and hook registration
//! - `Poller`: fetches batches sized to free capacity, one request at a time
//! - `DispatchQueue`: runs the handler per event under a concurrency ceiling
//! - `Acknowledger`: sends ack/nack with bounded fixed-delay retry
//! - `Transport`: the backend seam, with `HttpTransport` as the real binding
//!
//! # Quick Start
//!
//! ```no_run
//! use competing_consumer::subscription::{handler_fn, Consumer, ConsumerConfig, Event};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConsumerConfig::new("orders", "billing").with_concurrency(8);
//!
//!     let mut consumer = Consumer::new(config, handler_fn(|event: Event| async move {
//!         println!("{:?}: {}", event.event_type, event.data);
//!         Ok(())
//!     }))?;
//!
//!     consumer
//!         .on_nack(|event| eprintln!("nacked {}", event.event_id))
//!         .on_error(|err| eprintln!("error: {}", err));
//!
//!     consumer.start()?;
//!     tokio::signal::ctrl_c().await?;
//!     consumer.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Shutdown
//!
//! `stop()` stops intake immediately but waits for every accepted event to be
//! acked or nacked (including ack retries) before it resolves. Nothing bounds
//! that wait.

pub mod ack;
pub mod config;
pub mod consumer;
pub mod dispatch;
pub mod error;
pub mod hooks;
pub mod links;
mod poller;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use ack::{Acknowledger, RetryPolicy};
pub use config::{ConsumerConfig, Credentials};
pub use consumer::{Consumer, RunState};
pub use dispatch::{handler_fn, DispatchQueue, EventHandler, QueueState};
pub use error::{Error, Result};
pub use hooks::{ConsumerHooks, PollReport};
pub use transport::{HttpTransport, Transport};
pub use types::{AckKind, Event, Link};
