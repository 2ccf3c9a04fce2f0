pub mod event;

pub use event::{AckKind, Event, EventFeed, Link};
