//! Error types for the subscription consumer

use thiserror::Error;

use super::types::AckKind;

/// Result type for subscription operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while consuming a subscription group
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid construction-time settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The backend answered with a non-success status
    #[error("HTTP error (status {status}): {body}")]
    Http { status: u16, body: String },

    /// Connection, timeout or other request-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The user handler reported a failure for an event
    #[error("Handler error: {0}")]
    Handler(String),

    /// The user handler panicked while processing an event
    #[error("Handler panicked while processing event {event_id}: {message}")]
    HandlerPanicked { event_id: String, message: String },

    /// Every ack/nack attempt for an event failed
    #[error("{kind} for event {event_id} failed after {attempts} attempts: {source}")]
    AcknowledgementFailed {
        kind: AckKind,
        event_id: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// `start()` was called while the consumer was not stopped
    #[error("Consumer is already running")]
    AlreadyRunning,
}

impl Error {
    /// Create a handler failure from any displayable message
    pub fn handler(message: impl Into<String>) -> Self {
        Error::Handler(message.into())
    }

    /// Whether this error ended an event's acknowledgement for good
    pub fn is_terminal_acknowledgement(&self) -> bool {
        matches!(self, Error::AcknowledgementFailed { .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Error::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else if err.is_decode() {
            Error::Serialization(err.to_string())
        } else {
            Error::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
