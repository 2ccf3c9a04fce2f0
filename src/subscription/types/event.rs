use crate::subscription::links;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Outcome reported back to the backend for a leased event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckKind {
    /// Event was processed successfully
    Ack,
    /// Event was not processed; the backend decides on redelivery
    Nack,
}

impl AckKind {
    /// Link relation naming the target of this outcome
    pub fn relation(&self) -> &'static str {
        match self {
            AckKind::Ack => "ack",
            AckKind::Nack => "nack",
        }
    }
}

impl fmt::Display for AckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.relation())
    }
}

/// A named follow-up address attached to an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Relation name (e.g. "ack", "nack", "edit")
    pub relation: String,

    /// Opaque address usable for a follow-up request
    pub uri: String,
}

impl Link {
    pub fn new(relation: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            uri: uri.into(),
        }
    }
}

/// Event leased to this consumer by the subscription group
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique identifier for the event
    pub event_id: String,

    /// Event type name
    #[serde(default)]
    pub event_type: Option<String>,

    /// Stream the event was written to
    #[serde(default)]
    pub stream_id: Option<String>,

    /// Position of the event within its stream
    #[serde(default)]
    pub event_number: Option<i64>,

    /// Business payload, opaque to the consumer
    #[serde(default)]
    pub data: Value,

    /// Infrastructural metadata
    #[serde(default, rename = "metaData")]
    pub metadata: Option<Value>,

    /// When the event was written
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,

    /// Follow-up addresses, including the ack and nack targets
    #[serde(default)]
    pub links: Vec<Link>,
}

impl Event {
    /// Create an event with an empty payload and no links
    ///
    /// # Example
    ///
    /// ```
    /// use competing_consumer::subscription::types::{AckKind, Event};
    /// use serde_json::json;
    ///
    /// let event = Event::new("evt-1")
    ///     .with_type("OrderPlaced")
    ///     .with_data(json!({ "order": 42 }))
    ///     .with_link("ack", "http://localhost:2113/ack/evt-1");
    ///
    /// assert_eq!(event.link(AckKind::Ack), Some("http://localhost:2113/ack/evt-1"));
    /// ```
    pub fn new(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: None,
            stream_id: None,
            event_number: None,
            data: Value::Null,
            metadata: None,
            updated: None,
            links: Vec::new(),
        }
    }

    /// Set the event type (builder pattern)
    pub fn with_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Set the data payload (builder pattern)
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Add a link (builder pattern)
    pub fn with_link(mut self, relation: impl Into<String>, uri: impl Into<String>) -> Self {
        self.links.push(Link::new(relation, uri));
        self
    }

    /// Target address for the given outcome, if the backend supplied one
    pub fn link(&self, kind: AckKind) -> Option<&str> {
        links::resolve(&self.links, kind)
    }
}

/// Body of a competing-consumer batch response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFeed {
    #[serde(default)]
    pub entries: Vec<Event>,
}
