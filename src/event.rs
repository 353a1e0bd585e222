//! Core event type for eventrelay.
//!
//! The [`Event`] struct is the unit of work flowing through the relay.
//! Events are built by the ingress, buffered in the [`EventQueue`](crate::EventQueue),
//! and handed to exactly one worker for processing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An event flowing through the relay.
///
/// Fields are private: once constructed an event is never mutated, only moved
/// from the producer into the queue and from the queue into a worker.
///
/// # Example
///
/// ```json
/// {
///   "id": "6f1c0a52-6a4e-4f7b-9a55-2b0e1b1c6a11",
///   "type": "CREATE",
///   "detail": "Details of the POST event",
///   "timestamp": "2026-10-16T10:00:00Z"
/// }
/// ```
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Event {
    /// Producer-assigned identifier, used for correlation only
    id: String,

    /// Routing tag (e.g., "CREATE", "UPDATE")
    #[serde(rename = "type")]
    event_type: String,

    /// Opaque payload
    #[serde(default)]
    detail: Value,

    /// RFC 3339 receipt time (set by the ingress)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

impl Event {
    /// Create a new event with required fields
    pub fn new(id: impl Into<String>, event_type: impl Into<String>, detail: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            detail: detail.into(),
            timestamp: None,
        }
    }

    /// Create an event with a freshly generated UUID v4 id
    pub fn generate(event_type: impl Into<String>, detail: impl Into<Value>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), event_type, detail)
    }

    /// Set the receipt timestamp
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn detail(&self) -> &Value {
        &self.detail
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }
}
