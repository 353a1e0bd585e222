//! Log Handler - structured logging of handled events.
//!
//! [`LogHandler`] is the built-in routine for the `CREATE` and `UPDATE` types:
//! it emits a "Handling <TYPE> event" record through `tracing`.
//!
//! # Example
//!
//! ```rust,ignore
//! use eventrelay::handlers::LogHandler;
//!
//! let handler = LogHandler::new();
//! // or with custom prefix
//! let handler = LogHandler::with_prefix("audit");
//! ```

use super::{Handler, HandlerError, HandlerOutcome};
use crate::event::Event;
use async_trait::async_trait;
use tracing::info;

/// A handler that logs events using structured logging.
#[derive(Debug, Clone)]
pub struct LogHandler {
    prefix: String,
}

impl LogHandler {
    /// Create a new LogHandler with default settings
    pub fn new() -> Self {
        Self {
            prefix: "event".to_string(),
        }
    }

    /// Create a LogHandler with a custom prefix
    ///
    /// The prefix appears in log records, useful for telling routes apart
    /// (e.g., "audit", "inventory").
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Default for LogHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for LogHandler {
    fn name(&self) -> &str {
        "log"
    }

    async fn handle(&self, event: &Event) -> Result<HandlerOutcome, HandlerError> {
        let message = format!("Handling {} event", event.event_type());

        info!(
            prefix = %self.prefix,
            event_id = %event.id(),
            event_type = %event.event_type(),
            detail = %event.detail(),
            "[{}] {}",
            self.prefix,
            message
        );

        Ok(HandlerOutcome::success(self.name(), message))
    }
}
