//! Default handler for event types nothing else claims.

use super::{Handler, HandlerError, HandlerOutcome};
use crate::event::Event;
use async_trait::async_trait;
use tracing::warn;

/// Logs a diagnostic and succeeds. An unknown type is not an error.
#[derive(Debug, Clone, Default)]
pub struct UnknownTypeHandler;

impl UnknownTypeHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for UnknownTypeHandler {
    fn name(&self) -> &str {
        "unknown"
    }

    async fn handle(&self, event: &Event) -> Result<HandlerOutcome, HandlerError> {
        warn!(
            event_id = %event.id(),
            event_type = %event.event_type(),
            "Unknown event type"
        );

        Ok(HandlerOutcome::success(
            self.name(),
            format!("Unknown event type: {}", event.event_type()),
        ))
    }
}
