//! Handler system for eventrelay.
//!
//! Handlers are the per-type processing routines a worker runs for an event.
//! The [`Handler`] trait defines the interface; the [`Router`](crate::Router)
//! maps event types to handlers.
//!
//! ## Built-in Handlers
//!
//! - [`LogHandler`]: Structured "Handling <TYPE> event" logging
//! - [`UnknownTypeHandler`]: Default for unrecognized types, logs and succeeds
//!
//! ## Creating Custom Handlers
//!
//! ```rust,ignore
//! use eventrelay::{Event, Handler, HandlerError, HandlerOutcome};
//! use async_trait::async_trait;
//!
//! struct Inventory;
//!
//! #[async_trait]
//! impl Handler for Inventory {
//!     fn name(&self) -> &str {
//!         "inventory"
//!     }
//!
//!     async fn handle(&self, event: &Event) -> Result<HandlerOutcome, HandlerError> {
//!         Ok(HandlerOutcome::success(self.name(), "stock adjusted"))
//!     }
//! }
//! ```

pub mod log;
pub mod unknown;

use crate::event::Event;
use async_trait::async_trait;
use thiserror::Error;

pub use log::LogHandler;
pub use unknown::UnknownTypeHandler;

/// Errors a handler can report for a single event.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The handler panicked; the panic was caught by the processor
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// Generic handler failure
    #[error("handler failed: {0}")]
    Failed(String),
}

/// Result of a successful handler run.
#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    /// Name of the handler that produced this outcome
    pub handler_name: String,

    /// Human-readable message describing what happened
    pub message: String,
}

impl HandlerOutcome {
    pub fn success(handler_name: &str, message: impl Into<String>) -> Self {
        Self {
            handler_name: handler_name.to_string(),
            message: message.into(),
        }
    }
}

/// The core Handler trait.
///
/// Handlers run inside a worker task with the queue lock released. They must
/// be `Send + Sync` because one instance is shared by every worker.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Returns the name of this handler (e.g., "log", "unknown")
    fn name(&self) -> &str;

    /// Process one event.
    ///
    /// An `Err` is logged and counted by the processor; it never reaches the
    /// producer and never stops other events from being handled.
    async fn handle(&self, event: &Event) -> Result<HandlerOutcome, HandlerError>;
}
