//! Event Router - the handler registry.
//!
//! The [`Router`] maps an event's `type` to registered [`Handler`]s, supporting
//! both exact tags and wildcard patterns. New event types are added by
//! registration rather than by editing a central match.
//!
//! # Pattern Matching
//!
//! ```text
//! Pattern         | Matches
//! ----------------|---------------------------
//! CREATE          | CREATE (exact, case-sensitive)
//! user.*          | user.created, user.deleted
//! *               | everything (catch-all)
//! ```
//!
//! # Matching Priority
//!
//! 1. Exact match handlers are run first
//! 2. Wildcard patterns are run in registration order
//! 3. The default handler is used only if nothing matched
//!
//! # Example
//!
//! ```rust,ignore
//! use eventrelay::Router;
//! use eventrelay::handlers::{LogHandler, UnknownTypeHandler};
//! use std::sync::Arc;
//!
//! let mut router = Router::new();
//! router.on("CREATE", Arc::new(LogHandler::new()));
//! router.on("audit.*", Arc::new(LogHandler::with_prefix("audit")));
//! router.set_default(Arc::new(UnknownTypeHandler::new()));
//! ```

use crate::event::Event;
use crate::handlers::{Handler, HandlerError, HandlerOutcome, LogHandler, UnknownTypeHandler};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors collected while routing one event.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("handler '{handler_name}' failed: {source}")]
    HandlerFailed {
        handler_name: String,
        #[source]
        source: HandlerError,
    },
}

/// Result of routing one event through its handlers.
#[derive(Debug)]
pub struct RouteResult {
    /// Event type that was routed
    pub event_type: String,

    /// Pattern(s) that matched this event ("default" when the fallback ran)
    pub matched_patterns: Vec<String>,

    /// Number of handlers run
    pub handlers_run: usize,

    /// Outcomes of handlers that succeeded
    pub outcomes: Vec<HandlerOutcome>,

    /// Failures of handlers that returned an error or panicked
    pub errors: Vec<RouterError>,
}

impl RouteResult {
    /// Returns true if every handler succeeded
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn failure_count(&self) -> usize {
        self.errors.len()
    }
}

#[derive(Clone)]
struct PatternEntry {
    pattern: String,
    handlers: Vec<Arc<dyn Handler>>,
}

/// Registry mapping event types to handlers.
///
/// Built once at startup, then shared read-only by every worker behind an `Arc`.
pub struct Router {
    exact_handlers: HashMap<String, Vec<Arc<dyn Handler>>>,
    pattern_handlers: Vec<PatternEntry>,
    default_handler: Option<Arc<dyn Handler>>,
}

impl Router {
    /// Create an empty router.
    pub fn new() -> Self {
        Self {
            exact_handlers: HashMap::new(),
            pattern_handlers: Vec::new(),
            default_handler: None,
        }
    }

    /// Router with the built-in routes: `CREATE` and `UPDATE` are logged,
    /// everything else goes to [`UnknownTypeHandler`].
    pub fn with_defaults() -> Self {
        let mut router = Self::new();
        router.on("CREATE", Arc::new(LogHandler::new()));
        router.on("UPDATE", Arc::new(LogHandler::new()));
        router.set_default(Arc::new(UnknownTypeHandler::new()));
        router
    }

    /// Register a handler for an event type or pattern.
    ///
    /// Multiple handlers can be registered for the same pattern; they run
    /// sequentially in registration order.
    ///
    /// - Exact: `"CREATE"` matches only `CREATE`
    /// - Wildcard: `"user.*"` matches `user.created`, `user.deleted`, ...
    /// - Catch-all: `"*"` matches all events
    pub fn on(&mut self, pattern: &str, handler: Arc<dyn Handler>) {
        debug!(
            pattern = %pattern,
            handler_name = %handler.name(),
            "Registering event handler"
        );

        if is_wildcard_pattern(pattern) {
            if let Some(entry) = self
                .pattern_handlers
                .iter_mut()
                .find(|e| e.pattern == pattern)
            {
                entry.handlers.push(handler);
            } else {
                self.pattern_handlers.push(PatternEntry {
                    pattern: pattern.to_string(),
                    handlers: vec![handler],
                });
            }
        } else {
            self.exact_handlers
                .entry(pattern.to_string())
                .or_default()
                .push(handler);
        }
    }

    /// Set the handler used for event types nothing else matches.
    pub fn set_default(&mut self, handler: Arc<dyn Handler>) {
        debug!(handler_name = %handler.name(), "Setting default handler");
        self.default_handler = Some(handler);
    }

    pub fn has_default(&self) -> bool {
        self.default_handler.is_some()
    }

    /// Check if any exact or wildcard handler is registered for the type.
    pub fn has_handlers(&self, event_type: &str) -> bool {
        if self.exact_handlers.contains_key(event_type) {
            return true;
        }

        self.pattern_handlers
            .iter()
            .any(|entry| matches_pattern(event_type, &entry.pattern))
    }

    /// Number of registered patterns (exact + wildcard).
    pub fn handler_count(&self) -> usize {
        self.exact_handlers.len() + self.pattern_handlers.len()
    }

    /// List all registered patterns (exact event types + wildcards).
    pub fn event_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.exact_handlers.keys().map(|s| s.as_str()).collect();
        for entry in &self.pattern_handlers {
            types.push(&entry.pattern);
        }
        types
    }

    fn get_handlers(&self, event_type: &str) -> (Vec<Arc<dyn Handler>>, Vec<String>) {
        let mut handlers = Vec::new();
        let mut matched_patterns = Vec::new();

        if let Some(exact) = self.exact_handlers.get(event_type) {
            handlers.extend(exact.iter().cloned());
            matched_patterns.push(event_type.to_string());
        }

        for entry in &self.pattern_handlers {
            if matches_pattern(event_type, &entry.pattern) {
                handlers.extend(entry.handlers.iter().cloned());
                matched_patterns.push(entry.pattern.clone());
            }
        }

        (handlers, matched_patterns)
    }

    /// Route an event to its handlers.
    ///
    /// Never fails and never unwinds: a handler that returns an error or
    /// panics is recorded in [`RouteResult::errors`] and the remaining
    /// handlers still run.
    pub async fn route(&self, event: &Event) -> RouteResult {
        let event_type = event.event_type();

        let mut result = RouteResult {
            event_type: event_type.to_string(),
            matched_patterns: Vec::new(),
            handlers_run: 0,
            outcomes: Vec::new(),
            errors: Vec::new(),
        };

        let (handlers, matched_patterns) = self.get_handlers(event_type);
        result.matched_patterns = matched_patterns;

        let handlers = if handlers.is_empty() {
            match &self.default_handler {
                Some(default) => {
                    debug!(event_type = %event_type, "No handlers found, using default");
                    result.matched_patterns.push("default".to_string());
                    vec![default.clone()]
                }
                None => {
                    warn!(
                        event_id = %event.id(),
                        event_type = %event_type,
                        "No handlers registered for event type (and no default set)"
                    );
                    return result;
                }
            }
        } else {
            handlers
        };

        for handler in handlers {
            result.handlers_run += 1;

            let run = AssertUnwindSafe(handler.handle(event)).catch_unwind().await;
            let outcome = match run {
                Ok(outcome) => outcome,
                Err(panic) => Err(HandlerError::Panicked(panic_message(panic))),
            };

            match outcome {
                Ok(outcome) => {
                    debug!(
                        handler_name = %handler.name(),
                        message = %outcome.message,
                        "Handler completed"
                    );
                    result.outcomes.push(outcome);
                }
                Err(e) => {
                    let error = RouterError::HandlerFailed {
                        handler_name: handler.name().to_string(),
                        source: e,
                    };

                    warn!(
                        event_id = %event.id(),
                        event_type = %event_type,
                        error = %error,
                        "Handler failed"
                    );

                    result.errors.push(error);
                }
            }
        }

        result
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn is_wildcard_pattern(pattern: &str) -> bool {
    pattern.contains('*')
}

/// Check if an event type matches a pattern.
///
/// `"prefix.*"` compares against the first dot-separated segment, so
/// `"user.*"` matches `user.created` but not `users.list`.
fn matches_pattern(event_type: &str, pattern: &str) -> bool {
    if pattern == event_type || pattern == "*" {
        return true;
    }

    if let Some(prefix) = pattern.strip_suffix(".*") {
        if let Some(event_prefix) = event_type.split('.').next() {
            return event_prefix == prefix;
        }
    }

    false
}
