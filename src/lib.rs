//! # eventrelay
//!
//! A single-process, best-effort relay that accepts events over HTTP and
//! processes them in the background.
//!
//! ## Architecture
//!
//! ```text
//! Client -> HTTP ingress -> EventQueue::add -> Dispatcher (spawn per add)
//!                                                  -> worker -> Router -> Handlers
//! ```
//!
//! Queued events live only in memory: nothing survives a restart, there is no
//! retry or dead-letter path, and producers get no backpressure.
//!
//! ## Modules
//!
//! - [`event`]: The event type
//! - [`queue`]: Mutex-guarded FIFO buffer
//! - [`dispatcher`]: Worker spawning and drain bookkeeping
//! - [`processor`]: Per-event processing with failure isolation
//! - [`router`]: Type-to-handler registry
//! - [`handlers`]: Handler trait and built-in handlers
//! - [`ingress`]: axum HTTP routes
//! - [`config`], [`metrics`], [`shutdown`]: Ambient plumbing

pub mod config;
pub mod dispatcher;
pub mod event;
pub mod handlers;
pub mod ingress;
pub mod metrics;
pub mod processor;
pub mod queue;
pub mod router;
pub mod shutdown;

pub use dispatcher::{DispatchError, Dispatcher};
pub use event::Event;
pub use handlers::{Handler, HandlerError, HandlerOutcome};
pub use processor::EventProcessor;
pub use queue::{EventQueue, QueueError, WorkSignal};
pub use router::{RouteResult, Router};
