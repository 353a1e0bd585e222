//! Event processing: the step a worker runs on the event it dequeued.
//!
//! [`EventProcessor::handle`] takes ownership of the event, routes it through
//! the [`Router`], and records the outcome. It never returns an error and
//! never unwinds into the worker; a failed handler only produces a log record
//! and a counter bump. There is no retry and no dead-letter path: once
//! `handle` returns, the event is processed and dropped.

use crate::event::Event;
use crate::metrics::RelayMetrics;
use crate::router::{RouteResult, Router};
use std::sync::Arc;
use tracing::{info, warn};

pub struct EventProcessor {
    router: Arc<Router>,
    metrics: Arc<RelayMetrics>,
}

impl EventProcessor {
    pub fn new(router: Arc<Router>, metrics: Arc<RelayMetrics>) -> Self {
        Self { router, metrics }
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    pub async fn handle(&self, event: Event) -> RouteResult {
        let result = self.router.route(&event).await;
        self.metrics.record_processed(result.failure_count());

        if result.is_success() {
            info!(
                event_id = %event.id(),
                event_type = %event.event_type(),
                handlers_run = result.handlers_run,
                "Event processed"
            );
        } else {
            warn!(
                event_id = %event.id(),
                event_type = %event.event_type(),
                handlers_run = result.handlers_run,
                failures = result.failure_count(),
                "Event processed with failures, dropping"
            );
        }

        result
    }
}
