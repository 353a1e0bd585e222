//! Relay counters.
//!
//! Purely observational: nothing in the queue or dispatcher reads these to
//! make a scheduling decision.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct RelayMetrics {
    events_received: AtomicU64,
    workers_dispatched: AtomicU64,
    events_processed: AtomicU64,
    handler_failures: AtomicU64,
    empty_runs: AtomicU64,
    start_time: Instant,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_received: u64,
    pub workers_dispatched: u64,
    pub events_processed: u64,
    pub handler_failures: u64,
    pub empty_runs: u64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            events_received: AtomicU64::new(0),
            workers_dispatched: AtomicU64::new(0),
            events_processed: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            empty_runs: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self) {
        self.workers_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a processed event and the number of handlers that failed on it.
    pub fn record_processed(&self, failures: usize) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
        if failures > 0 {
            self.handler_failures
                .fetch_add(failures as u64, Ordering::Relaxed);
        }
    }

    /// A worker woke up to an already drained queue.
    pub fn record_empty_run(&self) {
        self.empty_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            workers_dispatched: self.workers_dispatched.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            empty_runs: self.empty_runs.load(Ordering::Relaxed),
        }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Format uptime as "42s", "3m 5s" or "2h 0m 7s".
pub fn format_uptime(uptime: u64) -> String {
    if uptime < 60 {
        format!("{}s", uptime)
    } else if uptime < 3600 {
        format!("{}m {}s", uptime / 60, uptime % 60)
    } else {
        format!("{}h {}m {}s", uptime / 3600, (uptime % 3600) / 60, uptime % 60)
    }
}
