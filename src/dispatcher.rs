//! Push-triggered worker dispatch.
//!
//! Every [`EventQueue::add`] calls [`Dispatcher::dispatch`], which spawns one
//! tokio task. That task removes at most one event and hands it to the
//! [`EventProcessor`]. Spawning is per add, not per guaranteed item: under a
//! burst some workers wake to an empty queue and exit, and under slow handlers
//! several workers race for the head. The atomic dequeue keeps this correct
//! (no event is processed twice, none is lost while the process runs).
//!
//! ```text
//! add(e) ──► dispatch() ──spawn──► worker
//!                                   │ peek_and_remove_oldest()
//!                                   ├── None    → exit
//!                                   └── Some(e) → processor.handle(e) → exit
//! ```
//!
//! Dequeue order is FIFO; completion order is not. Handlers run with the queue
//! lock released.

use crate::event::Event;
use crate::metrics::RelayMetrics;
use crate::processor::EventProcessor;
use crate::queue::{EventQueue, WorkSignal};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher must be created inside a tokio runtime")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Wait-group style counter of live workers.
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

/// Decrements the in-flight count when a worker ends, however it ends.
struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Spawns one worker task per added event.
pub struct Dispatcher {
    processor: Arc<EventProcessor>,
    runtime: Handle,
    in_flight: Arc<InFlight>,
    permits: Option<Arc<Semaphore>>,
}

impl Dispatcher {
    /// Create a dispatcher bound to the current tokio runtime.
    pub fn new(processor: Arc<EventProcessor>) -> Result<Self, DispatchError> {
        Ok(Self::with_handle(processor, Handle::try_current()?))
    }

    /// Create a dispatcher that spawns onto an explicit runtime.
    ///
    /// Producers may then call `add` from threads outside the runtime.
    pub fn with_handle(processor: Arc<EventProcessor>, runtime: Handle) -> Self {
        Self {
            processor,
            runtime,
            in_flight: Arc::new(InFlight::default()),
            permits: None,
        }
    }

    /// Bound how many workers may process at once.
    ///
    /// Workers are still spawned per add; the extra ones wait for a permit
    /// before dequeuing, so FIFO dequeue order is unchanged.
    pub fn with_max_concurrent(mut self, max_workers: usize) -> Self {
        self.permits = Some(Arc::new(Semaphore::new(max_workers.max(1))));
        self
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        self.processor.metrics()
    }

    /// Number of spawned workers that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Wait until no worker is running.
    ///
    /// Used for graceful shutdown only; it has no effect on processing.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Like [`wait_idle`](Self::wait_idle) with a deadline. Returns `false`
    /// if workers were still running when the timeout expired.
    pub async fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.wait_idle()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    in_flight = self.in_flight(),
                    "Workers still running after drain timeout"
                );
                false
            }
        }
    }
}

impl WorkSignal for Dispatcher {
    fn dispatch(&self, queue: Arc<EventQueue>) {
        self.in_flight.count.fetch_add(1, Ordering::AcqRel);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        self.processor.metrics().record_dispatched();

        let processor = Arc::clone(&self.processor);
        let permits = self.permits.clone();

        self.runtime.spawn(async move {
            let _guard = guard;
            run_worker(queue, processor, permits).await;
        });
    }
}

async fn run_worker(
    queue: Arc<EventQueue>,
    processor: Arc<EventProcessor>,
    permits: Option<Arc<Semaphore>>,
) {
    let _permit = match permits {
        Some(semaphore) => match semaphore.acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(e) => {
                error!(error = %e, "Worker permit unavailable, exiting");
                return;
            }
        },
        None => None,
    };

    let event: Event = match queue.peek_and_remove_oldest() {
        Ok(Some(event)) => event,
        Ok(None) => {
            debug!("Queue already drained, worker exiting");
            processor.metrics().record_empty_run();
            return;
        }
        Err(e) => {
            error!(error = %e, "Worker could not dequeue");
            return;
        }
    };

    debug!(
        event_id = %event.id(),
        event_type = %event.event_type(),
        "Worker picked up event"
    );

    processor.handle(event).await;
}

/// Log what is left behind when the process stops.
pub fn report_discarded(queue: &EventQueue) {
    match queue.len() {
        Ok(0) => info!("Event queue empty at shutdown"),
        Ok(remaining) => warn!(
            discarded = remaining,
            "Discarding buffered events at shutdown"
        ),
        Err(e) => error!(error = %e, "Could not inspect queue at shutdown"),
    }
}
