//! The in-memory event queue.
//!
//! [`EventQueue`] is a FIFO buffer behind a single coarse mutex. Every
//! operation is an O(1) append, an O(1) pop, or a copy, and the lock is never
//! held across I/O or an `.await`, so producers and workers only ever contend
//! for the length of a `VecDeque` operation.
//!
//! There is no capacity bound. Under sustained overload the buffer grows
//! without limit; that is an accepted risk of this best-effort relay, not a
//! condition the queue reports.
//!
//! # Flow
//!
//! ```text
//! Ingress ──add()──► [ e1 | e2 | e3 ] ──peek_and_remove_oldest()──► worker
//!                │
//!                └──► WorkSignal::dispatch()  (one call per add)
//! ```

use crate::event::Event;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from queue operations.
///
/// The only failure is an unusable lock, which means a thread panicked while
/// mutating the buffer.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("event queue lock poisoned")]
    Poisoned,
}

/// Receives a notification after every successful [`EventQueue::add`].
///
/// Implemented by [`Dispatcher`](crate::Dispatcher). Implementations must
/// return promptly; `add` calls this synchronously on the producer's thread.
pub trait WorkSignal: Send + Sync {
    fn dispatch(&self, queue: Arc<EventQueue>);
}

/// Process-wide FIFO buffer of pending events.
///
/// Constructed once at startup and shared as `Arc<EventQueue>` with the
/// ingress. Buffered events are owned by the queue until a worker removes
/// them.
pub struct EventQueue {
    buffer: Mutex<VecDeque<Event>>,
    signal: Arc<dyn WorkSignal>,
}

impl EventQueue {
    /// Create an empty queue that notifies `signal` on every add.
    pub fn new(signal: Arc<dyn WorkSignal>) -> Arc<Self> {
        Arc::new(Self {
            buffer: Mutex::new(VecDeque::new()),
            signal,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, VecDeque<Event>>, QueueError> {
        self.buffer.lock().map_err(|_| QueueError::Poisoned)
    }

    /// Reset the buffer to empty. Safe to call more than once.
    pub fn init(&self) -> Result<(), QueueError> {
        let mut buffer = self.lock()?;
        let discarded = buffer.len();
        buffer.clear();

        info!(discarded = discarded, "Event queue initialized");
        Ok(())
    }

    /// Append an event and signal the dispatcher.
    ///
    /// Returns as soon as the event is buffered; success says nothing about
    /// processing. The lock is released before the signal fires.
    pub fn add(self: &Arc<Self>, event: Event) -> Result<(), QueueError> {
        let event_id = event.id().to_string();
        let event_type = event.event_type().to_string();

        let depth = {
            let mut buffer = self.lock()?;
            buffer.push_back(event);
            buffer.len()
        };

        info!(
            event_id = %event_id,
            event_type = %event_type,
            queue_depth = depth,
            "Event added to queue"
        );

        self.signal.dispatch(Arc::clone(self));
        Ok(())
    }

    /// Remove and return the oldest event, or `None` when there is no work.
    ///
    /// This is the only place events leave the queue. The check and the pop
    /// happen under one lock acquisition, so no two callers ever receive the
    /// same event. Callers must not hold any other lock on the queue.
    pub fn peek_and_remove_oldest(&self) -> Result<Option<Event>, QueueError> {
        let event = self.lock()?.pop_front();

        if let Some(event) = &event {
            debug!(
                event_id = %event.id(),
                event_type = %event.event_type(),
                "Event removed from queue"
            );
        }

        Ok(event)
    }

    /// Copy of the current backlog in FIFO order, without removing anything.
    pub fn snapshot(&self) -> Result<Vec<Event>, QueueError> {
        Ok(self.lock()?.iter().cloned().collect())
    }

    pub fn len(&self) -> Result<usize, QueueError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.lock()?.is_empty())
    }

    /// Leave the buffer lock poisoned, as a thread panicking mid-operation
    /// would.
    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let _ = std::thread::scope(|s| {
            s.spawn(|| {
                let _guard = self.buffer.lock();
                panic!("panicked while holding the event queue lock");
            })
            .join()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    /// Counts signals without spawning anything, so the queue is never drained
    /// behind the test's back.
    #[derive(Default)]
    struct CountingSignal {
        calls: AtomicUsize,
    }

    impl WorkSignal for CountingSignal {
        fn dispatch(&self, _queue: Arc<EventQueue>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn detached_queue() -> (Arc<EventQueue>, Arc<CountingSignal>) {
        let signal = Arc::new(CountingSignal::default());
        let queue = EventQueue::new(signal.clone());
        queue.init().unwrap();
        (queue, signal)
    }

    fn event(n: usize) -> Event {
        Event::new(format!("evt-{}", n), "CREATE", n)
    }

    #[test]
    fn test_fifo_order() {
        let (queue, _) = detached_queue();
        for n in 0..5 {
            queue.add(event(n)).unwrap();
        }

        for n in 0..5 {
            let next = queue.peek_and_remove_oldest().unwrap().unwrap();
            assert_eq!(next.id(), format!("evt-{}", n));
        }
        assert!(queue.peek_and_remove_oldest().unwrap().is_none());
    }

    #[test]
    fn test_empty_queue_returns_no_work() {
        let (queue, _) = detached_queue();

        assert!(queue.peek_and_remove_oldest().unwrap().is_none());
        assert!(queue.peek_and_remove_oldest().unwrap().is_none());
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn test_add_signals_once_per_event() {
        let (queue, signal) = detached_queue();
        queue.add(event(1)).unwrap();
        queue.add(event(2)).unwrap();

        assert_eq!(signal.calls.load(Ordering::SeqCst), 2);
        assert_eq!(queue.len().unwrap(), 2);
    }

    #[test]
    fn test_snapshot_does_not_mutate() {
        let (queue, _) = detached_queue();
        queue.add(event(1)).unwrap();
        queue.add(event(2)).unwrap();

        let snapshot = queue.snapshot().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id(), "evt-1");
        assert_eq!(snapshot[1].id(), "evt-2");
        assert_eq!(queue.len().unwrap(), 2);
    }

    #[test]
    fn test_init_is_idempotent_and_clears() {
        let (queue, _) = detached_queue();
        queue.add(event(1)).unwrap();

        queue.init().unwrap();
        queue.init().unwrap();

        assert!(queue.snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_adds_no_corruption() {
        let (queue, signal) = detached_queue();

        let producers: Vec<_> = (0..10)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..100 {
                        queue.add(event(p * 100 + i)).unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let snapshot = queue.snapshot().unwrap();
        assert_eq!(snapshot.len(), 1000);
        assert_eq!(signal.calls.load(Ordering::SeqCst), 1000);

        let expected: HashSet<String> = (0..1000).map(|n| format!("evt-{}", n)).collect();
        let snapshot_ids: HashSet<String> = snapshot.iter().map(|e| e.id().to_string()).collect();
        assert_eq!(snapshot_ids, expected);

        // drain from many threads: every id exactly once
        let drainers: Vec<_> = (0..8)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut ids = Vec::new();
                    while let Some(e) = queue.peek_and_remove_oldest().unwrap() {
                        ids.push(e.id().to_string());
                    }
                    ids
                })
            })
            .collect();

        let mut drained = Vec::new();
        for drainer in drainers {
            drained.extend(drainer.join().unwrap());
        }

        assert_eq!(drained.len(), 1000);
        let drained_ids: HashSet<String> = drained.into_iter().collect();
        assert_eq!(drained_ids, expected);
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn test_snapshots_consistent_while_producers_add() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 250;

        fn assert_consistent(previous: &[Event], current: &[Event]) {
            // nothing is dequeued, so an earlier snapshot is a prefix of a later one
            assert!(current.len() >= previous.len());
            assert_eq!(&current[..previous.len()], previous);

            let ids: HashSet<&str> = current.iter().map(|e| e.id()).collect();
            assert_eq!(ids.len(), current.len(), "duplicate event in snapshot");

            let mut last_seq = [None; PRODUCERS];
            for e in current {
                let n = e.detail().as_u64().unwrap() as usize;
                let (producer, seq) = (n / PER_PRODUCER, n % PER_PRODUCER);
                assert!(last_seq[producer].map_or(true, |last| seq > last));
                last_seq[producer] = Some(seq);
            }
        }

        let (queue, _) = detached_queue();

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        queue.add(event(p * PER_PRODUCER + i)).unwrap();
                    }
                })
            })
            .collect();

        let mut previous = Vec::new();
        while !producers.iter().all(|p| p.is_finished()) {
            let current = queue.snapshot().unwrap();
            assert_consistent(&previous, &current);
            previous = current;
        }
        for producer in producers {
            producer.join().unwrap();
        }

        let last = queue.snapshot().unwrap();
        assert_consistent(&previous, &last);
        assert_eq!(last.len(), PRODUCERS * PER_PRODUCER);
    }

    #[test]
    fn test_poisoned_lock_fails_without_signal() {
        let (queue, signal) = detached_queue();
        queue.poison();

        assert!(matches!(queue.add(event(1)), Err(QueueError::Poisoned)));
        assert!(matches!(queue.peek_and_remove_oldest(), Err(QueueError::Poisoned)));
        assert!(matches!(queue.snapshot(), Err(QueueError::Poisoned)));
        assert_eq!(signal.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_single_producer_order_preserved_under_concurrent_drain() {
        let (queue, _) = detached_queue();
        for n in 0..200 {
            queue.add(event(n)).unwrap();
        }

        // each drainer sees a strictly increasing subsequence
        let drainers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(e) = queue.peek_and_remove_oldest().unwrap() {
                        seen.push(e.detail().as_u64().unwrap());
                    }
                    seen
                })
            })
            .collect();

        for drainer in drainers {
            let seen = drainer.join().unwrap();
            assert!(seen.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
