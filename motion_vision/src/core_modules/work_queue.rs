// THEORY:
// `WorkQueue` is the hand-off point between pipeline stages. It is a FIFO guarded
// by one mutex and one condition variable; every state change wakes all waiters,
// and every waiter re-checks its predicate after waking.
//
// Key architectural principles:
// 1.  **Backpressure by Blocking**: With `Capacity::Bounded(n)` and the `Block`
//     policy, `push` parks the producer while the queue holds `n` items. This is
//     what throttles capture to the workers' pace.
// 2.  **Explicit Overflow Policy**: A bounded queue may instead evict its oldest
//     item (`DropOldest`) or refuse the new one (`DropNewest`). Either way the
//     caller gets the dropped item back and decides what to log.
// 3.  **Two Ways Out**: `signal_finished` marks the normal end of the stream;
//     consumers drain what is left and then see `None`. A raised `StopToken` is the
//     abort path: every blocked call returns immediately, `pop` yields `None`, and
//     `push` hands the item back as `Closed`.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cancellation flag, distinct from a queue's "finished" state.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Maximum number of queued items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Capacity {
    Bounded(usize),
    #[default]
    Unbounded,
}

impl Capacity {
    fn admits(&self, len: usize) -> bool {
        match self {
            Capacity::Bounded(limit) => len < *limit,
            Capacity::Unbounded => true,
        }
    }
}

/// What `push` does when a bounded queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Wait for room.
    #[default]
    Block,
    /// Evict the oldest queued item to make room.
    DropOldest,
    /// Refuse the incoming item.
    DropNewest,
}

/// Result of a `push`.
#[derive(Debug, PartialEq, Eq)]
pub enum PushOutcome<T> {
    Enqueued,
    /// Enqueued after evicting the returned oldest item.
    Displaced(T),
    /// Refused because the queue was full under `DropNewest`.
    Dropped(T),
    /// Refused because the queue is finished or the stop token is raised.
    Closed(T),
}

impl<T> PushOutcome<T> {
    pub fn is_enqueued(&self) -> bool {
        matches!(self, PushOutcome::Enqueued | PushOutcome::Displaced(_))
    }
}

struct QueueState<T> {
    items: VecDeque<T>,
    finished: bool,
}

/// Blocking multi-producer, multi-consumer FIFO.
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    changed: Condvar,
    capacity: Capacity,
    policy: OverflowPolicy,
    stop: StopToken,
}

impl<T> WorkQueue<T> {
    pub fn new(capacity: Capacity, policy: OverflowPolicy, stop: StopToken) -> Self {
        let items = match capacity {
            Capacity::Bounded(limit) => VecDeque::with_capacity(limit),
            Capacity::Unbounded => VecDeque::new(),
        };
        Self {
            state: Mutex::new(QueueState {
                items,
                finished: false,
            }),
            changed: Condvar::new(),
            capacity,
            policy,
            stop,
        }
    }

    /// A blocking queue that holds at most `limit` items.
    pub fn bounded(limit: usize, stop: StopToken) -> Self {
        Self::new(Capacity::Bounded(limit), OverflowPolicy::Block, stop)
    }

    pub fn unbounded(stop: StopToken) -> Self {
        Self::new(Capacity::Unbounded, OverflowPolicy::Block, stop)
    }

    /// Appends `item`, waiting for room when full under the `Block` policy.
    pub fn push(&self, item: T) -> PushOutcome<T> {
        let mut state = self.state.lock();
        loop {
            if state.finished || self.stop.is_stopped() {
                return PushOutcome::Closed(item);
            }
            if self.capacity.admits(state.items.len()) {
                state.items.push_back(item);
                drop(state);
                self.changed.notify_all();
                return PushOutcome::Enqueued;
            }
            match self.policy {
                OverflowPolicy::Block => self.changed.wait(&mut state),
                OverflowPolicy::DropOldest => {
                    let evicted = state.items.pop_front();
                    state.items.push_back(item);
                    drop(state);
                    self.changed.notify_all();
                    return match evicted {
                        Some(old) => PushOutcome::Displaced(old),
                        None => PushOutcome::Enqueued,
                    };
                }
                OverflowPolicy::DropNewest => return PushOutcome::Dropped(item),
            }
        }
    }

    /// Removes the oldest item, waiting while the queue is empty and not finished.
    /// Returns `None` at end of stream or once the stop token is raised.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if self.stop.is_stopped() {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.changed.notify_all();
                return Some(item);
            }
            if state.finished {
                return None;
            }
            self.changed.wait(&mut state);
        }
    }

    /// Non-blocking variant of `pop`.
    pub fn try_pop(&self) -> Option<T> {
        if self.stop.is_stopped() {
            return None;
        }
        let item = self.state.lock().items.pop_front();
        if item.is_some() {
            self.changed.notify_all();
        }
        item
    }

    /// Marks the end of the stream. Idempotent.
    pub fn signal_finished(&self) {
        self.state.lock().finished = true;
        self.changed.notify_all();
    }

    /// Wakes every waiter so it re-checks the stop token.
    pub fn wake_all(&self) {
        let _state = self.state.lock();
        self.changed.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fifo_order() {
        let queue = WorkQueue::unbounded(StopToken::new());
        for i in 0..4 {
            assert!(queue.push(i).is_enqueued());
        }
        queue.signal_finished();
        let drained: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3]);
    }

    #[test]
    fn sixth_push_blocks_until_a_pop() {
        let queue = Arc::new(WorkQueue::bounded(5, StopToken::new()));
        for i in 0..5 {
            assert_eq!(queue.push(i), PushOutcome::Enqueued);
        }

        let pushed = Arc::new(AtomicBool::new(false));
        let producer = {
            let queue = Arc::clone(&queue);
            let pushed = Arc::clone(&pushed);
            thread::spawn(move || {
                let outcome = queue.push(5);
                pushed.store(true, Ordering::SeqCst);
                outcome
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(
            !pushed.load(Ordering::SeqCst),
            "push should still be blocked"
        );
        assert_eq!(queue.len(), 5);

        assert_eq!(queue.pop(), Some(0));
        let outcome = producer.join().expect("producer thread");
        assert_eq!(outcome, PushOutcome::Enqueued);
        assert!(pushed.load(Ordering::SeqCst));
        assert_eq!(queue.len(), 5);
    }

    #[test]
    fn finished_releases_blocked_consumers() {
        let queue: Arc<WorkQueue<u32>> = Arc::new(WorkQueue::bounded(2, StopToken::new()));
        let woke = Arc::new(AtomicUsize::new(0));
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let woke = Arc::clone(&woke);
                thread::spawn(move || {
                    assert_eq!(queue.pop(), None);
                    woke.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(woke.load(Ordering::SeqCst), 0);
        queue.signal_finished();
        queue.signal_finished();
        for consumer in consumers {
            consumer.join().expect("consumer thread");
        }
        assert_eq!(woke.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn finished_queue_still_drains() {
        let queue = WorkQueue::bounded(3, StopToken::new());
        queue.push("a");
        queue.push("b");
        queue.signal_finished();
        assert!(queue.is_finished());
        assert!(matches!(queue.push("c"), PushOutcome::Closed("c")));
        assert_eq!(queue.pop(), Some("a"));
        assert_eq!(queue.pop(), Some("b"));
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn stop_unblocks_producers_and_consumers() {
        let stop = StopToken::new();
        let full = Arc::new(WorkQueue::bounded(1, stop.clone()));
        let empty: Arc<WorkQueue<u8>> = Arc::new(WorkQueue::unbounded(stop.clone()));
        full.push(1u8);

        let producer = {
            let full = Arc::clone(&full);
            thread::spawn(move || full.push(2))
        };
        let consumer = {
            let empty = Arc::clone(&empty);
            thread::spawn(move || empty.pop())
        };

        thread::sleep(Duration::from_millis(50));
        stop.stop();
        full.wake_all();
        empty.wake_all();

        assert_eq!(producer.join().expect("producer"), PushOutcome::Closed(2));
        assert_eq!(consumer.join().expect("consumer"), None);
        // pending items are abandoned once stopped
        assert_eq!(full.pop(), None);
    }

    #[test]
    fn drop_oldest_evicts_from_the_front() {
        let queue = WorkQueue::new(
            Capacity::Bounded(2),
            OverflowPolicy::DropOldest,
            StopToken::new(),
        );
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.push(3), PushOutcome::Displaced(1));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), Some(3));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn drop_newest_refuses_when_full() {
        let queue = WorkQueue::new(
            Capacity::Bounded(1),
            OverflowPolicy::DropNewest,
            StopToken::new(),
        );
        assert_eq!(queue.push('x'), PushOutcome::Enqueued);
        assert_eq!(queue.push('y'), PushOutcome::Dropped('y'));
        assert_eq!(queue.pop(), Some('x'));
    }
}
