// THEORY:
// Workers finish frames in whatever order they happen to complete. The
// `ReorderBuffer` sits on the consumer side and restores capture order: results
// are parked by index until every earlier index has been released.
//
// Key architectural principles:
// 1.  **Next-Expected Cursor**: The buffer tracks the index it expects next and
//     releases the contiguous run starting there.
// 2.  **Bounded Patience**: A frame that never arrives (skipped by a worker, or
//     evicted by the output overflow policy) would stall the cursor forever. Once
//     more than `max_pending` results are parked, the cursor jumps to the lowest
//     parked index and the gap is given up.
// 3.  **Late Arrivals Are Dropped**: A result whose index is already behind the
//     cursor is returned to the caller as rejected instead of being emitted out
//     of order.

use std::collections::BTreeMap;
use tracing::debug;

/// Anything carrying a capture index.
pub trait Sequenced {
    fn sequence(&self) -> u64;
}

impl Sequenced for crate::parallel_pipeline::AnalyzedFrame {
    fn sequence(&self) -> u64 {
        self.index
    }
}

/// Restores capture order over results that arrive in completion order.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    pending: BTreeMap<u64, T>,
    next_expected: u64,
    max_pending: usize,
    skipped: u64,
}

impl<T: Sequenced> ReorderBuffer<T> {
    /// `max_pending` is how many results may wait for a gap before the gap is
    /// abandoned. It is raised to at least 1.
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: BTreeMap::new(),
            next_expected: 0,
            max_pending: max_pending.max(1),
            skipped: 0,
        }
    }

    /// Parks `item` and returns every result that is now in order. A result
    /// already behind the cursor is handed back as `Err`.
    pub fn push(&mut self, item: T) -> Result<Vec<T>, T> {
        let index = item.sequence();
        if index < self.next_expected {
            return Err(item);
        }
        self.pending.insert(index, item);

        let mut ready = self.drain_contiguous();
        while self.pending.len() > self.max_pending {
            let Some(&lowest) = self.pending.keys().next() else {
                break;
            };
            debug!(
                from = self.next_expected,
                to = lowest,
                "giving up on missing frames"
            );
            self.skipped += lowest - self.next_expected;
            self.next_expected = lowest;
            ready.extend(self.drain_contiguous());
        }
        Ok(ready)
    }

    /// Releases everything still parked, in index order, regardless of gaps.
    pub fn flush(&mut self) -> Vec<T> {
        let rest = std::mem::take(&mut self.pending);
        if let Some((&last, _)) = rest.iter().next_back() {
            self.next_expected = last + 1;
        }
        rest.into_values().collect()
    }

    /// The index the buffer will release next.
    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Indices abandoned because results behind them piled up.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn drain_contiguous(&mut self) -> Vec<T> {
        let mut ready = Vec::new();
        while let Some(item) = self.pending.remove(&self.next_expected) {
            ready.push(item);
            self.next_expected += 1;
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Item(u64);

    impl Sequenced for Item {
        fn sequence(&self) -> u64 {
            self.0
        }
    }

    fn ids(items: Vec<Item>) -> Vec<u64> {
        items.into_iter().map(|i| i.0).collect()
    }

    #[test]
    fn releases_contiguous_runs() {
        let mut buffer = ReorderBuffer::new(8);
        assert_eq!(ids(buffer.push(Item(1)).expect("fresh")), Vec::<u64>::new());
        assert_eq!(ids(buffer.push(Item(2)).expect("fresh")), Vec::<u64>::new());
        assert_eq!(ids(buffer.push(Item(0)).expect("fresh")), vec![0, 1, 2]);
        assert_eq!(buffer.next_expected(), 3);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn gives_up_on_a_gap_when_full() {
        let mut buffer = ReorderBuffer::new(2);
        assert!(buffer.push(Item(1)).expect("fresh").is_empty());
        assert!(buffer.push(Item(2)).expect("fresh").is_empty());
        // a third parked result exceeds the limit; frame 0 is abandoned
        assert_eq!(ids(buffer.push(Item(3)).expect("fresh")), vec![1, 2, 3]);
        assert_eq!(buffer.skipped(), 1);
        assert_eq!(buffer.push(Item(0)), Err(Item(0)));
    }

    #[test]
    fn flush_empties_in_index_order() {
        let mut buffer = ReorderBuffer::new(10);
        for i in [7, 3, 5] {
            assert!(buffer.push(Item(i)).expect("fresh").is_empty());
        }
        assert_eq!(ids(buffer.flush()), vec![3, 5, 7]);
        assert_eq!(buffer.next_expected(), 8);
        assert!(buffer.flush().is_empty());
    }
}
