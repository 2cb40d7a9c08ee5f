//! Bounded FIFO between the two threads of a `ThreadQueue` connection.
//!
//! The producer (output slot thread) and consumer (input slot thread) block
//! with a timeout on a full or empty queue. An EOF entry is always accepted,
//! even past capacity, so termination can never be starved by backpressure.

use crate::pipeline::unit::DataUnit;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One queued entry: sequence id plus the unit, `None` for EOF.
pub type QueueEntry = (u64, Option<DataUnit>);

/// Counters describing queue activity since creation or the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub current: usize,
    pub capacity: usize,
    pub total_pushed: u64,
    pub total_popped: u64,
    pub total_flushed: u64,
}

struct QueueState {
    entries: VecDeque<QueueEntry>,
    total_pushed: u64,
    total_popped: u64,
    total_flushed: u64,
}

pub struct FrameQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` real units (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                entries: VecDeque::with_capacity(capacity.min(1024) + 1),
                total_pushed: 0,
                total_popped: 0,
                total_flushed: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue a real unit, waiting up to `timeout` for room.
    ///
    /// Returns `false` if the queue stayed full for the whole timeout.
    pub fn push(&self, seq: u64, unit: DataUnit, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.entries.len() >= self.capacity {
            if self.not_full.wait_until(&mut state, deadline).timed_out()
                && state.entries.len() >= self.capacity
            {
                return false;
            }
        }
        state.entries.push_back((seq, Some(unit)));
        state.total_pushed += 1;
        drop(state);
        self.not_empty.notify_one();
        true
    }

    /// Enqueue end of stream. Never blocks and never fails.
    pub fn push_eof(&self, seq: u64) {
        let mut state = self.state.lock();
        state.entries.push_back((seq, None));
        state.total_pushed += 1;
        drop(state);
        self.not_empty.notify_one();
    }

    /// Dequeue the oldest entry, waiting up to `timeout` for one to arrive.
    pub fn pop(&self, timeout: Duration) -> Option<QueueEntry> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.entries.is_empty() {
            if self.not_empty.wait_until(&mut state, deadline).timed_out()
                && state.entries.is_empty()
            {
                return None;
            }
        }
        let entry = state.entries.pop_front();
        state.total_popped += 1;
        drop(state);
        self.not_full.notify_one();
        entry
    }

    /// Discard buffered real units. A queued EOF survives a flush.
    ///
    /// Returns how many units were dropped.
    pub fn flush(&self) -> usize {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|(_, unit)| unit.is_none());
        let dropped = before - state.entries.len();
        state.total_flushed += dropped as u64;
        drop(state);
        self.not_full.notify_all();
        dropped
    }

    /// Empty the queue entirely, EOF included, and zero the counters.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.total_pushed = 0;
        state.total_popped = 0;
        state.total_flushed = 0;
        drop(state);
        self.not_full.notify_all();
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            current: state.entries.len(),
            capacity: self.capacity,
            total_pushed: state.total_pushed,
            total_popped: state.total_popped,
            total_flushed: state.total_flushed,
        }
    }
}

impl std::fmt::Debug for FrameQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const SHORT: Duration = Duration::from_millis(5);

    fn unit(n: u64) -> DataUnit {
        DataUnit::new(n)
    }

    #[test]
    fn test_fifo_order() {
        let q = FrameQueue::new(4);
        for i in 0..4 {
            assert!(q.push(i, unit(i), SHORT));
        }
        for i in 0..4 {
            let (seq, data) = q.pop(SHORT).unwrap();
            assert_eq!(seq, i);
            assert_eq!(data.unwrap().payload::<u64>(), Some(&i));
        }
        assert!(q.pop(SHORT).is_none());
    }

    #[test]
    fn test_push_times_out_when_full() {
        let q = FrameQueue::new(1);
        assert!(q.push(0, unit(0), SHORT));
        assert!(!q.push(1, unit(1), SHORT));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_eof_accepted_past_capacity() {
        let q = FrameQueue::new(1);
        assert!(q.push(0, unit(0), SHORT));
        q.push_eof(1);
        assert_eq!(q.len(), 2);
        assert!(q.pop(SHORT).unwrap().1.is_some());
        let (seq, eof) = q.pop(SHORT).unwrap();
        assert_eq!(seq, 1);
        assert!(eof.is_none());
    }

    #[test]
    fn test_flush_keeps_eof() {
        let q = FrameQueue::new(3);
        q.push(0, unit(0), SHORT);
        q.push(1, unit(1), SHORT);
        q.push_eof(2);
        assert_eq!(q.flush(), 2);
        let (_, entry) = q.pop(SHORT).unwrap();
        assert!(entry.is_none());
        assert_eq!(q.stats().total_flushed, 2);
    }

    #[test]
    fn test_reset_clears_everything() {
        let q = FrameQueue::new(2);
        q.push(0, unit(0), SHORT);
        q.push_eof(1);
        q.reset();
        assert!(q.is_empty());
        assert_eq!(q.stats(), QueueStats { capacity: 2, ..Default::default() });
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let q = FrameQueue::new(0);
        assert_eq!(q.capacity(), 1);
        assert!(q.push(0, unit(0), SHORT));
    }

    #[test]
    fn test_blocked_producer_wakes_on_pop() {
        let q = Arc::new(FrameQueue::new(1));
        q.push(0, unit(0), SHORT);
        let producer = {
            let q = q.clone();
            thread::spawn(move || q.push(1, unit(1), Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(q.pop(SHORT).unwrap().0, 0);
        assert!(producer.join().unwrap());
        assert_eq!(q.pop(SHORT).unwrap().0, 1);
    }

    // Property-based tests using proptest
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_concurrent_delivery_preserves_order(count in 0u64..200, capacity in 1usize..8) {
            let q = Arc::new(FrameQueue::new(capacity));
            let producer = {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..count {
                        while !q.push(i, unit(i), Duration::from_millis(50)) {}
                    }
                    q.push_eof(count);
                })
            };

            let mut received = Vec::new();
            loop {
                match q.pop(Duration::from_secs(5)) {
                    Some((_, Some(data))) => received.push(*data.payload::<u64>().unwrap()),
                    Some((_, None)) => break,
                    None => prop_assert!(false, "consumer timed out"),
                }
            }
            producer.join().unwrap();

            let expected: Vec<u64> = (0..count).collect();
            prop_assert_eq!(received, expected);
            prop_assert!(q.is_empty());
        }

        #[test]
        fn test_eof_never_dropped_when_full(capacity in 1usize..6) {
            let q = FrameQueue::new(capacity);
            for i in 0..capacity as u64 {
                prop_assert!(q.push(i, unit(i), SHORT));
            }
            q.push_eof(capacity as u64);
            let mut last = None;
            while let Some(entry) = q.pop(SHORT) {
                last = Some(entry);
            }
            let (_, data) = last.unwrap();
            prop_assert!(data.is_none());
        }
    }
}
