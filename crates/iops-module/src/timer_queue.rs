//! BinaryHeap-based timer queue
//!
//! # Complexity
//!
//! - Push: O(log n)
//! - Cancel: O(1) (lazy, by sequence mismatch)
//! - Pop expired: O(k log n) where k = number of expired entries
//!
//! # Cancellation Strategy
//!
//! The queue does not track cancellation itself. Every push returns a
//! sequence number; the owner records the sequence it considers armed and
//! passes an `is_armed(key, seq)` predicate when popping. Entries whose
//! sequence is no longer armed (cancelled, rescheduled, destroyed) are
//! discarded as they surface.

use std::collections::BinaryHeap;
use std::time::Instant;

/// Wrapper for heap ordering (min-heap by deadline, then sequence)
struct HeapEntry<K> {
    deadline: Instant,
    seq: u64,
    key: K,
}

impl<K> PartialEq for HeapEntry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<K> Eq for HeapEntry<K> {}

impl<K> PartialOrd for HeapEntry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for HeapEntry<K> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reverse ordering for min-heap (earliest deadline first).
        // Ties go to the lower sequence, i.e. registration order.
        match other.deadline.cmp(&self.deadline) {
            std::cmp::Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

/// Queue statistics snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct TimerQueueStats {
    /// Entries currently in the heap, including stale ones
    pub queued: usize,
    pub total_pushed: u64,
    pub total_expired: u64,
    /// Entries dropped because their sequence was no longer armed
    pub total_stale: u64,
}

/// Deadline-ordered queue of timer keys.
pub struct TimerQueue<K> {
    heap: BinaryHeap<HeapEntry<K>>,
    next_seq: u64,
    total_expired: u64,
    total_stale: u64,
}

impl<K: Copy> TimerQueue<K> {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            next_seq: 0,
            total_expired: 0,
            total_stale: 0,
        }
    }

    /// Queue `key` for `deadline`. Returns the sequence the caller must
    /// treat as armed.
    pub fn push(&mut self, key: K, deadline: Instant) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(HeapEntry { deadline, seq, key });
        seq
    }

    /// Earliest deadline among armed entries. Stale heads are dropped.
    pub fn next_deadline<F>(&mut self, is_armed: F) -> Option<Instant>
    where
        F: Fn(K, u64) -> bool,
    {
        while let Some(head) = self.heap.peek() {
            if is_armed(head.key, head.seq) {
                return Some(head.deadline);
            }
            self.heap.pop();
            self.total_stale += 1;
        }
        None
    }

    /// Pop the next armed entry with `deadline <= now`.
    pub fn pop_expired<F>(&mut self, now: Instant, is_armed: F) -> Option<(K, u64)>
    where
        F: Fn(K, u64) -> bool,
    {
        while let Some(head) = self.heap.peek() {
            let armed = is_armed(head.key, head.seq);
            if armed && head.deadline > now {
                return None;
            }
            let entry = self.heap.pop()?;
            if armed {
                self.total_expired += 1;
                return Some((entry.key, entry.seq));
            }
            self.total_stale += 1;
        }
        None
    }

    /// Number of heap entries, stale ones included.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn stats(&self) -> TimerQueueStats {
        TimerQueueStats {
            queued: self.heap.len(),
            total_pushed: self.next_seq,
            total_expired: self.total_expired,
            total_stale: self.total_stale,
        }
    }
}

impl<K: Copy> Default for TimerQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn drain(q: &mut TimerQueue<u32>, now: Instant, armed: &HashMap<u32, u64>) -> Vec<u32> {
        let mut out = Vec::new();
        while let Some((k, _)) = q.pop_expired(now, |k, s| armed.get(&k) == Some(&s)) {
            out.push(k);
        }
        out
    }

    #[test]
    fn fires_in_deadline_order() {
        let base = Instant::now();
        let mut q = TimerQueue::new();
        let mut armed = HashMap::new();
        armed.insert(3, q.push(3, base + Duration::from_millis(30)));
        armed.insert(1, q.push(1, base + Duration::from_millis(10)));
        armed.insert(2, q.push(2, base + Duration::from_millis(20)));

        assert_eq!(q.next_deadline(|k, s| armed.get(&k) == Some(&s)), Some(base + Duration::from_millis(10)));
        assert_eq!(drain(&mut q, base + Duration::from_millis(25), &armed), vec![1, 2]);
        assert_eq!(drain(&mut q, base + Duration::from_millis(30), &armed), vec![3]);
        assert!(q.is_empty());
    }

    #[test]
    fn ties_fire_in_registration_order() {
        let at = Instant::now();
        let mut q = TimerQueue::new();
        let mut armed = HashMap::new();
        for k in [5u32, 1, 4, 2, 3] {
            armed.insert(k, q.push(k, at));
        }
        assert_eq!(drain(&mut q, at, &armed), vec![5, 1, 4, 2, 3]);
    }

    #[test]
    fn stale_entries_are_skipped() {
        let base = Instant::now();
        let mut q = TimerQueue::new();
        let mut armed = HashMap::new();
        armed.insert(1, q.push(1, base));
        armed.insert(2, q.push(2, base + Duration::from_millis(5)));

        // Cancel 1, reschedule 2 later
        armed.remove(&1);
        armed.insert(2, q.push(2, base + Duration::from_millis(50)));

        assert_eq!(
            q.next_deadline(|k, s| armed.get(&k) == Some(&s)),
            Some(base + Duration::from_millis(50))
        );
        assert_eq!(drain(&mut q, base + Duration::from_millis(10), &armed), Vec::<u32>::new());
        assert_eq!(drain(&mut q, base + Duration::from_millis(50), &armed), vec![2]);
        assert_eq!(q.stats().total_stale, 2);
        assert_eq!(q.stats().total_expired, 1);
    }
}
