// Scheduler - The single event timeline driven by the transport clock
//
// Every future action (step triggers, clicks, deferred state changes) is an
// entry on one timeline. Entries due at the same instant come out in the order
// they were scheduled.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug)]
struct Entry<E> {
    fire_at: f64,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Entry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<E> Eq for Entry<E> {}

impl<E> PartialOrd for Entry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Entry<E> {
    // Reversed: BinaryHeap is a max-heap, the earliest entry must surface first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fire_at
            .total_cmp(&self.fire_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Time-ordered queue of pending events
#[derive(Debug)]
pub struct EventTimeline<E> {
    heap: BinaryHeap<Entry<E>>,
    next_seq: u64,
}

impl<E> EventTimeline<E> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Schedule `event` to fire once the clock reaches `fire_at`
    pub fn schedule(&mut self, fire_at: f64, event: E) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            fire_at,
            seq,
            event,
        });
    }

    /// Fire time of the earliest pending event
    pub fn next_time(&self) -> Option<f64> {
        self.heap.peek().map(|entry| entry.fire_at)
    }

    /// Remove and return the earliest event if it is due at `now`
    pub fn pop_due(&mut self, now: f64) -> Option<(f64, E)> {
        if self.next_time()? <= now {
            self.heap.pop().map(|entry| (entry.fire_at, entry.event))
        } else {
            None
        }
    }

    /// Drop every pending event
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.heap.len();
        self.heap.clear();
        cancelled
    }

    /// Drop pending events matching `predicate`
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&E) -> bool) -> usize {
        let before = self.heap.len();
        self.heap.retain(|entry| !predicate(&entry.event));
        before - self.heap.len()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<E> Default for EventTimeline<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_fire_in_time_order() {
        let mut timeline = EventTimeline::new();
        timeline.schedule(2.0, "c");
        timeline.schedule(0.5, "a");
        timeline.schedule(1.0, "b");

        assert_eq!(timeline.pop_due(0.4), None);
        assert_eq!(timeline.pop_due(1.5), Some((0.5, "a")));
        assert_eq!(timeline.pop_due(1.5), Some((1.0, "b")));
        assert_eq!(timeline.pop_due(1.5), None);
        assert_eq!(timeline.next_time(), Some(2.0));
    }

    #[test]
    fn test_same_time_preserves_program_order() {
        let mut timeline = EventTimeline::new();
        for i in 0..50 {
            timeline.schedule(1.0, i);
        }
        let fired: Vec<i32> = std::iter::from_fn(|| timeline.pop_due(1.0).map(|(_, e)| e)).collect();
        assert_eq!(fired, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_cancel() {
        let mut timeline = EventTimeline::new();
        timeline.schedule(1.0, 1);
        timeline.schedule(2.0, 2);
        timeline.schedule(3.0, 3);
        assert_eq!(timeline.cancel_where(|e| *e == 2), 1);
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.cancel_all(), 2);
        assert!(timeline.is_empty());
        assert_eq!(timeline.pop_due(10.0), None);
    }
}
