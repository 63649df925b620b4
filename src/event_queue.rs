//! Discrete-event queue: a min-priority set of scheduled simulated times,
//! breaking ties between equal times by insertion order.
//!
//! There is no deletion by key (spec §4.2 / §9): a frame already in flight
//! is represented by a guard flag in the message engine (`on_way`), not by
//! removing its scheduled event, so "cancelling" a stale event means the
//! handler finds its guard already clear and ignores it.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// The kind of scheduled event and the data the handler needs to process
/// it. `seq` disambiguates ordering when several different things happen
/// to be scheduled for the same kind at different times; the handler
/// itself carries whatever payload it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    SyncTx,
    SyncRx,
    PdelayReqTx,
    PdelayReqRx,
    PdelayRespRx,
}

#[derive(Debug, Clone, Copy)]
struct ScheduledEvent {
    time_sec: f64,
    seq: u64,
    kind: EventKind,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time_sec == other.time_sec && self.seq == other.seq
    }
}
impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    /// Reversed so `BinaryHeap` (a max-heap) behaves as a min-heap on
    /// `time_sec`, with lower `seq` (earlier insertion) breaking ties —
    /// the FIFO ordering spec §5 requires for same-instant events.
    fn cmp(&self, other: &Self) -> Ordering {
        match other
            .time_sec
            .partial_cmp(&self.time_sec)
            .unwrap_or(Ordering::Equal)
        {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

/// Min-priority queue of scheduled simulation events, FIFO among equal
/// times. No cancellation; stale events are filtered by the caller's own
/// guard flags.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        EventQueue {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn add(&mut self, time_sec: f64, kind: EventKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(ScheduledEvent {
            time_sec,
            seq,
            kind,
        });
    }

    /// Time of the earliest scheduled event, without removing it.
    pub fn peek_min_time(&self) -> Option<f64> {
        self.heap.peek().map(|e| e.time_sec)
    }

    /// Remove and return the earliest scheduled event (time, kind).
    pub fn pop(&mut self) -> Option<(f64, EventKind)> {
        self.heap.pop().map(|e| (e.time_sec, e.kind))
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_time_order() {
        let mut q = EventQueue::new();
        q.add(3.0, EventKind::SyncTx);
        q.add(1.0, EventKind::SyncRx);
        q.add(2.0, EventKind::PdelayReqTx);
        assert_eq!(q.pop().unwrap().0, 1.0);
        assert_eq!(q.pop().unwrap().0, 2.0);
        assert_eq!(q.pop().unwrap().0, 3.0);
        assert!(q.pop().is_none());
    }

    #[test]
    fn equal_times_pop_in_fifo_insertion_order() {
        let mut q = EventQueue::new();
        q.add(5.0, EventKind::SyncTx);
        q.add(5.0, EventKind::PdelayReqTx);
        q.add(5.0, EventKind::PdelayRespRx);
        assert_eq!(q.pop().unwrap().1, EventKind::SyncTx);
        assert_eq!(q.pop().unwrap().1, EventKind::PdelayReqTx);
        assert_eq!(q.pop().unwrap().1, EventKind::PdelayRespRx);
    }

    #[test]
    fn peek_min_time_does_not_remove() {
        let mut q = EventQueue::new();
        q.add(10.0, EventKind::SyncTx);
        assert_eq!(q.peek_min_time(), Some(10.0));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn empty_queue_reports_empty() {
        let q = EventQueue::new();
        assert!(q.is_empty());
        assert_eq!(q.peek_min_time(), None);
    }
}
