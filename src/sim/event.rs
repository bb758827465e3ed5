//! Timestamped events and the queue that orders them.
//!
//! The simulator advances logical time only when an event fires. Events are
//! kept in a min-priority queue keyed by timestamp; events sharing a
//! timestamp fire in insertion order, which the queue guarantees with a
//! monotonically increasing sequence number. Several events routinely share
//! a timestamp, because event kinds position themselves relative to the next
//! instruction fetch with small fixed offsets.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::asm::obj::ObjectFile;
use crate::sim::frame::CallbackType;
use crate::sim::state::DeviceId;

/// What an event does when it fires.
#[derive(Debug, Clone)]
pub enum EventKind {
    /// One-time environment setup (loads the operating system).
    Setup,
    /// Raises the run bit; the first power-on also initializes PC/PSR/stack.
    PowerOn,
    /// Clears the run bit, ending the current run.
    Shutdown,
    /// Copies an object image into memory.
    LoadObjFile(ObjectFile),
    /// Fetches, decodes, and executes one instruction atomically.
    AtomicInstProcess,
    /// Gives one device a time slice.
    DeviceUpdate(DeviceId),
    /// Accepts the highest-priority pending interrupt, if it outranks the
    /// current PSR priority.
    CheckForInterrupt,
    /// Fires a registered callback.
    Callback(CallbackType),
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Setup => f.write_str("setup"),
            EventKind::PowerOn => f.write_str("power-on"),
            EventKind::Shutdown => f.write_str("shutdown"),
            EventKind::LoadObjFile(obj) => write!(f, "load object file ({} records)", obj.records().len()),
            EventKind::AtomicInstProcess => f.write_str("instruction process"),
            EventKind::DeviceUpdate(id) => write!(f, "device update (device {id})"),
            EventKind::CheckForInterrupt => f.write_str("check for interrupt"),
            EventKind::Callback(which) => write!(f, "callback ({which})"),
        }
    }
}

/// An event scheduled at a logical time.
#[derive(Debug, Clone)]
pub struct Event {
    /// When the event fires.
    pub time: u64,
    /// What the event does.
    pub kind: EventKind,
}

impl Event {
    /// Creates an event.
    pub fn new(time: u64, kind: EventKind) -> Self {
        Event { time, kind }
    }
}

struct QueuedEvent {
    seq: u64,
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.event.time == other.event.time && self.seq == other.seq
    }
}
impl Eq for QueuedEvent {}
impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the earliest event
        // (breaking ties by insertion order) on top.
        other
            .event
            .time
            .cmp(&self.event.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A min-priority queue of events, stable for equal timestamps.
#[derive(Default)]
pub struct EventQueue {
    heap: BinaryHeap<QueuedEvent>,
    next_seq: u64,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules an event.
    pub fn push(&mut self, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueuedEvent { seq, event });
    }

    /// Removes and returns the earliest event.
    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop().map(|qe| qe.event)
    }

    /// Whether any events are scheduled.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drops every scheduled event.
    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("len", &self.heap.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders_by_time() {
        let mut q = EventQueue::new();
        q.push(Event::new(30, EventKind::Shutdown));
        q.push(Event::new(10, EventKind::PowerOn));
        q.push(Event::new(20, EventKind::CheckForInterrupt));

        assert_eq!(q.pop().unwrap().time, 10);
        assert_eq!(q.pop().unwrap().time, 20);
        assert_eq!(q.pop().unwrap().time, 30);
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_equal_times_fire_in_insertion_order() {
        let mut q = EventQueue::new();
        q.push(Event::new(20, EventKind::Callback(CallbackType::PreInst)));
        q.push(Event::new(20, EventKind::AtomicInstProcess));
        q.push(Event::new(20, EventKind::Callback(CallbackType::PostInst)));

        let kinds: Vec<_> = std::iter::from_fn(|| q.pop()).map(|e| e.kind).collect();
        assert!(matches!(kinds[0], EventKind::Callback(CallbackType::PreInst)));
        assert!(matches!(kinds[1], EventKind::AtomicInstProcess));
        assert!(matches!(kinds[2], EventKind::Callback(CallbackType::PostInst)));
    }
}
