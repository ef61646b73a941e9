//! Deferred, timestamp-ordered, per-filter control events.
//!
//! An external controller can reconfigure a running filter without pausing
//! the graph by pushing an [`Event`]; it's queued and dispatched at the top
//! of the filter's next tick (or synchronously for Head/Tail, which may go
//! long stretches without a tick — spec.md §4.6).

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

/// Microseconds since an arbitrary wall-clock epoch. Callers typically pass
/// `now_micros()` or a value derived from an external clock; the core never
/// reads the system clock itself beyond that helper, keeping the event
/// ordering logic deterministic and testable.
pub type Timestamp = i64;

pub fn now_micros() -> Timestamp {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as Timestamp)
        .unwrap_or(0)
}

/// A handle a transport layer can use to write a reply and close its
/// connection. The dataflow core never touches sockets directly (that's an
/// external collaborator per spec.md §6) — this trait is the seam.
pub trait EventReply: Send {
    fn send_and_close(self: Box<Self>, response: Value);
}

/// A deferred control message targeting one filter's action dispatch table.
pub struct Event {
    pub action: String,
    pub params: Value,
    pub timestamp: Timestamp,
    pub reply: Option<Box<dyn EventReply>>,
}

impl Event {
    pub fn new(action: impl Into<String>, params: Value, timestamp: Timestamp) -> Self {
        Self {
            action: action.into(),
            params,
            timestamp,
            reply: None,
        }
    }

    pub fn with_reply(mut self, reply: Box<dyn EventReply>) -> Self {
        self.reply = Some(reply);
        self
    }

    /// An event is ready to execute only once `now` is strictly past its
    /// timestamp — matching the original's `canBeExecuted` (`currentTime >
    /// timestamp`), not `>=`. An event timestamped exactly "now" waits one
    /// more tick.
    pub fn ready(&self, now: Timestamp) -> bool {
        now > self.timestamp
    }
}

/// Wraps an [`Event`] with an insertion sequence number so the queue can
/// break timestamp ties by arrival order (spec.md §4.6: "ties are broken by
/// insertion order (stable)").
struct Queued {
    event: Event,
    seq: u64,
}

impl Queued {
    fn key(&self) -> (Timestamp, u64) {
        (self.event.timestamp, self.seq)
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    /// Reversed so that `BinaryHeap` (a max-heap) keeps the *earliest*
    /// timestamp at the top — the source's own reverse `operator<` on
    /// `Event`, made a first-class comparator here instead of a comment
    /// ("cosmetic", per spec.md §9) on an otherwise-natural ordering.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.key().cmp(&self.key())
    }
}

/// Per-filter priority queue of pending events, ordered earliest-first.
#[derive(Default)]
pub struct EventQueue {
    heap: Mutex<BinaryHeap<Queued>>,
    next_seq: AtomicU64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn push(&self, event: Event) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.heap.lock().push(Queued { event, seq });
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    /// Pops and returns the earliest event if it is ready to execute at
    /// `now`; otherwise leaves the queue untouched and returns `None`. An
    /// event whose timestamp is in the future is never executed early
    /// (spec.md §3 invariant).
    pub fn pop_ready(&self, now: Timestamp) -> Option<Event> {
        let mut heap = self.heap.lock();
        let ready = heap.peek().is_some_and(|q| q.event.ready(now));
        if ready {
            heap.pop().map(|q| q.event)
        } else {
            None
        }
    }

    /// Drains every event ready at `now`, in timestamp order, applying `f`
    /// to each. Unknown actions / handler failures are the caller's
    /// responsibility to log and swallow — per spec.md §7, error kind 4,
    /// a dispatch failure never aborts the remaining drain.
    pub fn drain_ready(&self, now: Timestamp, mut f: impl FnMut(Event)) {
        while let Some(event) = self.pop_ready(now) {
            f(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_pop_in_timestamp_order() {
        let q = EventQueue::new();
        q.push(Event::new("b", json!({}), 200));
        q.push(Event::new("a", json!({}), 100));
        q.push(Event::new("c", json!({}), 300));

        let order: Vec<_> = std::iter::from_fn(|| q.pop_ready(1_000)).map(|e| e.action).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let q = EventQueue::new();
        q.push(Event::new("first", json!({}), 100));
        q.push(Event::new("second", json!({}), 100));

        let first = q.pop_ready(1_000).unwrap();
        let second = q.pop_ready(1_000).unwrap();
        assert_eq!(first.action, "first");
        assert_eq!(second.action, "second");
    }

    #[test]
    fn future_event_is_not_popped_early() {
        let q = EventQueue::new();
        q.push(Event::new("later", json!({}), 500));
        assert!(q.pop_ready(500).is_none(), "ready() is strict >, not >=");
        assert!(q.pop_ready(501).is_some());
    }

    #[test]
    fn drain_ready_applies_in_order_and_stops_at_future_events() {
        let q = EventQueue::new();
        q.push(Event::new("now", json!({}), 0));
        q.push(Event::new("future", json!({}), 1_000_000));

        let mut seen = Vec::new();
        q.drain_ready(100, |e| seen.push(e.action));
        assert_eq!(seen, vec!["now"]);
        assert!(!q.is_empty());
    }
}
