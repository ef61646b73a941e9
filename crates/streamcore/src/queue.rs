//! Bounded single-producer/single-consumer frame queue.
//!
//! The queue never blocks its producer (spec.md §4.1): once full, writing a
//! new frame overwrites the oldest unread one instead of waiting for the
//! consumer to catch up. Live media favors freshness over completeness —
//! a dropped stale frame is invisible to viewers, a stalled producer is not.

use parking_lot::Mutex;

use crate::frame::Frame;
use crate::ids::FilterId;

/// Default ring capacity for queues allocated without an explicit size hint.
pub const DEFAULT_CAPACITY: usize = 8;

struct Inner {
    slots: Vec<Frame>,
    /// Index of the next slot the producer will fill.
    write_idx: usize,
    /// Index of the oldest frame not yet removed by the consumer.
    read_idx: usize,
    /// Number of frames currently occupying the ring (`<= slots.len()`).
    count: usize,
    /// Clone of the most recently removed frame, used to satisfy
    /// reuse-on-empty reads (`front_or_reuse`) the way the original's
    /// `getFrame(true)` does when no fresh frame is available.
    last_delivered: Frame,
}

impl Inner {
    fn is_full(&self) -> bool {
        self.count == self.slots.len()
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// A bounded ring of [`Frame`]s connecting exactly one producer to exactly
/// one consumer. The queue itself doesn't know *which* filters it connects;
/// [`crate::connection::Writer::connect`] stashes the peer filter IDs so
/// that [`FrameQueue::add_frame`]/[`FrameQueue::remove_frame`] can return
/// the right "enabled job" hint.
pub struct FrameQueue {
    inner: Mutex<Inner>,
    /// Filter that may become runnable once a frame is added (the consumer).
    consumer: FilterId,
    /// Filter that may become runnable once a frame is removed (the producer).
    producer: FilterId,
}

impl FrameQueue {
    /// Creates a queue of the given capacity (rounded up to at least 1)
    /// between a producer and consumer filter.
    pub fn new(capacity: usize, producer: FilterId, consumer: FilterId) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                slots: vec![Frame::empty(); capacity],
                write_idx: 0,
                read_idx: 0,
                count: 0,
                last_delivered: Frame::empty(),
            }),
            consumer,
            producer,
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Producer-side: returns the frame currently occupying the rear slot
    /// (a template to overwrite with fresh data) — equivalent to the
    /// original's `getRear`. If the ring is full, this is the oldest unread
    /// frame; it's returned with `consumed` forced to `false` to signal the
    /// impending overflow to the caller.
    pub fn rear_template(&self) -> Frame {
        let inner = self.inner.lock();
        let mut f = inner.slots[inner.write_idx].clone();
        if inner.is_full() {
            f.consumed = false;
        }
        f
    }

    /// Producer-side: commits `frame` into the rear slot and advances the
    /// write cursor. If the ring was full, this silently overwrites (and
    /// drops) the oldest unread frame and the read cursor advances with it —
    /// the queue never blocks the producer. Returns the consumer filter ID
    /// as an "enabled job" hint, matching spec.md's `addFrame` contract
    /// (`None` is the spec's sentinel `0`, "no hint").
    pub fn add_frame(&self, frame: Frame) -> Option<FilterId> {
        let mut inner = self.inner.lock();
        let was_full = inner.is_full();
        let idx = inner.write_idx;
        inner.slots[idx] = frame;
        let cap = inner.slots.len();
        inner.write_idx = (inner.write_idx + 1) % cap;
        if was_full {
            inner.read_idx = (inner.read_idx + 1) % cap;
            log::trace!("frame queue overwrote unread frame (producer {})", self.producer);
        } else {
            inner.count += 1;
        }
        Some(self.consumer)
    }

    /// Consumer-side: the next unread frame, or `None` if the queue is empty.
    /// Does not remove it — equivalent to the original's `getFrame()`.
    pub fn front(&self) -> Option<Frame> {
        let inner = self.inner.lock();
        if inner.is_empty() {
            None
        } else {
            Some(inner.slots[inner.read_idx].clone())
        }
    }

    /// Consumer-side: like [`Self::front`], but when the queue is empty
    /// returns a clone of the last-removed frame with `consumed` forced to
    /// `false`, so callers can restage a stale frame for reuse instead of
    /// stalling — equivalent to the original's `getFrame(true)`.
    pub fn front_or_reuse(&self) -> Frame {
        let inner = self.inner.lock();
        if inner.is_empty() {
            let mut f = inner.last_delivered.clone();
            f.consumed = false;
            f
        } else {
            inner.slots[inner.read_idx].clone()
        }
    }

    /// Consumer-side: advances the read cursor past the oldest frame.
    /// Never blocks; returns `None` (the spec's `0`) when already empty,
    /// otherwise the producer filter ID that may now have a free slot.
    pub fn remove_frame(&self) -> Option<FilterId> {
        let mut inner = self.inner.lock();
        if inner.is_empty() {
            return None;
        }
        let idx = inner.read_idx;
        inner.last_delivered = inner.slots[idx].clone();
        let cap = inner.slots.len();
        inner.read_idx = (inner.read_idx + 1) % cap;
        inner.count -= 1;
        Some(self.producer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk() -> FrameQueue {
        FrameQueue::new(4, FilterId(1), FilterId(2))
    }

    #[test]
    fn empty_queue_yields_no_front_and_no_remove_hint() {
        let q = mk();
        assert!(q.front().is_none());
        assert!(q.remove_frame().is_none());
    }

    #[test]
    fn add_then_front_then_remove_roundtrip() {
        let q = mk();
        let f = Frame::new(1000, 40_000, 0, vec![9]);
        let hint = q.add_frame(f.clone());
        assert_eq!(hint, Some(FilterId(2)));
        let front = q.front().unwrap();
        assert_eq!(front.presentation_time, 1000);
        let producer_hint = q.remove_frame().unwrap();
        assert_eq!(producer_hint, FilterId(1));
        assert!(q.is_empty());
    }

    #[test]
    fn overwrite_on_lap_drops_oldest_unread() {
        let q = mk(); // capacity 4
        for i in 0..4 {
            q.add_frame(Frame::new(i * 1000, 1000, i as u64, vec![]));
        }
        assert_eq!(q.len(), 4);
        // Queue is full and none have been removed: this 5th add must
        // overwrite (lap) the oldest frame (sequence 0) rather than block.
        q.add_frame(Frame::new(5000, 1000, 4, vec![]));
        assert_eq!(q.len(), 4, "overwrite must not grow past capacity");
        let front = q.front().unwrap();
        assert_eq!(
            front.sequence_number, 1,
            "oldest unread frame (seq 0) should have been overwritten"
        );
    }

    #[test]
    fn front_or_reuse_returns_last_delivered_when_empty() {
        let q = mk();
        q.add_frame(Frame::new(42, 1, 0, vec![]));
        q.remove_frame();
        assert!(q.front().is_none());
        let reused = q.front_or_reuse();
        assert_eq!(reused.presentation_time, 42);
        assert!(!reused.consumed);
    }

    #[test]
    fn rear_template_signals_overflow_when_full() {
        let q = mk();
        for i in 0..4 {
            q.add_frame(Frame::new(i, 1, i as u64, vec![]));
        }
        let template = q.rear_template();
        assert!(!template.consumed);
    }
}
