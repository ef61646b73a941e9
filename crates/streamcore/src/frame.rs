//! Media frame: the unit of data that flows between filters.

use serde::Serialize;

/// Presentation time in microseconds, relative to an arbitrary epoch fixed
/// by the first writer on a path. Signed so that frames produced before a
/// filter's `syncTs` baseline (late arrivals) can still be represented.
pub type PresentationTime = i64;

/// A duration in microseconds.
pub type Micros = i64;

/// Monotone per-writer counter identifying a frame's position in its stream.
pub type SequenceNumber = u64;

/// An opaque media payload carrying timing metadata.
///
/// `consumed` starts `false` for every frame handed to a consumer and is
/// flipped to `true` by the consumer once it has read the frame. Producers
/// must not mutate a frame (including its payload) once it has been
/// published via [`crate::queue::FrameQueue::add_frame`].
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub presentation_time: PresentationTime,
    pub duration: Micros,
    pub sequence_number: SequenceNumber,
    pub consumed: bool,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates a new, unconsumed frame.
    pub fn new(
        presentation_time: PresentationTime,
        duration: Micros,
        sequence_number: SequenceNumber,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            presentation_time,
            duration,
            sequence_number,
            consumed: false,
            payload,
        }
    }

    /// An empty frame used to pre-fill queue slots before any real frame has
    /// been written to them.
    pub fn empty() -> Self {
        Self {
            presentation_time: 0,
            duration: 0,
            sequence_number: 0,
            consumed: true,
            payload: Vec::new(),
        }
    }

    pub fn mark_consumed(&mut self) {
        self.consumed = true;
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::empty()
    }
}
