//! Filter shapes (spec.md §4.5): fixed reader/writer cardinality plus the
//! shape-specific output timestamping rule applied after a transform
//! succeeds. `runDoProcessFrame` in the original is one virtual method
//! overridden five ways; here it's one `match` over this enum, since the
//! concrete transform types already give each arm its own trait object.

use std::collections::HashMap;

use serde_json::{json, Value};

use super::timing::Timing;
use super::transform::{
    TransformHead, TransformManyToOne, TransformOneToMany, TransformOneToOne, TransformTail,
};
use crate::frame::Frame;
use crate::ids::{ReaderId, WriterId};

/// Draws the next sequence number for `writer` from its per-writer counter
/// and advances it, for the two shapes that stamp a sequence number of
/// their own rather than copying one from an origin frame (spec.md §4.5:
/// Head and ManyToOne both read "sequence number from per-writer counter").
fn next_seq_num(seq_nums: &mut HashMap<WriterId, u64>, writer: WriterId) -> u64 {
    let seq = seq_nums.entry(writer).or_insert(0);
    let next = *seq;
    *seq += 1;
    next
}

pub enum Shape {
    /// No readers; originates frames from outside the graph (a capture
    /// device, a tone generator, ...). `max_writers` is usually 1 but some
    /// sources fan out directly.
    Head {
        transform: Box<dyn TransformHead>,
        max_writers: usize,
    },
    /// No writers; a terminal sink (a file, a socket, a counter).
    Tail {
        transform: Box<dyn TransformTail>,
        max_readers: usize,
    },
    /// Exactly one reader, one writer.
    OneToOne { transform: Box<dyn TransformOneToOne> },
    /// One reader, many writers (a splitter).
    OneToMany {
        transform: Box<dyn TransformOneToMany>,
        max_writers: usize,
    },
    /// Many readers, one writer (a mixer).
    ManyToOne {
        transform: Box<dyn TransformManyToOne>,
        max_readers: usize,
    },
}

impl Shape {
    pub fn max_readers(&self) -> usize {
        match self {
            Shape::Head { .. } => 0,
            Shape::Tail { max_readers, .. } => *max_readers,
            Shape::OneToOne { .. } => 1,
            Shape::OneToMany { .. } => 1,
            Shape::ManyToOne { max_readers, .. } => *max_readers,
        }
    }

    pub fn max_writers(&self) -> usize {
        match self {
            Shape::Head { max_writers, .. } => *max_writers,
            Shape::Tail { .. } => 0,
            Shape::OneToOne { .. } => 1,
            Shape::OneToMany { max_writers, .. } => *max_writers,
            Shape::ManyToOne { .. } => 1,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Shape::Head { .. } => "head",
            Shape::Tail { .. } => "tail",
            Shape::OneToOne { .. } => "one_to_one",
            Shape::OneToMany { .. } => "one_to_many",
            Shape::ManyToOne { .. } => "many_to_one",
        }
    }

    pub fn queue_capacity(&self) -> usize {
        use crate::filter::transform::FilterTransform;
        match self {
            Shape::Head { transform, .. } => transform.queue_capacity(),
            Shape::Tail { transform, .. } => transform.queue_capacity(),
            Shape::OneToOne { transform } => transform.queue_capacity(),
            Shape::OneToMany { transform, .. } => transform.queue_capacity(),
            Shape::ManyToOne { transform, .. } => transform.queue_capacity(),
        }
    }

    pub fn transform_state(&self) -> Value {
        use crate::filter::transform::FilterTransform;
        match self {
            Shape::Head { transform, .. } => transform.state(),
            Shape::Tail { transform, .. } => transform.state(),
            Shape::OneToOne { transform } => transform.state(),
            Shape::OneToMany { transform, .. } => transform.state(),
            Shape::ManyToOne { transform, .. } => transform.state(),
        }
    }

    /// Runs the transform and, on success, stamps the shape's output
    /// timestamping rule (spec.md §4.5 table). Destination frames are
    /// marked `consumed = true` only on success — a failing transform
    /// commits nothing, matching spec.md §7 error kind 3.
    pub fn run(
        &mut self,
        o_frames: &HashMap<ReaderId, Frame>,
        d_frames: &mut HashMap<WriterId, Frame>,
        timing: &mut Timing,
        seq_nums: &mut HashMap<WriterId, u64>,
    ) -> bool {
        match self {
            Shape::Head { transform, .. } => {
                if !transform.process(d_frames) {
                    return false;
                }
                for (&wid, f) in d_frames.iter_mut() {
                    f.sequence_number = next_seq_num(seq_nums, wid);
                    f.consumed = true;
                }
                true
            }
            Shape::Tail { transform, .. } => transform.process(o_frames),
            Shape::OneToOne { transform } => {
                let Some((_, origin)) = o_frames.iter().next() else {
                    return false;
                };
                let Some((_, destination)) = d_frames.iter_mut().next() else {
                    return false;
                };
                if !transform.process(origin, destination) {
                    return false;
                }
                // "Frame-time mixing" filters own their syncTs baseline;
                // best-effort ones (frameTime == 0) take it straight from
                // the origin frame they just consumed.
                if timing.frame_time <= 0 {
                    timing.sync_ts = origin.presentation_time;
                }
                destination.presentation_time = timing.sync_ts;
                destination.duration = origin.duration;
                destination.sequence_number = origin.sequence_number;
                destination.consumed = true;
                true
            }
            Shape::OneToMany { transform, .. } => {
                let Some((_, origin)) = o_frames.iter().next() else {
                    return false;
                };
                if !transform.process(origin, d_frames) {
                    return false;
                }
                for f in d_frames.values_mut() {
                    // The original leaves timestamping to the transform and
                    // only guarantees the sequence number is copied; filling
                    // in presentation time/duration from the origin too
                    // finishes what was a `TODO` there rather than leaving
                    // every `TransformOneToMany` impl to redo it.
                    f.presentation_time = origin.presentation_time;
                    f.duration = origin.duration;
                    f.sequence_number = origin.sequence_number;
                    f.consumed = true;
                }
                true
            }
            Shape::ManyToOne { transform, .. } => {
                let Some((&wid, destination)) = d_frames.iter_mut().next() else {
                    return false;
                };
                if !transform.process(o_frames, destination) {
                    return false;
                }
                destination.sequence_number = next_seq_num(seq_nums, wid);
                destination.consumed = true;
                true
            }
        }
    }

    pub fn state(&self) -> Value {
        json!({
            "shape": self.type_name(),
            "maxReaders": self.max_readers(),
            "maxWriters": self.max_writers(),
            "transform": self.transform_state(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::transform::FilterTransform;
    use crate::ids::{ReaderId, WriterId};

    struct NoopHead;
    impl FilterTransform for NoopHead {}
    impl TransformHead for NoopHead {
        fn process(&mut self, _destinations: &mut HashMap<WriterId, Frame>) -> bool {
            true
        }
    }

    #[test]
    fn head_stamps_monotone_sequence_numbers_from_its_own_counter() {
        let mut shape = Shape::Head {
            transform: Box::new(NoopHead),
            max_writers: 1,
        };
        let mut timing = Timing::new(0);
        let mut seq_nums = HashMap::new();
        let o_frames = HashMap::new();

        for expected in 0..3u64 {
            let mut d_frames = HashMap::from([(WriterId(1), Frame::empty())]);
            assert!(shape.run(&o_frames, &mut d_frames, &mut timing, &mut seq_nums));
            let frame = &d_frames[&WriterId(1)];
            assert_eq!(frame.sequence_number, expected);
            assert!(frame.consumed);
        }
    }

    /// A mixer that stamps its own presentation time, distinct from
    /// `syncTs`, to prove the core doesn't overwrite it afterwards.
    struct CustomTimestampMixer;
    impl FilterTransform for CustomTimestampMixer {}
    impl TransformManyToOne for CustomTimestampMixer {
        fn process(
            &mut self,
            origins: &HashMap<ReaderId, Frame>,
            destination: &mut Frame,
        ) -> bool {
            destination.presentation_time =
                origins.values().map(|f| f.presentation_time).max().unwrap_or(0);
            true
        }
    }

    #[test]
    fn many_to_one_does_not_overwrite_transform_supplied_presentation_time() {
        let mut shape = Shape::ManyToOne {
            transform: Box::new(CustomTimestampMixer),
            max_readers: 2,
        };
        // `sync_ts` deliberately differs from the transform's own
        // timestamp so a stomp would be observable.
        let mut timing = Timing::new(0);
        timing.sync_ts = 999;
        let mut seq_nums = HashMap::new();
        let o_frames = HashMap::from([
            (ReaderId(1), Frame::new(1_000, 40_000, 0, vec![])),
            (ReaderId(2), Frame::new(2_000, 40_000, 0, vec![])),
        ]);
        let mut d_frames = HashMap::from([(WriterId(1), Frame::empty())]);

        assert!(shape.run(&o_frames, &mut d_frames, &mut timing, &mut seq_nums));
        let frame = &d_frames[&WriterId(1)];
        assert_eq!(frame.presentation_time, 2_000, "transform's own timestamp must survive");
        assert_eq!(frame.sequence_number, 0);
        assert!(frame.consumed);
    }
}
