//! The filter–transform contract (spec.md §6): the only part of a filter
//! that's domain-specific. Everything else (demand policies, timestamping,
//! commit/release) is generic and lives in [`super::BaseFilter`].
//!
//! One trait per shape, matching spec.md §9's direction to replace the
//! original's virtual `runDoProcessFrame` hierarchy with a small set of
//! traits rather than a base-class method every shape overrides.

use std::collections::HashMap;
use serde_json::Value;

use crate::frame::Frame;
use crate::ids::{ReaderId, WriterId};

/// Returns the queue capacity a filter wants for the frames it produces.
/// Corresponds to `allocQueue` in spec.md §6 — "the filter knows what
/// payload media it produces and supplies a queue sized appropriately" —
/// simplified to a capacity hint since queue *allocation* itself (the ring
/// array) is generic over `Frame` and doesn't need a per-filter type.
pub trait FilterTransform: Send {
    fn queue_capacity(&self) -> usize {
        crate::queue::DEFAULT_CAPACITY
    }

    /// Filter-specific introspection fields, appended into `getState`'s
    /// output object (spec.md §6, `doGetState`).
    fn state(&self) -> Value {
        Value::Null
    }
}

pub trait TransformOneToOne: FilterTransform {
    fn process(&mut self, origin: &Frame, destination: &mut Frame) -> bool;
}

pub trait TransformOneToMany: FilterTransform {
    fn process(&mut self, origin: &Frame, destinations: &mut HashMap<WriterId, Frame>) -> bool;
}

pub trait TransformManyToOne: FilterTransform {
    fn process(&mut self, origins: &HashMap<ReaderId, Frame>, destination: &mut Frame) -> bool;
}

pub trait TransformHead: FilterTransform {
    fn process(&mut self, destinations: &mut HashMap<WriterId, Frame>) -> bool;
}

pub trait TransformTail: FilterTransform {
    fn process(&mut self, origins: &HashMap<ReaderId, Frame>) -> bool;
}
