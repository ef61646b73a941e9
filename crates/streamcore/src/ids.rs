//! Identifier newtypes used throughout the graph.
//!
//! Filters, readers and writers are all referred to by small integer IDs
//! rather than owning pointers — back-references (master/slave, peer
//! reader/writer) are cycles in the graph, and representing them as IDs into
//! a registry keeps ownership with the registry instead of needing `Weak`
//! pointers or unsafe aliasing (spec.md §9, "Back references").

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

macro_rules! id_type {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(FilterId, "Unique ID of a filter within a pipeline.");
id_type!(ReaderId, "ID of a reader within its owning filter.");
id_type!(WriterId, "ID of a writer within its owning filter.");

/// Monotone ID generator. Used by [`crate::pipeline::PipelineManager`] for
/// filter IDs and by [`crate::filter::BaseFilter`] for reader/writer IDs
/// when a shape allows more than one of either (the original C++ used
/// `rand()` with collision retry; a counter gives the same uniqueness
/// guarantee without needing an RNG dependency).
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: AtomicU32,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    pub fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotone_and_unique() {
        let gen = IdGenerator::new();
        let a = gen.next();
        let b = gen.next();
        assert_ne!(a, b);
        assert!(b > a);
    }
}
