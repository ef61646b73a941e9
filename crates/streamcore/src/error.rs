//! Centralized error types for the dataflow core.
//!
//! Mirrors the teacher crate's `error.rs`: a `thiserror`-derived enum, an
//! [`ErrorCode`] trait for machine-readable codes, and a `Result` alias.
//! Per spec.md §7, none of these ever cross a filter tick boundary — a tick
//! always returns normally. They're surfaced only from the graph
//! *construction* APIs (`connect`, `push_event` on a closed filter, ...),
//! where capacity violations and connect-side failures are reported to the
//! caller instead of being swallowed.

use thiserror::Error;

use crate::ids::{FilterId, ReaderId, WriterId};

/// Trait for error types that provide a machine-readable error code,
/// independent of the human-readable `Display` message.
pub trait ErrorCode {
    fn code(&self) -> &'static str;
}

/// Errors raised while building or reconfiguring the graph.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A filter already has `maxReaders`/`maxWriters` readers/writers.
    #[error("filter {filter} has no capacity for another {kind}")]
    CapacityExceeded { filter: FilterId, kind: &'static str },

    /// A reader or writer ID was reused within the same filter.
    #[error("reader/writer id must be unique within a filter")]
    DuplicateId,

    /// The requested reader does not exist on the target filter.
    #[error("filter {filter} has no reader {reader}")]
    UnknownReader { filter: FilterId, reader: ReaderId },

    /// The requested writer does not exist on the source filter.
    #[error("filter {filter} has no writer {writer}")]
    UnknownWriter { filter: FilterId, writer: WriterId },

    /// The peer side of a connection was already connected.
    #[error("peer already connected")]
    AlreadyConnected,

    /// The filter-supplied `allocQueue` callback declined to produce a queue.
    #[error("queue allocation failed for path {src} -> {dst}")]
    QueueAllocationFailed { src: FilterId, dst: FilterId },

    /// A slave filter was added to more than one master, or with an invalid id.
    #[error("invalid slave registration: {0}")]
    InvalidSlave(String),

    /// The referenced filter is not registered with the pipeline.
    #[error("unknown filter {0}")]
    UnknownFilter(FilterId),
}

impl ErrorCode for CoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::DuplicateId => "duplicate_id",
            Self::UnknownReader { .. } => "unknown_reader",
            Self::UnknownWriter { .. } => "unknown_writer",
            Self::AlreadyConnected => "already_connected",
            Self::QueueAllocationFailed { .. } => "queue_allocation_failed",
            Self::InvalidSlave(_) => "invalid_slave",
            Self::UnknownFilter(_) => "unknown_filter",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_exceeded_has_stable_code() {
        let err = CoreError::CapacityExceeded {
            filter: FilterId(1),
            kind: "reader",
        };
        assert_eq!(err.code(), "capacity_exceeded");
    }

    #[test]
    fn duplicate_id_has_stable_code() {
        assert_eq!(CoreError::DuplicateId.code(), "duplicate_id");
    }
}
