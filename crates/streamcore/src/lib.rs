//! Dataflow core of a live media streaming engine.
//!
//! A pipeline is a directed graph of [`filter::BaseFilter`] nodes connected
//! by bounded, overwrite-on-full [`queue::FrameQueue`]s. Each filter is
//! driven by a [`worker::Worker`] thread that ticks it through demand →
//! transform → commit every round; [`pipeline::PipelineManager`] owns
//! filter ID allocation, the shared filter registry, and worker lifecycle.
//!
//! External collaborators — codecs, RTP/RTSP/SDP, muxing, the socket layer
//! that feeds [`event::Event`]s in — are out of scope here; this crate is
//! the scheduling and timing core they plug into.

pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod filter;
pub mod frame;
pub mod ids;
pub mod pipeline;
pub mod queue;
pub mod worker;

pub use config::{CoreConfig, DEFAULT_RETRY_MICROS};
pub use error::{CoreError, CoreResult, ErrorCode};
pub use frame::Frame;
pub use ids::{FilterId, ReaderId, WriterId};
pub use pipeline::{Path, PipelineManager};
