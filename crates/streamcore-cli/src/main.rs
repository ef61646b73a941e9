//! Standalone runner for a small demo pipeline: a tone-generator `Head`,
//! an identity `OneToOne` stage, and a counting `Tail`, wired and run
//! until Ctrl+C/SIGTERM.
//!
//! Real producers/consumers (capture devices, codecs, network sinks) are
//! external collaborators this crate doesn't implement; the demo stages
//! here exist to exercise the scheduler end to end.

mod config;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use streamcore::filter::shapes::Shape;
use streamcore::filter::transform::{FilterTransform, TransformOneToOne, TransformTail, TransformHead};
use streamcore::filter::{BaseFilter, Role};
use streamcore::frame::Frame;
use streamcore::ids::{ReaderId, WriterId};
use streamcore::{Path as FilterPath, PipelineManager};

use crate::config::RunnerConfig;

#[derive(Parser, Debug)]
#[command(name = "streamcore-runner")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "STREAMCORE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Retry/backoff interval in microseconds (overrides config file).
    #[arg(long, env = "STREAMCORE_RETRY_MICROS")]
    retry_micros: Option<u64>,
}

/// A tone generator standing in for a capture device: emits a fixed-size
/// silent buffer on every tick, timestamped 40ms apart.
struct ToneGenerator {
    next_ts: std::sync::atomic::AtomicI64,
    frame_len_micros: i64,
}

impl FilterTransform for ToneGenerator {}
impl TransformHead for ToneGenerator {
    fn process(&mut self, destinations: &mut std::collections::HashMap<WriterId, Frame>) -> bool {
        let ts = self
            .next_ts
            .fetch_add(self.frame_len_micros, Ordering::Relaxed);
        for f in destinations.values_mut() {
            f.presentation_time = ts;
            f.duration = self.frame_len_micros;
            f.payload = vec![0u8; 160];
        }
        true
    }
}

/// Forwards frames unmodified; a stand-in for a resampler/encoder stage.
struct Identity;
impl FilterTransform for Identity {}
impl TransformOneToOne for Identity {
    fn process(&mut self, origin: &Frame, destination: &mut Frame) -> bool {
        destination.payload = origin.payload.clone();
        true
    }
}

/// Counts delivered frames; a stand-in for a network sink.
struct CountingSink {
    count: Arc<AtomicU64>,
}
impl FilterTransform for CountingSink {}
impl TransformTail for CountingSink {
    fn process(&mut self, origins: &std::collections::HashMap<ReaderId, Frame>) -> bool {
        if !origins.is_empty() {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
        true
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("streamcore-runner v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        RunnerConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(retry) = args.retry_micros {
        config.retry_micros = retry;
    }

    let manager = PipelineManager::new(config.to_core_config());

    let head_id = manager.next_filter_id();
    let mid_id = manager.next_filter_id();
    let tail_id = manager.next_filter_id();

    let delivered = Arc::new(AtomicU64::new(0));

    let head = BaseFilter::new(
        head_id,
        Role::Master,
        true,
        Shape::Head {
            transform: Box::new(ToneGenerator {
                next_ts: std::sync::atomic::AtomicI64::new(0),
                frame_len_micros: 40_000,
            }),
            max_writers: 1,
        },
    );
    let mid = BaseFilter::new(
        mid_id,
        Role::Master,
        false,
        Shape::OneToOne {
            transform: Box::new(Identity),
        },
    );
    mid.set_frame_time(config.frame_time_micros);
    let tail = BaseFilter::new(
        tail_id,
        Role::Master,
        false,
        Shape::Tail {
            transform: Box::new(CountingSink {
                count: delivered.clone(),
            }),
            max_readers: 1,
        },
    );

    manager.register(head);
    manager.register(mid);
    manager.register(tail);
    manager
        .connect_path(&FilterPath::new(vec![head_id, mid_id, tail_id]))
        .context("failed to wire demo pipeline")?;

    log::info!("pipeline wired: head={head_id} mid={mid_id} tail={tail_id}");
    manager.start(vec![vec![head_id, mid_id, tail_id]]);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    log::info!("shutdown requested, stopping pipeline");
    manager.stop();

    log::info!(
        "delivered {} frames to the sink before shutdown",
        delivered.load(Ordering::Relaxed)
    );

    Ok(())
}
