//! `Worker`: one OS thread that owns a fixed set of filters and schedules
//! ticks among them (spec.md §5).
//!
//! Filters aren't ticked in a tight loop; each carries a ready/not-ready
//! flag in a registry shared across every worker (so a filter's "enabled
//! job" hint, returned from another worker's tick, can wake it up no
//! matter which thread owns it). A filter that reports
//! [`TickStatus::Retry`] is parked and given a timed wakeup instead of
//! being re-polled immediately, the direct translation of the original's
//! `sleep_for(RETRY)` into a per-filter backoff that doesn't block sibling
//! filters on the same worker.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::filter::{FilterRegistry, TickStatus};
use crate::ids::FilterId;

/// Tracks which filters are currently runnable, shared by every worker in
/// a pipeline. A filter becomes ready when it's first scheduled, when
/// another filter's tick returns it as an "enabled job" hint, or when its
/// own retry backoff elapses.
#[derive(Default)]
pub struct ReadySet {
    ready: Mutex<HashSet<FilterId>>,
    cv: Condvar,
}

impl ReadySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ready(&self, id: FilterId) {
        self.ready.lock().insert(id);
        self.cv.notify_all();
    }

    fn mark_not_ready(&self, id: FilterId) {
        self.ready.lock().remove(&id);
    }

    fn is_ready(&self, id: FilterId) -> bool {
        self.ready.lock().contains(&id)
    }

    /// Blocks the calling worker until either `timeout` elapses or some
    /// other thread calls `mark_ready` — avoids a tight poll loop when a
    /// worker's whole processor set is currently idle.
    fn park(&self, timeout: Duration) {
        let mut guard = self.ready.lock();
        if guard.is_empty() {
            self.cv.wait_for(&mut guard, timeout);
        }
    }
}

/// One OS thread's worth of filters (spec.md §5: "a worker is a single OS
/// thread that owns a disjoint subset of the graph's filters").
pub struct Worker {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Spawns the worker thread. `processors` is the fixed set of filters
    /// this worker owns — disjoint from every other worker's set, though
    /// nothing here enforces that; it's `PipelineManager`'s job at
    /// assignment time.
    pub fn spawn(
        name: String,
        processors: Vec<FilterId>,
        registry: Arc<FilterRegistry>,
        ready: Arc<ReadySet>,
        retry: Duration,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let running_flag = running.clone();
        let handle = std::thread::Builder::new()
            .name(name)
            .spawn(move || run_loop(processors, registry, ready, retry, running_flag))
            .expect("failed to spawn worker thread");
        Self { running, handle }
    }

    pub fn stop(self) {
        self.running.store(false, Ordering::Release);
        let _ = self.handle.join();
    }
}

fn run_loop(
    processors: Vec<FilterId>,
    registry: Arc<FilterRegistry>,
    ready: Arc<ReadySet>,
    retry: Duration,
    running: Arc<AtomicBool>,
) {
    if processors.is_empty() {
        return;
    }

    let mut rr_cursor = 0usize;
    // Per-filter scheduled wakeups (retry backoff, and periodic filters'
    // inter-tick spacing), local to this worker since only this worker
    // ever ticks these filters.
    let mut wakeups: BinaryHeap<Reverse<(Instant, FilterId)>> = BinaryHeap::new();

    while running.load(Ordering::Acquire) {
        let now = Instant::now();
        while let Some(&Reverse((at, id))) = wakeups.peek() {
            if at > now {
                break;
            }
            wakeups.pop();
            ready.mark_ready(id);
        }

        let n = processors.len();
        let mut picked = None;
        for offset in 0..n {
            let idx = (rr_cursor + offset) % n;
            if ready.is_ready(processors[idx]) {
                picked = Some(idx);
                break;
            }
        }

        let Some(idx) = picked else {
            let next_wake = wakeups.peek().map(|&Reverse((at, _))| at.saturating_duration_since(now));
            ready.park(next_wake.unwrap_or(retry).min(retry));
            continue;
        };

        rr_cursor = (idx + 1) % n;
        let filter_id = processors[idx];
        let Some(filter) = registry.get(&filter_id) else {
            ready.mark_not_ready(filter_id);
            continue;
        };

        let tick = filter.process_frame(&registry);
        match tick.status {
            TickStatus::Retry => {
                ready.mark_not_ready(filter_id);
                wakeups.push(Reverse((Instant::now() + retry, filter_id)));
            }
            TickStatus::Done => {
                if filter.periodic() {
                    // Respect the filter's own cadence instead of
                    // re-scheduling it as fast as the worker can spin:
                    // its frame-time window if it has one, else the
                    // pipeline's retry interval (spec.md §4.7).
                    let period = if filter.frame_time() > 0 {
                        Duration::from_micros(filter.frame_time() as u64)
                    } else {
                        retry
                    };
                    ready.mark_not_ready(filter_id);
                    wakeups.push(Reverse((Instant::now() + period, filter_id)));
                }
            }
        }
        for enabled in tick.enabled_jobs {
            ready.mark_ready(enabled);
        }
    }
}
