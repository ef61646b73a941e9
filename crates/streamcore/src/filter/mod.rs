//! `BaseFilter`: a node in the dataflow graph and the per-tick protocol that
//! drives it (spec.md §4, §9).
//!
//! A tick is: dispatch ready control events, demand origin frames from each
//! reader, demand destination slots from each writer, run the shape's
//! transform, rendezvous with slaves (master role only), then commit
//! (`addFrames`) and release (`removeFrames`) whichever frames the
//! transform actually touched. Everything here is generic over the shape;
//! the only domain-specific piece is the boxed transform inside [`Shape`].

pub mod registry;
pub mod shapes;
pub mod timing;
pub mod transform;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde_json::{json, Value};

use crate::connection::{Reader, Writer};
use crate::error::{CoreError, CoreResult};
use crate::event::{now_micros, Event, EventQueue};
use crate::ids::{FilterId, IdGenerator, ReaderId, WriterId};
use crate::queue::FrameQueue;

pub use registry::FilterRegistry;
pub use shapes::Shape;
pub use timing::Timing;

/// A filter's place in the per-tick protocol (spec.md §4.3).
///
/// `Master` runs demand → process → commit and rendezvous with its slaves.
/// `Server` runs the same demand → process → commit sequence but never
/// retries — a failed demand phase still falls through to the transform,
/// matching the original's `serverProcessFrame`, which ignores
/// `demandOriginFrames`/`demandDestinationFrames`'s return values. `Network`
/// skips demand and commit entirely: the core just invokes the transform
/// once per tick and yields, since the transform is its own event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Master,
    Slave,
    Server,
    Network,
}

/// What a tick accomplished, for the scheduler (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    /// A full protocol round ran; `enabled_jobs` lists filters that may now
    /// be runnable.
    Done,
    /// Preconditions weren't met this round (no fresh origin frame, no
    /// connected writer, a slave still processing, ...); the scheduler
    /// should retry this filter after a backoff instead of spinning.
    Retry,
}

pub struct TickResult {
    pub status: TickStatus,
    pub enabled_jobs: Vec<FilterId>,
}

impl TickResult {
    fn retry() -> Self {
        Self {
            status: TickStatus::Retry,
            enabled_jobs: Vec::new(),
        }
    }

    fn done(enabled_jobs: Vec<FilterId>) -> Self {
        Self {
            status: TickStatus::Done,
            enabled_jobs,
        }
    }
}

/// A master and its slaves signal each other through this instead of the
/// original's `sleep_for(RETRY)` busy-wait (spec.md §9, Open Question: "the
/// rendezvous may use a condition variable"). The timeout on `wait` is a
/// safety net against a missed wakeup, not the primary signaling path.
#[derive(Default)]
struct Rendezvous {
    lock: Mutex<()>,
    cv: Condvar,
}

impl Rendezvous {
    fn notify(&self) {
        let _guard = self.lock.lock();
        self.cv.notify_all();
    }

    fn wait_timeout(&self, timeout: Duration) {
        let mut guard = self.lock.lock();
        self.cv.wait_for(&mut guard, timeout);
    }
}

/// Everything behind the filter's single "readers/writers" lock, mirroring
/// the original's `readersWritersLck` covering both maps plus the staged
/// frame snapshots taken during a tick.
struct ReadersWriters {
    readers: HashMap<ReaderId, Reader>,
    writers: HashMap<WriterId, Writer>,
    seq_nums: HashMap<WriterId, u64>,
    o_frames: HashMap<ReaderId, crate::frame::Frame>,
    d_frames: HashMap<WriterId, crate::frame::Frame>,
}

impl ReadersWriters {
    fn new() -> Self {
        Self {
            readers: HashMap::new(),
            writers: HashMap::new(),
            seq_nums: HashMap::new(),
            o_frames: HashMap::new(),
            d_frames: HashMap::new(),
        }
    }
}

type ActionHandler = Box<dyn Fn(&Value) -> bool + Send + Sync>;

pub struct BaseFilter {
    id: FilterId,
    role: Role,
    /// If true, the scheduler respects the shape's `frame_time` (or the
    /// pipeline's retry interval, if `frame_time` is unset) as a minimum
    /// gap between ticks instead of rescheduling as soon as a tick
    /// finishes — spec.md §4.7, "periodic filters respect their inter-tick
    /// period". Enforced by `Worker`, not by the filter itself.
    periodic: bool,
    shape: Mutex<Shape>,
    timing: Mutex<Timing>,
    rw: Mutex<ReadersWriters>,
    events: EventQueue,
    actions: Mutex<HashMap<String, ActionHandler>>,
    id_gen: IdGenerator,
    slaves: Mutex<Vec<FilterId>>,
    master_rendezvous: Mutex<Option<Arc<Rendezvous>>>,
    own_rendezvous: Arc<Rendezvous>,
    process: AtomicBool,
}

impl BaseFilter {
    pub fn new(id: FilterId, role: Role, periodic: bool, shape: Shape) -> Arc<Self> {
        let frame_time = 0;
        Arc::new(Self {
            id,
            role,
            periodic,
            shape: Mutex::new(shape),
            timing: Mutex::new(Timing::new(frame_time)),
            rw: Mutex::new(ReadersWriters::new()),
            events: EventQueue::new(),
            actions: Mutex::new(HashMap::new()),
            id_gen: IdGenerator::new(),
            slaves: Mutex::new(Vec::new()),
            master_rendezvous: Mutex::new(None),
            own_rendezvous: Arc::new(Rendezvous::default()),
            process: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> FilterId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn periodic(&self) -> bool {
        self.periodic
    }

    /// Sets the frame-time mixing window (spec.md §4.4). `0` means
    /// best-effort; any positive value switches the filter into frame-time
    /// mixing with that step. Typically called from an action handler in
    /// response to a `setFrameTime` event rather than directly.
    pub fn set_frame_time(&self, frame_time: crate::frame::Micros) {
        let mut timing = self.timing.lock();
        timing.frame_time = frame_time;
    }

    pub fn frame_time(&self) -> crate::frame::Micros {
        self.timing.lock().frame_time
    }

    fn max_readers(&self) -> usize {
        self.shape.lock().max_readers()
    }

    fn max_writers(&self) -> usize {
        self.shape.lock().max_writers()
    }

    // ---- action dispatch table (spec.md §4.6) ----------------------------

    pub fn register_action(
        &self,
        name: impl Into<String>,
        handler: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) {
        self.actions.lock().insert(name.into(), Box::new(handler));
    }

    fn dispatch(&self, event: Event) {
        let handled = {
            let actions = self.actions.lock();
            match actions.get(&event.action) {
                Some(handler) => {
                    let ok = handler(&event.params);
                    if !ok {
                        log::error!(
                            "filter {}: action '{}' handler returned failure",
                            self.id,
                            event.action
                        );
                    }
                    true
                }
                None => {
                    log::error!("filter {}: no handler registered for action '{}'", self.id, event.action);
                    false
                }
            }
        };
        if let Some(reply) = event.reply {
            reply.send_and_close(json!({ "ok": handled }));
        }
    }

    /// Pushes a control event at this filter. Head/Tail filters dispatch
    /// synchronously, in-line, rather than queuing — they may go long
    /// stretches between ticks (a Tail waiting on slow downstream I/O, a
    /// Head waiting on the next capture buffer) and spec.md §4.6 calls the
    /// synchronous path for them a deliberate exception rather than a
    /// missed optimization.
    pub fn push_event(&self, event: Event) {
        let synchronous = matches!(&*self.shape.lock(), Shape::Head { .. } | Shape::Tail { .. });
        if synchronous {
            self.dispatch(event);
        } else {
            self.events.push(event);
        }
    }

    fn process_event(&self) {
        let now = now_micros();
        loop {
            match self.events.pop_ready(now) {
                Some(event) => self.dispatch(event),
                None => break,
            }
        }
    }

    // ---- connection (spec.md §4.2, §9 Open Question) ---------------------

    /// Allocates a queue sized for this filter's output, between `self`
    /// (the producer) and `reader_filter` (the consumer) — the filter-side
    /// half of `allocQueue` (spec.md §6).
    fn alloc_queue(&self, consumer: FilterId) -> Arc<FrameQueue> {
        let capacity = self.shape.lock().queue_capacity();
        Arc::new(FrameQueue::new(capacity, self.id, consumer))
    }

    /// Connects a writer on `self` to a reader on `other`, allocating the
    /// shared queue between them.
    ///
    /// Every precondition (capacity, duplicate IDs) is checked *before*
    /// anything is constructed or inserted; the writer and reader objects
    /// themselves aren't built until every check has passed. The original's
    /// `connect` allocated the `Writer` up front and leaked it on any
    /// failure path after that point, and its `setReader` accepted a queue
    /// argument it then discarded in favor of a fresh, disconnected
    /// `Reader` (spec.md §9, Open Question) — both are structurally
    /// impossible here since `Writer::connect` is the only thing that ever
    /// installs a queue on a reader, and it only runs after this function's
    /// checks succeed.
    pub fn connect(
        self: &Arc<Self>,
        other: &Arc<Self>,
        writer_id: Option<WriterId>,
        reader_id: Option<ReaderId>,
    ) -> CoreResult<()> {
        assert!(!Arc::ptr_eq(self, other), "a filter cannot connect to itself");

        // Lock both filters' readers/writers state in ascending FilterId
        // order so that two concurrent connects never deadlock each other.
        let self_first = self.id.0 < other.id.0;
        let (mut self_rw, mut other_rw) = if self_first {
            let a = self.rw.lock();
            let b = other.rw.lock();
            (a, b)
        } else {
            let b = other.rw.lock();
            let a = self.rw.lock();
            (a, b)
        };

        if self_rw.writers.len() >= self.max_writers() {
            return Err(CoreError::CapacityExceeded {
                filter: self.id,
                kind: "writer",
            });
        }
        let writer_id = match writer_id {
            Some(id) if self_rw.writers.contains_key(&id) => return Err(CoreError::DuplicateId),
            Some(id) => id,
            None => WriterId(self.id_gen.next()),
        };

        if other_rw.readers.len() >= other.max_readers() {
            return Err(CoreError::CapacityExceeded {
                filter: other.id,
                kind: "reader",
            });
        }
        let reader_id = match reader_id {
            Some(id) if other_rw.readers.contains_key(&id) => return Err(CoreError::DuplicateId),
            Some(id) => id,
            None => ReaderId(other.id_gen.next()),
        };

        let queue = self.alloc_queue(other.id);

        let mut writer = Writer::new();
        let mut reader = Reader::new();
        if !writer.connect(&mut reader, queue) {
            // Unreachable given the checks above, but never leave either
            // side partially wired if it somehow does happen.
            return Err(CoreError::AlreadyConnected);
        }

        self_rw.writers.insert(writer_id, writer);
        self_rw.seq_nums.insert(writer_id, 0);
        other_rw.readers.insert(reader_id, reader);

        Ok(())
    }

    pub fn connect_one_to_one(self: &Arc<Self>, other: &Arc<Self>) -> CoreResult<()> {
        self.connect(other, None, None)
    }

    pub fn connect_many_to_one(self: &Arc<Self>, other: &Arc<Self>, writer_id: WriterId) -> CoreResult<()> {
        self.connect(other, Some(writer_id), None)
    }

    pub fn connect_one_to_many(self: &Arc<Self>, other: &Arc<Self>, reader_id: ReaderId) -> CoreResult<()> {
        self.connect(other, None, Some(reader_id))
    }

    pub fn disconnect_reader(&self, id: ReaderId) -> bool {
        let mut rw = self.rw.lock();
        match rw.readers.remove(&id) {
            Some(mut reader) => {
                reader.disconnect();
                rw.o_frames.remove(&id);
                true
            }
            None => false,
        }
    }

    pub fn disconnect_writer(&self, id: WriterId) -> bool {
        let mut rw = self.rw.lock();
        match rw.writers.remove(&id) {
            Some(mut writer) => {
                writer.disconnect();
                rw.seq_nums.remove(&id);
                rw.d_frames.remove(&id);
                true
            }
            None => false,
        }
    }

    pub fn disconnect_all(&self) {
        let mut rw = self.rw.lock();
        for writer in rw.writers.values_mut() {
            writer.disconnect();
        }
        for reader in rw.readers.values_mut() {
            reader.disconnect();
        }
        rw.writers.clear();
        rw.readers.clear();
        rw.seq_nums.clear();
        rw.o_frames.clear();
        rw.d_frames.clear();
    }

    // ---- master/slave wiring (spec.md §4.3) -------------------------------

    /// Registers `slave` (looked up in `registry`) to rendezvous with this
    /// master on every tick. Fails if `self` isn't a master, `slave` isn't
    /// a slave, or `slave` already has a master.
    pub fn add_slave(&self, slave_id: FilterId, registry: &FilterRegistry) -> CoreResult<()> {
        if self.role != Role::Master {
            return Err(CoreError::InvalidSlave(format!(
                "filter {} is not a master",
                self.id
            )));
        }
        let slave = registry
            .get(&slave_id)
            .ok_or(CoreError::UnknownFilter(slave_id))?;
        if slave.role != Role::Slave {
            return Err(CoreError::InvalidSlave(format!(
                "filter {slave_id} is not a slave"
            )));
        }
        {
            let mut mr = slave.master_rendezvous.lock();
            if mr.is_some() {
                return Err(CoreError::InvalidSlave(format!(
                    "filter {slave_id} already has a master"
                )));
            }
            *mr = Some(self.own_rendezvous.clone());
        }
        self.slaves.lock().push(slave_id);
        Ok(())
    }

    fn any_slave_processing(&self, registry: &FilterRegistry) -> bool {
        self.slaves.lock().iter().any(|id| {
            registry
                .get(id)
                .map(|slave| slave.process.load(Ordering::Acquire))
                .unwrap_or(false)
        })
    }

    // ---- demand policies (spec.md §4.4) -----------------------------------

    /// Stages one origin frame per reader into `rw.o_frames`, applying
    /// either best-effort or frame-time mixing depending on `timing`.
    /// Returns whether at least one reader contributed a fresh frame this
    /// round — a `false` here means the tick has nothing to process and
    /// should retry.
    fn demand_origin_frames(&self, rw: &mut ReadersWriters, timing: &mut Timing) -> bool {
        if self.max_readers() == 0 {
            return true; // Head: no readers to demand from.
        }
        if rw.readers.is_empty() {
            return false;
        }
        if timing.frame_time <= 0 {
            Self::demand_best_effort(rw, timing)
        } else {
            Self::demand_frame_time(rw, timing)
        }
    }

    /// Drops every unread frame older than `sync_ts`, then takes whatever's
    /// left at the front of the queue (or reuses the last delivered frame
    /// if the queue has gone dry) — no windowing, no waiting for every
    /// reader to have something new.
    fn demand_best_effort(rw: &mut ReadersWriters, timing: &mut Timing) -> bool {
        let mut got_fresh = false;
        for (&rid, reader) in rw.readers.iter() {
            let Some(queue) = reader.queue() else { continue };
            let mut front = queue.front();
            while let Some(ref f) = front {
                if f.presentation_time < timing.sync_ts {
                    queue.remove_frame();
                    front = queue.front();
                } else {
                    break;
                }
            }
            match front {
                None => {
                    let mut reused = queue.front_or_reuse();
                    reused.consumed = false;
                    rw.o_frames.insert(rid, reused);
                }
                Some(mut f) => {
                    f.consumed = true;
                    rw.o_frames.insert(rid, f);
                    got_fresh = true;
                }
            }
        }
        got_fresh
    }

    /// Mixes every reader whose oldest unread frame falls inside
    /// `[sync_ts, sync_ts + frame_time)`. A reader with nothing in that
    /// window yet reuses its last frame; a reader whose oldest unread frame
    /// has jumped *past* the window is held aside as "out of scope" and, if
    /// every reader ends up out of scope this round, `sync_ts` jumps
    /// forward to the earliest such frame instead of advancing by a single
    /// `frame_time` step (spec.md §4.4, "out-of-scope jump").
    fn demand_frame_time(rw: &mut ReadersWriters, timing: &mut Timing) -> bool {
        let mut out_of_scope: Option<crate::frame::PresentationTime> = None;
        let mut got_fresh = false;

        for (&rid, reader) in rw.readers.iter() {
            let Some(queue) = reader.queue() else { continue };
            let mut front = queue.front();
            while let Some(ref f) = front {
                if f.presentation_time < timing.sync_ts {
                    queue.remove_frame();
                    front = queue.front();
                } else {
                    break;
                }
            }
            match front {
                None => {
                    let mut reused = queue.front_or_reuse();
                    reused.consumed = false;
                    rw.o_frames.insert(rid, reused);
                }
                Some(f) if f.presentation_time >= timing.sync_ts + timing.frame_time => {
                    out_of_scope = Some(match out_of_scope {
                        Some(min) => min.min(f.presentation_time),
                        None => f.presentation_time,
                    });
                    let mut held = f;
                    held.consumed = false;
                    rw.o_frames.insert(rid, held);
                }
                Some(mut f) => {
                    f.consumed = true;
                    rw.o_frames.insert(rid, f);
                    got_fresh = true;
                }
            }
        }

        if got_fresh {
            timing.sync_ts += timing.frame_time;
            true
        } else {
            if let Some(jump_to) = out_of_scope {
                timing.sync_ts = jump_to;
            }
            false
        }
    }

    /// Stages one destination frame per writer into `rw.d_frames`, dropping
    /// writers whose peer reader has disconnected. Returns whether at
    /// least one writer has a slot staged.
    fn demand_destination_frames(&self, rw: &mut ReadersWriters) -> bool {
        if self.max_writers() == 0 {
            return true; // Tail: no writers to demand from.
        }
        let stale: Vec<WriterId> = rw
            .writers
            .iter()
            .filter(|(_, w)| !w.is_connected())
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            rw.writers.remove(&id);
            rw.seq_nums.remove(&id);
            rw.d_frames.remove(&id);
        }
        if rw.writers.is_empty() {
            return false;
        }
        for (&wid, writer) in rw.writers.iter() {
            if let Some(queue) = writer.queue() {
                let mut template = queue.rear_template();
                template.consumed = false;
                rw.d_frames.insert(wid, template);
            }
        }
        true
    }

    // ---- commit / release (spec.md §4.1, §4.5) ----------------------------

    fn add_frames(&self, rw: &mut ReadersWriters) -> Vec<FilterId> {
        let mut hints = Vec::new();
        for (&wid, frame) in rw.d_frames.iter() {
            if !frame.consumed {
                continue;
            }
            if let Some(writer) = rw.writers.get(&wid) {
                if writer.is_connected() {
                    if let Some(queue) = writer.queue() {
                        if let Some(hint) = queue.add_frame(frame.clone()) {
                            hints.push(hint);
                        }
                    }
                }
            }
        }
        hints
    }

    fn remove_frames(&self, rw: &mut ReadersWriters) -> Vec<FilterId> {
        let mut hints = Vec::new();
        for (&rid, frame) in rw.o_frames.iter() {
            if !frame.consumed {
                continue;
            }
            if let Some(reader) = rw.readers.get(&rid) {
                if let Some(queue) = reader.queue() {
                    if let Some(hint) = queue.remove_frame() {
                        hints.push(hint);
                    }
                }
            }
        }
        hints
    }

    // ---- the tick (spec.md §4.3, §4.7) -------------------------------------

    /// Runs one full protocol round for this filter. `registry` resolves
    /// slave/master filter IDs for the rendezvous and fan-out; it's passed
    /// in rather than owned so a filter never holds a cycle back to the
    /// pipeline that owns it.
    pub fn process_frame(self: &Arc<Self>, registry: &FilterRegistry) -> TickResult {
        self.process_event();

        match self.role {
            Role::Slave => self.slave_tick(),
            Role::Master => self.master_tick(registry),
            Role::Server => self.server_tick(),
            Role::Network => self.network_tick(),
        }
    }

    fn slave_tick(self: &Arc<Self>) -> TickResult {
        if !self.process.load(Ordering::Acquire) {
            return TickResult::retry();
        }
        let result = self.run_protocol(None, true);
        self.process.store(false, Ordering::Release);
        if let Some(rendezvous) = self.master_rendezvous.lock().as_ref() {
            rendezvous.notify();
        }
        result
    }

    /// Demand → deliver-to-slaves → transform → commit, then rendezvous:
    /// block until every slave has cleared `process` before reporting the
    /// slaves as enabled jobs too (spec.md §4.3).
    fn master_tick(self: &Arc<Self>, registry: &FilterRegistry) -> TickResult {
        let slave_ids = self.slaves.lock().clone();
        let deliver_to = if slave_ids.is_empty() {
            None
        } else {
            Some((slave_ids.as_slice(), registry))
        };

        let mut result = self.run_protocol(deliver_to, true);
        if result.status == TickStatus::Retry {
            return result;
        }

        if !slave_ids.is_empty() {
            const MAX_WAITS: u32 = 64;
            let mut waits = 0;
            while self.any_slave_processing(registry) && waits < MAX_WAITS {
                self.own_rendezvous
                    .wait_timeout(Duration::from_micros(crate::DEFAULT_RETRY_MICROS));
                waits += 1;
            }
            result.enabled_jobs.extend(slave_ids.iter().copied());
        }

        result
    }

    /// Like master, minus the slave rendezvous, and never retries: a failed
    /// demand phase still falls through to the transform instead of
    /// reporting back pressure, matching the original's `serverProcessFrame`
    /// (spec.md §4.3: "always reports ret=0").
    fn server_tick(self: &Arc<Self>) -> TickResult {
        let result = self.run_protocol(None, false);
        debug_assert_eq!(result.status, TickStatus::Done, "server ticks never retry");
        result
    }

    /// The filter's transform is its own event loop (an RTP/RTSP listener,
    /// a socket server, ...); the core doesn't demand frames or commit
    /// results on its behalf, it just invokes the transform once per tick
    /// and yields (spec.md §4.3).
    fn network_tick(self: &Arc<Self>) -> TickResult {
        let mut rw = self.rw.lock();
        let mut timing = self.timing.lock();
        let mut shape = self.shape.lock();
        let _ = shape.run(&rw.o_frames, &mut rw.d_frames, &mut timing, &mut rw.seq_nums);
        TickResult::done(Vec::new())
    }

    /// The shared demand → transform → commit sequence for master-like and
    /// slave ticks. `deliver_to`, when present, hands the freshly-staged
    /// origin frames to each listed slave and flips its `process` flag —
    /// the master side of the rendezvous (spec.md §4.3). `retry_on_demand_failure`
    /// controls whether an empty demand phase short-circuits the tick with
    /// [`TickStatus::Retry`] (master/slave) or falls through to the
    /// transform regardless (server).
    fn run_protocol(
        self: &Arc<Self>,
        deliver_to: Option<(&[FilterId], &FilterRegistry)>,
        retry_on_demand_failure: bool,
    ) -> TickResult {
        let mut rw = self.rw.lock();
        let mut timing = self.timing.lock();

        let origin_ok = self.demand_origin_frames(&mut rw, &mut timing);
        if retry_on_demand_failure && !origin_ok {
            return TickResult::retry();
        }
        let dest_ok = self.demand_destination_frames(&mut rw);
        if retry_on_demand_failure && !dest_ok {
            return TickResult::retry();
        }

        if let Some((slave_ids, registry)) = deliver_to {
            let snapshot = rw.o_frames.clone();
            for slave_id in slave_ids {
                if let Some(slave) = registry.get(slave_id) {
                    slave.receive_origin_snapshot(snapshot.clone());
                    slave.process.store(true, Ordering::Release);
                }
            }
        }

        let mut shape = self.shape.lock();
        let ok = shape.run(&rw.o_frames, &mut rw.d_frames, &mut timing, &mut rw.seq_nums);
        drop(shape);

        if !ok {
            return TickResult::done(Vec::new());
        }

        let mut hints = self.add_frames(&mut rw);
        hints.extend(self.remove_frames(&mut rw));
        TickResult::done(hints)
    }

    /// Slave-side half of the rendezvous: installs the frames the master
    /// just staged as this filter's own origin frames for the round.
    fn receive_origin_snapshot(&self, snapshot: HashMap<ReaderId, crate::frame::Frame>) {
        self.rw.lock().o_frames = snapshot;
    }

    // ---- introspection (spec.md §6, `doGetState`) --------------------------

    pub fn get_state(&self) -> Value {
        json!({
            "id": self.id.0,
            "role": self.role,
            "periodic": self.periodic,
            "frameTime": self.timing.lock().frame_time,
            "readers": self.rw.lock().readers.len(),
            "writers": self.rw.lock().writers.len(),
            "shape": self.shape.lock().state(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::filter::transform::{FilterTransform, TransformOneToOne, TransformTail};
    use crate::frame::Frame;

    /// Copies the origin payload straight through, unmodified.
    struct Passthrough;
    impl FilterTransform for Passthrough {}
    impl TransformOneToOne for Passthrough {
        fn process(&mut self, origin: &Frame, destination: &mut Frame) -> bool {
            destination.payload = origin.payload.clone();
            true
        }
    }

    fn one_to_one(id: u32) -> Arc<BaseFilter> {
        BaseFilter::new(
            FilterId(id),
            Role::Master,
            false,
            Shape::OneToOne {
                transform: Box::new(Passthrough),
            },
        )
    }

    #[test]
    fn best_effort_passthrough_ticks_through_ten_frames() {
        let registry = FilterRegistry::new();
        let source = one_to_one(1);
        let sink = one_to_one(2);
        registry.register(source.clone());
        registry.register(sink.clone());
        source.connect_one_to_one(&sink).unwrap();

        // Feed frames directly into source's outgoing queue as if an
        // upstream producer had written them (source here stands in for a
        // Head in this unit test).
        let rw = source.rw.lock();
        let writer = rw.writers.values().next().unwrap();
        for i in 0..10u64 {
            writer
                .queue()
                .unwrap()
                .add_frame(Frame::new((i * 40_000) as i64, 40_000, i, vec![i as u8]));
        }
        drop(rw);

        for _ in 0..10 {
            let tick = source.process_frame(&registry);
            assert_eq!(tick.status, TickStatus::Done);
        }
    }

    #[test]
    fn capacity_rejection_leaves_first_connection_intact() {
        let registry = FilterRegistry::new();
        let a = one_to_one(1);
        let b = one_to_one(2);
        let c = one_to_one(3);
        registry.register(a.clone());
        registry.register(b.clone());
        registry.register(c.clone());

        a.connect_one_to_one(&b).unwrap();
        let err = a.connect_one_to_one(&c).unwrap_err();
        assert_eq!(err.code(), "capacity_exceeded");

        // The first connection must still be usable.
        assert_eq!(a.rw.lock().writers.len(), 1);
        assert!(a.rw.lock().writers.values().next().unwrap().is_connected());
    }

    #[test]
    fn master_slave_rendezvous_waits_for_slave_to_clear_process() {
        let registry = Arc::new(FilterRegistry::new());
        let master = BaseFilter::new(
            FilterId(1),
            Role::Master,
            false,
            Shape::Head {
                transform: Box::new(NoopHead),
                max_writers: 0,
            },
        );
        let slave = BaseFilter::new(
            FilterId(2),
            Role::Slave,
            false,
            Shape::Tail {
                transform: Box::new(NoopTail),
                max_readers: 0,
            },
        );
        registry.register(master.clone());
        registry.register(slave.clone());
        master.add_slave(slave.id(), &registry).unwrap();

        // Stand in for the worker thread that would otherwise drive the
        // slave's own tick: wait for the master to flip `process`, then
        // clear it and notify, exactly as `slave_tick` does.
        let registry2 = registry.clone();
        let slave2 = slave.clone();
        let worker = std::thread::spawn(move || {
            while !slave2.process.load(Ordering::Acquire) {
                std::thread::yield_now();
            }
            slave2.process_frame(&registry2);
        });

        let start = std::time::Instant::now();
        let tick = master.process_frame(&registry);
        worker.join().unwrap();

        assert_eq!(tick.status, TickStatus::Done);
        assert!(tick.enabled_jobs.contains(&slave.id()));
        assert!(
            start.elapsed() < Duration::from_millis(500),
            "rendezvous should resolve via notify, not by exhausting the retry budget"
        );
    }

    struct NoopHead;
    impl FilterTransform for NoopHead {}
    impl transform::TransformHead for NoopHead {
        fn process(&mut self, _destinations: &mut HashMap<WriterId, Frame>) -> bool {
            true
        }
    }

    struct NoopTail;
    impl FilterTransform for NoopTail {}
    impl TransformTail for NoopTail {
        fn process(&mut self, _origins: &HashMap<ReaderId, Frame>) -> bool {
            true
        }
    }

    #[test]
    fn event_does_not_fire_before_its_timestamp() {
        use crate::event::Event;
        use serde_json::json;
        use std::sync::atomic::AtomicBool as StdAtomicBool;

        let filter = one_to_one(1);
        let fired = Arc::new(StdAtomicBool::new(false));
        let fired2 = fired.clone();
        filter.register_action("mark", move |_| {
            fired2.store(true, Ordering::SeqCst);
            true
        });

        let far_future = now_micros() + 10_000_000_000; // 10000s out
        filter.push_event(Event::new("mark", json!({}), far_future));
        filter.process_event();
        assert!(!fired.load(Ordering::SeqCst), "event fired before its time");
    }

    /// Builds a standalone, connected reader whose queue is pre-loaded with
    /// frames at the given presentation times, for exercising the demand
    /// policies directly (spec.md §8 scenarios 2 and 3) without spinning up
    /// a whole producer filter.
    fn reader_preloaded_with(times: &[i64]) -> Reader {
        let mut reader = Reader::new();
        let mut writer = Writer::new();
        let queue = Arc::new(FrameQueue::new(times.len().max(1), FilterId(100), FilterId(200)));
        assert!(writer.connect(&mut reader, queue.clone()));
        for (i, &t) in times.iter().enumerate() {
            queue.add_frame(Frame::new(t, 0, i as u64, vec![]));
        }
        reader
    }

    /// spec.md §8 scenario 2: "Late-frame discard." Pre-loaded reader with
    /// frames at `-100000, -50000, 0, 40000`; mixer with `frameTime=40000`,
    /// `syncTs=0`. The first tick must discard the two frames before
    /// `syncTs`, consume the frame at `0`, and advance `syncTs` to `40000`.
    #[test]
    fn frame_time_mixing_discards_late_frames() {
        let mut rw = ReadersWriters::new();
        rw.readers.insert(
            ReaderId(1),
            reader_preloaded_with(&[-100_000, -50_000, 0, 40_000]),
        );
        let mut timing = Timing::new(40_000);

        let got_fresh = BaseFilter::demand_frame_time(&mut rw, &mut timing);

        assert!(got_fresh, "the frame at 0 lies inside the window");
        let staged = &rw.o_frames[&ReaderId(1)];
        assert_eq!(staged.presentation_time, 0);
        assert!(staged.consumed);
        assert_eq!(timing.sync_ts, 40_000);
    }

    /// spec.md §8 scenario 3: "Out-of-scope jump." Single reader with one
    /// frame at `200000`, `syncTs=0`, `frameTime=40000`. The first tick must
    /// return `false` (nothing in window) and jump `syncTs` straight to
    /// `200000` rather than advancing by a single `frameTime` step; the
    /// second tick then consumes that frame normally.
    #[test]
    fn frame_time_mixing_jumps_sync_ts_past_an_out_of_scope_gap() {
        let mut rw = ReadersWriters::new();
        rw.readers
            .insert(ReaderId(1), reader_preloaded_with(&[200_000]));
        let mut timing = Timing::new(40_000);

        let first = BaseFilter::demand_frame_time(&mut rw, &mut timing);
        assert!(!first, "no reader has an in-window frame yet");
        assert_eq!(timing.sync_ts, 200_000, "syncTs jumps to the out-of-scope frame");
        let held = &rw.o_frames[&ReaderId(1)];
        assert_eq!(held.presentation_time, 200_000);
        assert!(!held.consumed, "held frame is not consumed on the skipped tick");

        let second = BaseFilter::demand_frame_time(&mut rw, &mut timing);
        assert!(second, "the held frame now falls inside the window");
        let consumed = &rw.o_frames[&ReaderId(1)];
        assert_eq!(consumed.presentation_time, 200_000);
        assert!(consumed.consumed);
        assert_eq!(timing.sync_ts, 240_000);
    }

    #[test]
    fn server_tick_never_retries_even_with_no_input_frames() {
        let registry = FilterRegistry::new();
        let server = BaseFilter::new(
            FilterId(1),
            Role::Server,
            false,
            Shape::Tail {
                transform: Box::new(NoopTail),
                max_readers: 1,
            },
        );
        registry.register(server.clone());
        // One reader wired but never fed any frames: demand_origin_frames
        // returns false every time, yet a SERVER tick must still report
        // `Done`, never `Retry` (spec.md §4.3).
        let producer = one_to_one(9);
        registry.register(producer.clone());
        producer.connect_one_to_one(&server).unwrap();

        let tick = server.process_frame(&registry);
        assert_eq!(tick.status, TickStatus::Done);
    }

    #[test]
    fn network_tick_runs_the_transform_once_without_demand_or_commit() {
        let calls = Arc::new(AtomicBool::new(false));
        struct CountingNetwork(Arc<AtomicBool>);
        impl FilterTransform for CountingNetwork {}
        impl transform::TransformTail for CountingNetwork {
            fn process(&mut self, _origins: &HashMap<ReaderId, Frame>) -> bool {
                self.0.store(true, Ordering::SeqCst);
                true
            }
        }

        let registry = FilterRegistry::new();
        let network = BaseFilter::new(
            FilterId(1),
            Role::Network,
            false,
            Shape::Tail {
                transform: Box::new(CountingNetwork(calls.clone())),
                max_readers: 0,
            },
        );
        registry.register(network.clone());

        let tick = network.process_frame(&registry);
        assert!(calls.load(Ordering::SeqCst), "transform must run exactly once");
        assert_eq!(tick.status, TickStatus::Done);
        assert!(tick.enabled_jobs.is_empty(), "network ticks never report enabled jobs");
    }
}
