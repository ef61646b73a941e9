//! `Path` and `PipelineManager`: graph construction and worker lifecycle
//! (spec.md §5).
//!
//! `PipelineManager` owns the filter ID namespace and the registry; it
//! doesn't own the filters' connections directly (those live on the
//! filters themselves, via [`crate::filter::BaseFilter::connect`]) but
//! provides the fan-out/fan-in helpers a caller would otherwise have to
//! hand-roll from repeated two-filter `connect` calls.

use std::sync::Arc;
use std::time::Duration;

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::filter::{BaseFilter, FilterRegistry};
use crate::ids::{FilterId, IdGenerator, ReaderId, WriterId};
use crate::worker::{ReadySet, Worker};

/// An ordered chain of filter IDs, connected one-to-one in sequence
/// (spec.md §5, "a path is the simplest unit of graph construction").
#[derive(Debug, Clone, Default)]
pub struct Path {
    pub filters: Vec<FilterId>,
}

impl Path {
    pub fn new(filters: Vec<FilterId>) -> Self {
        Self { filters }
    }
}

pub struct PipelineManager {
    registry: Arc<FilterRegistry>,
    id_gen: IdGenerator,
    ready: Arc<ReadySet>,
    config: CoreConfig,
    workers: parking_lot::Mutex<Vec<Worker>>,
}

impl PipelineManager {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            registry: Arc::new(FilterRegistry::new()),
            id_gen: IdGenerator::new(),
            ready: Arc::new(ReadySet::new()),
            config,
            workers: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Allocates the next globally-unique filter ID for this pipeline.
    pub fn next_filter_id(&self) -> FilterId {
        FilterId(self.id_gen.next())
    }

    pub fn register(&self, filter: Arc<BaseFilter>) {
        self.registry.register(filter);
    }

    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }

    fn get(&self, id: FilterId) -> CoreResult<Arc<BaseFilter>> {
        self.registry.get(&id).ok_or(CoreError::UnknownFilter(id))
    }

    /// Connects every consecutive pair in `path` one-to-one.
    pub fn connect_path(&self, path: &Path) -> CoreResult<()> {
        for pair in path.filters.windows(2) {
            let a = self.get(pair[0])?;
            let b = self.get(pair[1])?;
            a.connect_one_to_one(&b)?;
        }
        Ok(())
    }

    /// Fans one source out to many destinations (each destination must
    /// accept a distinct reader ID on its own `OneToMany`/`ManyToOne`
    /// shape; this just issues the repeated `connect` calls).
    pub fn connect_one_to_many(
        &self,
        src: FilterId,
        dsts: &[(FilterId, ReaderId)],
    ) -> CoreResult<()> {
        let source = self.get(src)?;
        for &(dst, reader_id) in dsts {
            let dest = self.get(dst)?;
            source.connect_one_to_many(&dest, reader_id)?;
        }
        Ok(())
    }

    /// Fans many sources in to one destination (a mixer).
    pub fn connect_many_to_one(
        &self,
        srcs: &[(FilterId, WriterId)],
        dst: FilterId,
    ) -> CoreResult<()> {
        let dest = self.get(dst)?;
        for &(src, writer_id) in srcs {
            let source = self.get(src)?;
            source.connect_many_to_one(&dest, writer_id)?;
        }
        Ok(())
    }

    pub fn add_slave(&self, master: FilterId, slave: FilterId) -> CoreResult<()> {
        let master = self.get(master)?;
        master.add_slave(slave, &self.registry)
    }

    /// Starts one worker thread per group in `assignment`, and marks every
    /// filter named anywhere in it runnable for its first tick. Each inner
    /// `Vec<FilterId>` becomes exactly one OS thread (spec.md §5).
    pub fn start(&self, assignment: Vec<Vec<FilterId>>) {
        let retry = Duration::from_micros(self.config.retry_micros);
        let mut workers = self.workers.lock();
        for (idx, group) in assignment.into_iter().enumerate() {
            for &id in &group {
                self.ready.mark_ready(id);
            }
            workers.push(Worker::spawn(
                format!("streamcore-worker-{idx}"),
                group,
                self.registry.clone(),
                self.ready.clone(),
                retry,
            ));
        }
    }

    /// Joins every worker thread. Filters remain registered and connected;
    /// calling `start` again would resume ticking them.
    pub fn stop(&self) {
        let mut workers = self.workers.lock();
        for worker in workers.drain(..) {
            worker.stop();
        }
    }

    pub fn filter_count(&self) -> usize {
        self.registry.len()
    }
}

impl Drop for PipelineManager {
    fn drop(&mut self) {
        self.stop();
    }
}
