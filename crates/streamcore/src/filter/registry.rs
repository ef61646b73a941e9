//! Keeps every live filter addressable by [`FilterId`] so that a tick can
//! resolve a master's slaves (or, later, a `PipelineManager`'s workers) by
//! ID instead of holding an owning reference back into the graph —
//! mirroring the teacher's `DashMap`-backed stream registry rather than a
//! `Mutex<HashMap<_>>`, since lookups happen from every worker thread on
//! every tick and shouldn't contend on a single lock.

use std::sync::Arc;

use dashmap::DashMap;

use super::BaseFilter;
use crate::ids::FilterId;

#[derive(Default)]
pub struct FilterRegistry {
    filters: DashMap<FilterId, Arc<BaseFilter>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self {
            filters: DashMap::new(),
        }
    }

    pub fn register(&self, filter: Arc<BaseFilter>) {
        self.filters.insert(filter.id(), filter);
    }

    pub fn get(&self, id: &FilterId) -> Option<Arc<BaseFilter>> {
        self.filters.get(id).map(|entry| entry.clone())
    }

    pub fn remove(&self, id: &FilterId) -> Option<Arc<BaseFilter>> {
        self.filters.remove(id).map(|(_, filter)| filter)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn ids(&self) -> Vec<FilterId> {
        self.filters.iter().map(|entry| *entry.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{shapes::Shape, transform::{FilterTransform, TransformHead}};
    use std::collections::HashMap;
    use crate::ids::WriterId;
    use crate::frame::Frame;

    struct Noop;
    impl FilterTransform for Noop {}
    impl TransformHead for Noop {
        fn process(&mut self, _destinations: &mut HashMap<WriterId, Frame>) -> bool {
            true
        }
    }

    #[test]
    fn register_then_get_then_remove() {
        let registry = FilterRegistry::new();
        let filter = BaseFilter::new(
            FilterId(7),
            super::super::Role::Master,
            false,
            Shape::Head {
                transform: Box::new(Noop),
                max_writers: 1,
            },
        );
        registry.register(filter.clone());
        assert!(registry.get(&FilterId(7)).is_some());
        registry.remove(&FilterId(7));
        assert!(registry.get(&FilterId(7)).is_none());
    }
}
