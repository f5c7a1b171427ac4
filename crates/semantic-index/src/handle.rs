use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use core_types::{DistanceMetric, SearchError};
use parking_lot::RwLock;
use tracing::info;

use crate::{IndexHit, VectorIndex};

/// Swappable reference to the live index.
///
/// A search clones the current `Arc` and runs against it, so a concurrent
/// [`IndexHandle::swap`] never exposes a partially loaded index; in-flight
/// searches finish on the index they started with.
pub struct IndexHandle {
    current: RwLock<Arc<dyn VectorIndex>>,
    generation: AtomicU64,
}

impl IndexHandle {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self {
            current: RwLock::new(index),
            generation: AtomicU64::new(0),
        }
    }

    pub fn current(&self) -> Arc<dyn VectorIndex> {
        Arc::clone(&self.current.read())
    }

    /// Install a fully built replacement. The dimension must not change,
    /// since the engine validated its encoder against it at startup.
    pub fn swap(&self, next: Arc<dyn VectorIndex>) -> Result<Arc<dyn VectorIndex>, SearchError> {
        let mut guard = self.current.write();
        if next.dimension() != guard.dimension() {
            return Err(SearchError::DimensionMismatch {
                expected: guard.dimension(),
                actual: next.dimension(),
            });
        }
        let previous = std::mem::replace(&mut *guard, next);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(
            generation,
            documents = guard.len(),
            metric = %guard.metric(),
            "index snapshot swapped"
        );
        Ok(previous)
    }

    /// Number of successful swaps since construction.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl VectorIndex for IndexHandle {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>, SearchError> {
        self.current().search(query, k)
    }

    fn dimension(&self) -> usize {
        self.current.read().dimension()
    }

    fn metric(&self) -> DistanceMetric {
        self.current.read().metric()
    }

    fn len(&self) -> usize {
        self.current.read().len()
    }

    fn model_id(&self) -> Option<String> {
        self.current.read().model_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FlatIndex, IndexBuilder};
    use core_types::Document;

    fn flat(ids: &[&str]) -> Arc<dyn VectorIndex> {
        let mut b = IndexBuilder::new(2, DistanceMetric::Cosine).unwrap();
        for id in ids {
            b.add(Document::new(*id, *id, vec![1.0, 0.0])).unwrap();
        }
        Arc::new(b.build())
    }

    #[test]
    fn swap_replaces_index_and_keeps_old_snapshot_alive() {
        let handle = IndexHandle::new(flat(&["a"]));
        let before = handle.current();
        handle.swap(flat(&["a", "b", "c"])).unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(handle.len(), 3);
        assert_eq!(handle.generation(), 1);
        assert_eq!(handle.search(&[1.0, 0.0], 10).unwrap().len(), 3);
    }

    #[test]
    fn swap_rejects_dimension_change() {
        let handle = IndexHandle::new(flat(&["a"]));
        let wider: Arc<dyn VectorIndex> = Arc::new(FlatIndex::empty(3, DistanceMetric::Cosine));
        assert_eq!(
            handle.swap(wider).err(),
            Some(SearchError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        );
        assert_eq!(handle.generation(), 0);
        assert_eq!(handle.len(), 1);
    }
}
