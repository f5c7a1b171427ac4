//! Vector index: nearest-neighbour search over embedded documents.
//!
//! [`FlatIndex`] is the exact brute-force reference; the `hnsw` feature adds an
//! approximate graph backend whose hits are re-ranked with the exact metric.
//! Every backend returns hits in ascending distance, ties broken by document
//! id, never more than `k`.

pub mod ann;
mod builder;
mod flat;
mod handle;
pub mod store;

use core_types::{DistanceMetric, DocumentId, Metadata, SearchError, has_finite_norm};

pub use builder::{BuildError, IndexBuilder};
pub use flat::FlatIndex;
pub use handle::IndexHandle;

/// One candidate returned by an index, already in rank order.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub document_id: DocumentId,
    pub distance: f32,
    pub metadata: Metadata,
    pub text: String,
}

pub trait VectorIndex: Send + Sync {
    /// Up to `k` nearest documents to `query`, best first.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>, SearchError>;

    fn dimension(&self) -> usize;

    fn metric(&self) -> DistanceMetric;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encoder model the embeddings were produced with, when recorded.
    fn model_id(&self) -> Option<String> {
        None
    }
}

/// Checks shared by every backend before any distance is computed.
pub(crate) fn validate_query(query: &[f32], k: usize, dimension: usize) -> Result<(), SearchError> {
    if k == 0 {
        return Err(SearchError::invalid_query("k must be at least 1"));
    }
    if query.len() != dimension {
        return Err(SearchError::DimensionMismatch {
            expected: dimension,
            actual: query.len(),
        });
    }
    if !has_finite_norm(query) {
        return Err(SearchError::invalid_query(
            "query vector has non-finite components or an overflowing norm",
        ));
    }
    Ok(())
}
