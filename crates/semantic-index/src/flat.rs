use std::cmp::Ordering;
use std::collections::BinaryHeap;

use core_types::{DistanceMetric, Document, SearchError};
use rayon::prelude::*;

use crate::{IndexHit, VectorIndex, validate_query};

/// Corpora at least this large are scanned in parallel.
const DEFAULT_PARALLEL_THRESHOLD: usize = 16_384;
const CHUNK_SIZE: usize = 4_096;

/// Heap entry; `slot` is the position in the id-sorted document vector, so
/// comparing slots compares document ids.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub(crate) distance: f32,
    pub(crate) slot: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Greater means worse: max-heap top is the candidate to evict.
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.slot.cmp(&other.slot))
    }
}

/// Bounded top-k accumulator.
#[derive(Debug)]
pub(crate) struct TopK {
    k: usize,
    heap: BinaryHeap<Candidate>,
}

impl TopK {
    pub(crate) fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(CHUNK_SIZE)),
        }
    }

    pub(crate) fn push(&mut self, candidate: Candidate) {
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(worst) = self.heap.peek()
            && candidate < *worst
        {
            self.heap.pop();
            self.heap.push(candidate);
        }
    }

    fn merge(mut self, other: Self) -> Self {
        for c in other.heap {
            self.push(c);
        }
        self
    }

    /// Best first.
    pub(crate) fn into_sorted(self) -> Vec<Candidate> {
        self.heap.into_sorted_vec()
    }
}

/// Exact brute-force index. Documents are kept sorted by id.
#[derive(Debug)]
pub struct FlatIndex {
    dimension: usize,
    metric: DistanceMetric,
    model_id: Option<String>,
    documents: Vec<Document>,
    parallel_threshold: usize,
}

impl FlatIndex {
    /// Callers guarantee widths, finiteness and id uniqueness (see `IndexBuilder`).
    pub(crate) fn from_validated(
        dimension: usize,
        metric: DistanceMetric,
        model_id: Option<String>,
        mut documents: Vec<Document>,
    ) -> Self {
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            dimension,
            metric,
            model_id,
            documents,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }

    /// An index with no documents.
    pub fn empty(dimension: usize, metric: DistanceMetric) -> Self {
        Self::from_validated(dimension, metric, None, Vec::new())
    }

    #[must_use]
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold.max(1);
        self
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub(crate) fn hit(&self, candidate: Candidate) -> IndexHit {
        let doc = &self.documents[candidate.slot];
        IndexHit {
            document_id: doc.id.clone(),
            distance: candidate.distance,
            metadata: doc.metadata.clone(),
            text: doc.text.clone(),
        }
    }

    pub(crate) fn candidate(&self, query: &[f32], slot: usize) -> Candidate {
        Candidate {
            distance: self.metric.distance(query, &self.documents[slot].embedding),
            slot,
        }
    }

    fn scan_sequential(&self, query: &[f32], k: usize) -> TopK {
        let mut top = TopK::new(k);
        for slot in 0..self.documents.len() {
            top.push(self.candidate(query, slot));
        }
        top
    }

    fn scan_parallel(&self, query: &[f32], k: usize) -> TopK {
        (0..self.documents.len())
            .into_par_iter()
            .with_min_len(CHUNK_SIZE)
            .fold(
                || TopK::new(k),
                |mut top, slot| {
                    top.push(self.candidate(query, slot));
                    top
                },
            )
            .reduce(|| TopK::new(k), TopK::merge)
    }
}

impl VectorIndex for FlatIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>, SearchError> {
        validate_query(query, k, self.dimension)?;
        if self.documents.is_empty() {
            return Ok(Vec::new());
        }

        let top = if self.documents.len() >= self.parallel_threshold {
            self.scan_parallel(query, k)
        } else {
            self.scan_sequential(query, k)
        };
        Ok(top.into_sorted().into_iter().map(|c| self.hit(c)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn len(&self) -> usize {
        self.documents.len()
    }

    fn model_id(&self) -> Option<String> {
        self.model_id.clone()
    }
}
