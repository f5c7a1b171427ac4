use core_types::{DistanceMetric, SearchError};
use hnsw_rs::prelude::*;
use tracing::info;

use crate::flat::TopK;
use crate::{BuildError, FlatIndex, IndexHit, VectorIndex, validate_query};

/// Graph construction parameters.
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    pub max_nb_connection: usize,
    pub max_layer: usize,
    pub ef_construction: usize,
    /// Search breadth; the recall/latency knob. Raised to `k` when smaller.
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        // Balanced accuracy vs. memory for corpora in the 10^4..10^6 range.
        Self {
            max_nb_connection: 32,
            max_layer: 16,
            ef_construction: 200,
            ef_search: 64,
        }
    }
}

/// HNSW graph over a flat index's documents (cosine metric only).
///
/// The graph proposes candidates; they are re-scored with the exact metric and
/// ranked with the same id tie-break as [`FlatIndex`], so the only deviation
/// from the exact scan is recall, never ordering.
pub struct HnswIndex {
    graph: Hnsw<'static, f32, DistCosine>,
    flat: FlatIndex,
    params: HnswParams,
}

impl HnswIndex {
    pub fn build(flat: FlatIndex, ef_search: usize) -> Result<Self, BuildError> {
        Self::build_with(
            flat,
            HnswParams {
                ef_search,
                ..HnswParams::default()
            },
        )
    }

    pub fn build_with(flat: FlatIndex, params: HnswParams) -> Result<Self, BuildError> {
        if flat.metric() != DistanceMetric::Cosine {
            return Err(BuildError::UnsupportedMetric(flat.metric()));
        }
        let graph = Hnsw::new(
            params.max_nb_connection,
            flat.len().max(1),
            params.max_layer,
            params.ef_construction,
            DistCosine,
        );
        let points: Vec<(&[f32], usize)> = flat
            .documents()
            .iter()
            .enumerate()
            .map(|(slot, doc)| (doc.embedding.as_slice(), slot))
            .collect();
        graph.parallel_insert_slice(&points);
        info!(
            documents = flat.len(),
            ef_search = params.ef_search,
            "hnsw graph built"
        );
        Ok(Self {
            graph,
            flat,
            params,
        })
    }
}

impl VectorIndex for HnswIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>, SearchError> {
        validate_query(query, k, self.flat.dimension())?;
        if self.flat.is_empty() {
            return Ok(Vec::new());
        }

        let k = k.min(self.flat.len());
        let ef = self.params.ef_search.max(k);
        let mut top = TopK::new(k);
        for neighbour in self.graph.search(query, k, ef) {
            top.push(self.flat.candidate(query, neighbour.d_id));
        }
        Ok(top.into_sorted().into_iter().map(|c| self.flat.hit(c)).collect())
    }

    fn dimension(&self) -> usize {
        self.flat.dimension()
    }

    fn metric(&self) -> DistanceMetric {
        self.flat.metric()
    }

    fn len(&self) -> usize {
        self.flat.len()
    }

    fn model_id(&self) -> Option<String> {
        self.flat.model_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IndexBuilder;
    use core_types::Document;

    fn corpus(metric: DistanceMetric) -> FlatIndex {
        let mut b = IndexBuilder::new(4, metric).unwrap();
        for i in 0..200u16 {
            let t = f32::from(i) * 0.07;
            b.add(Document::new(
                format!("line-{i:04}"),
                format!("subtitle line {i}"),
                vec![t.sin(), t.cos(), (t * 0.5).sin(), 1.0],
            ))
            .unwrap();
        }
        b.build()
    }

    #[test]
    fn rejects_non_cosine_metric() {
        assert!(matches!(
            HnswIndex::build(corpus(DistanceMetric::SquaredL2), 64),
            Err(BuildError::UnsupportedMetric(DistanceMetric::SquaredL2))
        ));
    }

    #[test]
    fn agrees_with_exact_scan_on_small_corpus() {
        let exact = corpus(DistanceMetric::Cosine);
        let ann = HnswIndex::build(corpus(DistanceMetric::Cosine), 200).unwrap();
        let query = [0.3f32.sin(), 0.3f32.cos(), 0.15f32.sin(), 1.0];

        let want = exact.search(&query, 5).unwrap();
        let got = ann.search(&query, 5).unwrap();
        assert_eq!(got.len(), 5);
        for pair in got.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
        let overlap = got
            .iter()
            .filter(|h| want.iter().any(|w| w.document_id == h.document_id))
            .count();
        assert!(overlap >= 4, "recall too low: {overlap}/5");
    }
}
