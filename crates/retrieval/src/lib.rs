//! Retrieval engine: query text in, ranked [`ResultSet`] out.
//!
//! Each request runs a linear pipeline (validate, encode, query, assemble)
//! against an injected [`Encoder`] and [`VectorIndex`]. The engine holds no
//! mutable state, so one instance serves concurrent requests from any number
//! of threads.

use std::sync::Arc;
use std::time::Instant;

use core_types::{DEFAULT_K, DEFAULT_MAX_K, ResultSet, ScoredResult, SearchError};
use encoder::Encoder;
use semantic_index::{IndexHit, VectorIndex};
use tracing::{debug, info_span, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub default_k: usize,
    /// Requests for more results are rejected with `InvalidQuery`.
    pub max_k: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_k: DEFAULT_K,
            max_k: DEFAULT_MAX_K,
        }
    }
}

pub struct RetrievalEngine {
    encoder: Arc<dyn Encoder>,
    index: Arc<dyn VectorIndex>,
    options: EngineOptions,
}

impl std::fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("model", &self.encoder.model_id())
            .field("dimension", &self.index.dimension())
            .field("metric", &self.index.metric())
            .field("documents", &self.index.len())
            .field("options", &self.options)
            .finish()
    }
}

impl RetrievalEngine {
    /// Wire an encoder to an index, failing fast if their widths differ.
    pub fn new(
        encoder: Arc<dyn Encoder>,
        index: Arc<dyn VectorIndex>,
    ) -> Result<Self, SearchError> {
        Self::with_options(encoder, index, EngineOptions::default())
    }

    pub fn with_options(
        encoder: Arc<dyn Encoder>,
        index: Arc<dyn VectorIndex>,
        options: EngineOptions,
    ) -> Result<Self, SearchError> {
        if encoder.dimension() != index.dimension() {
            return Err(SearchError::DimensionMismatch {
                expected: index.dimension(),
                actual: encoder.dimension(),
            });
        }
        if options.default_k == 0 || options.max_k == 0 {
            return Err(SearchError::invalid_query("k limits must be at least 1"));
        }
        if options.default_k > options.max_k {
            return Err(SearchError::invalid_query("default k exceeds max k"));
        }
        if let Some(indexed_with) = index.model_id()
            && indexed_with != encoder.model_id()
        {
            warn!(
                index_model = %indexed_with,
                encoder_model = encoder.model_id(),
                "index was built with a different encoder model; rankings may be meaningless"
            );
        }
        Ok(Self {
            encoder,
            index,
            options,
        })
    }

    pub const fn options(&self) -> EngineOptions {
        self.options
    }

    pub fn encoder(&self) -> &Arc<dyn Encoder> {
        &self.encoder
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Search with the configured default `k`.
    pub fn search_default(&self, query_text: &str) -> Result<ResultSet, SearchError> {
        self.search(query_text, self.options.default_k)
    }

    /// Top-`k` documents for `query_text`, ascending by distance.
    ///
    /// Fails with `InvalidQuery` for blank text, `k == 0` or `k > max_k`; encoder and index
    /// errors propagate unchanged. Never returns a partial result.
    pub fn search(&self, query_text: &str, k: usize) -> Result<ResultSet, SearchError> {
        let span = info_span!("search", k, hits = tracing::field::Empty);
        let _enter = span.enter();
        let started = Instant::now();

        let text = query_text.trim();
        if text.is_empty() {
            return Err(SearchError::invalid_query("query text is empty"));
        }
        if k == 0 {
            return Err(SearchError::invalid_query("k must be at least 1"));
        }
        if k > self.options.max_k {
            return Err(SearchError::invalid_query(format!(
                "k = {k} exceeds the limit of {}",
                self.options.max_k
            )));
        }

        let vector = self.encoder.encode(text)?;
        if vector.len() != self.index.dimension() {
            return Err(SearchError::DimensionMismatch {
                expected: self.index.dimension(),
                actual: vector.len(),
            });
        }

        let hits = self.index.search(&vector, k)?;
        let results = assemble(hits);

        span.record("hits", results.len());
        debug!(elapsed_us = started.elapsed().as_micros(), "search complete");
        Ok(results)
    }
}

/// Index order is the rank order; no re-sorting happens here.
fn assemble(hits: Vec<IndexHit>) -> ResultSet {
    ResultSet::from_ranked(
        hits.into_iter()
            .map(|hit| ScoredResult {
                document_id: hit.document_id,
                distance: hit.distance,
                metadata: hit.metadata,
                text: hit.text,
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{DistanceMetric, Document};
    use semantic_index::{FlatIndex, IndexBuilder};

    /// Maps a handful of words onto fixed axes.
    struct AxisEncoder;

    impl Encoder for AxisEncoder {
        fn encode(&self, text: &str) -> Result<Vec<f32>, SearchError> {
            let mut v = vec![0.0; 3];
            for word in text.split_whitespace() {
                match word {
                    "red" => v[0] += 1.0,
                    "blue" => v[1] += 1.0,
                    "fail" => return Err(SearchError::encoding("model unavailable")),
                    _ => v[2] += 1.0,
                }
            }
            Ok(v)
        }

        fn dimension(&self) -> usize {
            3
        }

        fn model_id(&self) -> &str {
            "axis"
        }
    }

    /// Returns vectors one component short, simulating encoder drift.
    struct DriftingEncoder;

    impl Encoder for DriftingEncoder {
        fn encode(&self, _text: &str) -> Result<Vec<f32>, SearchError> {
            Ok(vec![1.0, 0.0])
        }

        fn dimension(&self) -> usize {
            3
        }

        fn model_id(&self) -> &str {
            "drift"
        }
    }

    fn index() -> Arc<dyn VectorIndex> {
        let mut b = IndexBuilder::new(3, DistanceMetric::Cosine).unwrap();
        b.add(Document::new("r", "red", vec![1.0, 0.0, 0.0])).unwrap();
        b.add(Document::new("b", "blue", vec![0.0, 1.0, 0.0])).unwrap();
        Arc::new(b.build())
    }

    #[test]
    fn blank_queries_are_rejected_before_encoding() {
        let engine = RetrievalEngine::new(Arc::new(AxisEncoder), index()).unwrap();
        for q in ["", "   ", "\t\n"] {
            assert!(matches!(
                engine.search(q, 3),
                Err(SearchError::InvalidQuery(_))
            ));
        }
        assert!(matches!(
            engine.search("red", 0),
            Err(SearchError::InvalidQuery(_))
        ));
    }

    #[test]
    fn encoding_errors_propagate_unchanged() {
        let engine = RetrievalEngine::new(Arc::new(AxisEncoder), index()).unwrap();
        assert_eq!(
            engine.search("please fail", 3),
            Err(SearchError::encoding("model unavailable"))
        );
    }

    #[test]
    fn width_mismatch_fails_at_construction() {
        let narrow: Arc<dyn VectorIndex> = Arc::new(FlatIndex::empty(2, DistanceMetric::Cosine));
        assert_eq!(
            RetrievalEngine::new(Arc::new(AxisEncoder), narrow).err(),
            Some(SearchError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        );
    }

    #[test]
    fn encoder_output_drift_is_a_dimension_mismatch() {
        let engine = RetrievalEngine::new(Arc::new(DriftingEncoder), index()).unwrap();
        assert_eq!(
            engine.search("red", 1),
            Err(SearchError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn k_above_max_is_rejected_not_truncated() {
        let options = EngineOptions {
            default_k: 1,
            max_k: 2,
        };
        let engine =
            RetrievalEngine::with_options(Arc::new(AxisEncoder), index(), options).unwrap();
        assert!(matches!(
            engine.search("red", 3),
            Err(SearchError::InvalidQuery(_))
        ));
        assert_eq!(engine.search("red", 2).unwrap().len(), 2);
        assert_eq!(engine.search_default("blue").unwrap().ids(), vec!["b"]);
    }

    #[test]
    fn default_k_above_max_fails_at_construction() {
        let options = EngineOptions {
            default_k: 5,
            max_k: 2,
        };
        assert!(matches!(
            RetrievalEngine::with_options(Arc::new(AxisEncoder), index(), options),
            Err(SearchError::InvalidQuery(_))
        ));
    }

    #[test]
    fn assembles_in_index_order() {
        let engine = RetrievalEngine::new(Arc::new(AxisEncoder), index()).unwrap();
        let results = engine.search("blue", 2).unwrap();
        assert_eq!(results.ids(), vec!["b", "r"]);
        let first = results.first().unwrap();
        assert_eq!(first.text, "blue");
        assert!(first.distance.abs() < 1e-6);
    }
}
