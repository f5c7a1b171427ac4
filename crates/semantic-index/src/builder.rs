use std::collections::HashSet;

use core_types::{DistanceMetric, Document, DocumentId, SearchError, has_finite_norm};
use core_serialization::Snapshot;
use thiserror::Error;

use crate::FlatIndex;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("index dimension must be at least 1")]
    ZeroDimension,
    #[error("document {id}: embedding has {actual} components, index expects {expected}")]
    DimensionMismatch {
        id: DocumentId,
        expected: usize,
        actual: usize,
    },
    #[error("document {0}: embedding has non-finite components or an overflowing norm")]
    NonFiniteEmbedding(DocumentId),
    #[error("duplicate document id {0}")]
    DuplicateId(DocumentId),
    #[error("metric {0} is not supported by this backend")]
    UnsupportedMetric(DistanceMetric),
}

impl From<BuildError> for SearchError {
    fn from(value: BuildError) -> Self {
        match value {
            BuildError::DimensionMismatch {
                expected, actual, ..
            } => Self::DimensionMismatch { expected, actual },
            other => Self::IndexUnavailable(other.to_string()),
        }
    }
}

/// Collects documents for one (dimension, metric) pair, enforcing the corpus
/// invariants as they arrive.
#[derive(Debug)]
pub struct IndexBuilder {
    dimension: usize,
    metric: DistanceMetric,
    model_id: Option<String>,
    seen: HashSet<DocumentId>,
    documents: Vec<Document>,
}

impl IndexBuilder {
    pub fn new(dimension: usize, metric: DistanceMetric) -> Result<Self, BuildError> {
        if dimension == 0 {
            return Err(BuildError::ZeroDimension);
        }
        Ok(Self {
            dimension,
            metric,
            model_id: None,
            seen: HashSet::new(),
            documents: Vec::new(),
        })
    }

    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn add(&mut self, document: Document) -> Result<(), BuildError> {
        if document.embedding.len() != self.dimension {
            return Err(BuildError::DimensionMismatch {
                id: document.id,
                expected: self.dimension,
                actual: document.embedding.len(),
            });
        }
        if !has_finite_norm(&document.embedding) {
            return Err(BuildError::NonFiniteEmbedding(document.id));
        }
        if !self.seen.insert(document.id.clone()) {
            return Err(BuildError::DuplicateId(document.id));
        }
        self.documents.push(document);
        Ok(())
    }

    pub fn extend<I>(&mut self, documents: I) -> Result<(), BuildError>
    where
        I: IntoIterator<Item = Document>,
    {
        for doc in documents {
            self.add(doc)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn build(self) -> FlatIndex {
        FlatIndex::from_validated(self.dimension, self.metric, self.model_id, self.documents)
    }

    pub fn into_snapshot(self) -> Snapshot {
        Snapshot::new(
            self.dimension,
            self.metric,
            self.model_id.unwrap_or_default(),
            self.documents,
        )
    }

    /// Rebuild from a decoded snapshot, re-checking every invariant.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, BuildError> {
        let dimension = snapshot.header.dimension as usize;
        let mut builder = Self::new(dimension, snapshot.header.metric)?;
        if !snapshot.header.model_id.is_empty() {
            builder.model_id = Some(snapshot.header.model_id);
        }
        builder.documents.reserve(snapshot.documents.len());
        builder.extend(snapshot.documents)?;
        Ok(builder)
    }
}
