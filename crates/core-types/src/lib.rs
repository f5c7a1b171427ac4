//! Core records and shared lightweight types for SubSearch.
//!
//! These types intentionally avoid heavy dependencies and aim to be
//! serialization-friendly for bincode snapshots and IPC payloads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod config;
pub mod error;

pub use error::{ErrorKind, SearchError};

/// Default number of results returned when the caller does not pass `k`.
pub const DEFAULT_K: usize = 10;

/// Largest `k` a search may request unless configured otherwise.
pub const DEFAULT_MAX_K: usize = 100;

/// Stable identifier of an indexed document.
///
/// Ordering is lexicographic on the underlying string; the vector index uses
/// it to break distance ties.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Scalar value stored in a document's metadata map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Metadata map; ordered so that rendering and serialization are stable.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// An indexed document. Immutable once handed to the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub text: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

impl Document {
    pub fn new(id: impl Into<DocumentId>, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Metadata::new(),
            embedding,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }
}

/// Distance metric declared once when an index is built.
///
/// Every metric is expressed as a distance: smaller is closer, and ranked
/// results ascend by distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 - cos(a, b)`, in `[0, 2]`.
    #[default]
    Cosine,
    /// `1 - a.b`; meant for models trained for dot-product scoring.
    DotProduct,
    /// Squared euclidean distance.
    SquaredL2,
}

impl DistanceMetric {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::DotProduct => "dot_product",
            Self::SquaredL2 => "squared_l2",
        }
    }

    /// Distance between two vectors of equal length.
    ///
    /// Accumulates in `f64` so large finite components cannot overflow into
    /// NaN; the result is always ordered.
    #[allow(clippy::cast_possible_truncation)]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        let pairs = a.iter().zip(b).map(|(x, y)| (f64::from(*x), f64::from(*y)));
        match self {
            Self::Cosine => {
                let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
                for (x, y) in pairs {
                    dot += x * y;
                    na += x * x;
                    nb += y * y;
                }
                if na == 0.0 || nb == 0.0 {
                    return 1.0;
                }
                (1.0 - dot / (na.sqrt() * nb.sqrt())).clamp(0.0, 2.0) as f32
            }
            Self::DotProduct => (1.0 - pairs.map(|(x, y)| x * y).sum::<f64>()) as f32,
            Self::SquaredL2 => pairs
                .map(|(x, y)| {
                    let d = x - y;
                    d * d
                })
                .sum::<f64>() as f32,
        }
    }
}

/// True when every component is finite and the squared norm fits in `f32`.
/// Vectors failing this are rejected at build and query time.
pub fn has_finite_norm(vector: &[f32]) -> bool {
    vector.iter().all(|v| v.is_finite()) && vector.iter().map(|v| v * v).sum::<f32>().is_finite()
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" | "dot_product" | "ip" => Ok(Self::DotProduct),
            "l2" | "squared_l2" => Ok(Self::SquaredL2),
            other => Err(format!("unknown distance metric `{other}`")),
        }
    }
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub document_id: DocumentId,
    pub distance: f32,
    pub metadata: Metadata,
    pub text: String,
}

/// Ranked results, best (smallest distance) first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    results: Vec<ScoredResult>,
}

impl ResultSet {
    /// Wrap results that are already in rank order.
    pub const fn from_ranked(results: Vec<ScoredResult>) -> Self {
        Self { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredResult> {
        self.results.iter()
    }

    pub fn first(&self) -> Option<&ScoredResult> {
        self.results.first()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.document_id.as_str()).collect()
    }

    pub fn into_vec(self) -> Vec<ScoredResult> {
        self.results
    }
}

impl IntoIterator for ResultSet {
    type Item = ScoredResult;
    type IntoIter = std::vec::IntoIter<ScoredResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a ScoredResult;
    type IntoIter = std::slice::Iter<'a, ScoredResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}
