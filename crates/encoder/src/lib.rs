//! Encoders map query text to a fixed-width vector.
//!
//! The retrieval engine only relies on the [`Encoder`] contract: identical
//! text yields identical vectors of length [`Encoder::dimension`], and a
//! failure produces [`SearchError::Encoding`] rather than a partial vector.

mod cache;
mod hashing;
mod remote;

use std::sync::Arc;

use anyhow::Result;
use core_types::SearchError;
use core_types::config::{EncoderConfig, EncoderKind};

pub use cache::{CacheStats, CachingEncoder};
pub use hashing::HashingEncoder;
pub use remote::{RemoteEncoder, parse_embedding_response};

pub trait Encoder: Send + Sync {
    /// Encode one piece of text. Callers pass non-empty, trimmed text.
    fn encode(&self, text: &str) -> Result<Vec<f32>, SearchError>;

    /// Width of every vector this encoder returns.
    fn dimension(&self) -> usize;

    /// Identifier of the model (and its version) behind this encoder.
    fn model_id(&self) -> &str;

    /// Query cache counters, when this encoder caches.
    fn cache_stats(&self) -> Option<CacheStats> {
        None
    }
}

impl<E: Encoder + ?Sized> Encoder for Arc<E> {
    fn encode(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        (**self).encode(text)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn cache_stats(&self) -> Option<CacheStats> {
        (**self).cache_stats()
    }
}

impl<E: Encoder + ?Sized> Encoder for Box<E> {
    fn encode(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        (**self).encode(text)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn cache_stats(&self) -> Option<CacheStats> {
        (**self).cache_stats()
    }
}

/// Reject vectors of the wrong width or with NaN/inf components.
pub(crate) fn check_vector(vector: &[f32], expected: usize) -> Result<(), SearchError> {
    if vector.len() != expected {
        return Err(SearchError::encoding(format!(
            "encoder returned {} components, expected {expected}",
            vector.len()
        )));
    }
    if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
        return Err(SearchError::encoding(format!(
            "encoder returned a non-finite component at position {pos}"
        )));
    }
    if !core_types::has_finite_norm(vector) {
        return Err(SearchError::encoding("encoder returned a vector whose norm overflows"));
    }
    Ok(())
}

/// Construct the encoder described by the config, wrapped in a query cache
/// when `cache_capacity > 0`.
pub fn from_config(cfg: &EncoderConfig) -> Result<Arc<dyn Encoder>> {
    let base: Arc<dyn Encoder> = match cfg.kind {
        EncoderKind::Hashing => Arc::new(HashingEncoder::new(cfg.dimension)?),
        EncoderKind::Remote => Arc::new(RemoteEncoder::from_config(cfg)?),
    };
    tracing::info!(
        model = base.model_id(),
        dimension = base.dimension(),
        kind = ?cfg.kind,
        "encoder ready"
    );
    Ok(match std::num::NonZeroUsize::new(cfg.cache_capacity) {
        Some(capacity) => Arc::new(CachingEncoder::new(base, capacity)),
        None => base,
    })
}
