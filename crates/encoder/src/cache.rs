use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use core_types::SearchError;
use lru::LruCache;
use parking_lot::Mutex;

use crate::Encoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Bounded LRU of query vectors keyed by exact text. Errors are not cached.
///
/// The lock is not held while the inner encoder runs, so two concurrent
/// misses on the same text both encode; the vectors are identical either way.
pub struct CachingEncoder<E> {
    inner: E,
    cache: Mutex<LruCache<String, Vec<f32>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<E: Encoder> CachingEncoder<E> {
    pub fn new(inner: E, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

impl<E: Encoder> Encoder for CachingEncoder<E> {
    fn encode(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        if let Some(hit) = self.cache.lock().get(text) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let vector = self.inner.encode(text)?;
        self.cache.lock().put(text.to_string(), vector.clone());
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn cache_stats(&self) -> Option<CacheStats> {
        Some(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        })
    }
}
