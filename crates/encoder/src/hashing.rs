use anyhow::{Result, bail};
use core_types::SearchError;

use crate::Encoder;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Feature-hashing bag-of-words encoder.
///
/// Lowercased alphanumeric tokens are hashed with FNV-1a into `dimension`
/// buckets; the top hash bit picks the sign so collisions tend to cancel.
/// The result is L2-normalized, or all zeros when the text has no tokens.
/// Deterministic across runs and platforms.
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dimension: usize,
    model_id: String,
}

impl HashingEncoder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            bail!("hashing encoder dimension must be at least 1");
        }
        Ok(Self {
            dimension,
            model_id: format!("hashing-fnv1a-{dimension}"),
        })
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

impl Encoder for HashingEncoder {
    fn encode(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        let mut vector = vec![0.0f32; self.dimension];
        let buckets = self.dimension as u64;
        for token in Self::tokens(text) {
            let hash = fnv1a(token.as_bytes());
            #[allow(clippy::cast_possible_truncation)]
            let bucket = (hash % buckets) as usize;
            let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
