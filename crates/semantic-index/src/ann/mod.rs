//! Approximate nearest-neighbour backends.

#[cfg(feature = "hnsw")]
mod hnsw;

#[cfg(feature = "hnsw")]
pub use hnsw::{HnswIndex, HnswParams};
