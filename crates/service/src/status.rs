use std::env;

use encoder::CacheStats;
use ipc::StatusResponse;
use semantic_index::{IndexHandle, VectorIndex};
use uuid::Uuid;

/// Build a StatusResponse from the live index and the encoder's cache counters.
pub fn make_status_response(id: Uuid, index: &IndexHandle, cache: Option<CacheStats>) -> StatusResponse {
    let current = index.current();
    let cache = cache.unwrap_or_default();
    StatusResponse {
        id,
        documents: current.len() as u64,
        dimension: u32::try_from(current.dimension()).unwrap_or(u32::MAX),
        metric: current.metric().to_string(),
        model_id: current.model_id().unwrap_or_default(),
        index_generation: index.generation(),
        cache_hits: cache.hits,
        cache_misses: cache.misses,
        served_by: Some(host_label()),
    }
}

pub fn host_label() -> String {
    env::var("COMPUTERNAME")
        .or_else(|_| env::var("HOSTNAME"))
        .unwrap_or_else(|_| "subsearchd".into())
}
