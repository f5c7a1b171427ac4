use std::sync::Arc;

use anyhow::{Context, Result};
use core_types::SearchError;
use core_types::config::AppConfig;
use retrieval::{EngineOptions, RetrievalEngine};
use semantic_index::store::open_index;
use semantic_index::{IndexHandle, VectorIndex};
use tracing::info;

/// Everything a request needs, built once at startup and shared read-only.
pub struct ServiceState {
    engine: RetrievalEngine,
    index: Arc<IndexHandle>,
    config: AppConfig,
}

/// Outcome of a snapshot reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadOutcome {
    pub documents: u64,
    pub generation: u64,
}

impl ServiceState {
    /// Assemble state from parts; `engine` must search through `index`.
    pub const fn new(engine: RetrievalEngine, index: Arc<IndexHandle>, config: AppConfig) -> Self {
        Self {
            engine,
            index,
            config,
        }
    }

    pub const fn engine(&self) -> &RetrievalEngine {
        &self.engine
    }

    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Re-read the configured snapshot and swap it in. A failed load leaves the
    /// current index serving.
    pub fn reload(&self) -> Result<ReloadOutcome, SearchError> {
        let next = open_index(&self.config.index)?;
        self.index.swap(next)?;
        Ok(ReloadOutcome {
            documents: self.index.len() as u64,
            generation: self.index.generation(),
        })
    }
}

/// Build encoder, index and engine from config, failing fast on any
/// misconfiguration (missing snapshot, encoder/index width mismatch).
pub fn build_state(cfg: &AppConfig) -> Result<ServiceState> {
    let encoder = encoder::from_config(&cfg.encoder).context("construct encoder")?;
    let index = open_index(&cfg.index)
        .with_context(|| format!("open index snapshot {}", cfg.index.path))?;
    let handle = Arc::new(IndexHandle::new(index));

    let options = EngineOptions {
        default_k: cfg.search.default_k,
        max_k: cfg.search.max_k,
    };
    let engine = RetrievalEngine::with_options(encoder, Arc::clone(&handle) as Arc<dyn VectorIndex>, options)
        .context("encoder output width does not match the index")?;

    info!(
        documents = handle.len(),
        dimension = handle.dimension(),
        metric = %handle.metric(),
        "retrieval engine ready"
    );
    Ok(ServiceState::new(engine, handle, cfg.clone()))
}
