//! TOML configuration for the service and CLI.
//!
//! Resolution order for the config path: explicit argument, `SUBSEARCH_CONFIG`,
//! then `config/subsearch.toml`. A default file is written when none exists.
//! Selected environment variables override file values after loading.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::{DEFAULT_K, DEFAULT_MAX_K, DistanceMetric};

pub const DEFAULT_CONFIG_PATH: &str = "config/subsearch.toml";
pub const CONFIG_ENV: &str = "SUBSEARCH_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub index: IndexConfig,
    pub encoder: EncoderConfig,
    pub search: SearchConfig,
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub level: String,
    /// Rolling log file path; empty disables file logging.
    pub file: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    /// Exact brute-force scan.
    #[default]
    Flat,
    /// Approximate HNSW graph (requires the `hnsw` feature).
    Hnsw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub path: String,
    pub backend: IndexBackend,
    /// Metric used when importing a corpus; loaded snapshots carry their own.
    pub metric: DistanceMetric,
    /// Search breadth for the HNSW backend; higher trades latency for recall.
    pub ef_search: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: "data/index/subtitles.snap".into(),
            backend: IndexBackend::Flat,
            metric: DistanceMetric::Cosine,
            ef_search: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderKind {
    /// Deterministic feature-hashing encoder, no model weights required.
    #[default]
    Hashing,
    /// OpenAI-compatible embeddings endpoint.
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub kind: EncoderKind,
    pub model: String,
    pub dimension: usize,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    /// Query-vector LRU capacity; 0 disables caching.
    pub cache_capacity: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            kind: EncoderKind::Hashing,
            model: "multi-qa-mpnet-base-dot-v1".into(),
            dimension: 768,
            endpoint: "http://127.0.0.1:8080/v1".into(),
            api_key: None,
            timeout_ms: 5_000,
            cache_capacity: 1_024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_k: usize,
    pub max_k: usize,
    pub timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: DEFAULT_K,
            max_k: DEFAULT_MAX_K,
            timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub listen_addr: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7878".into(),
        }
    }
}

impl AppConfig {
    /// Reject values that would make every request fail.
    pub fn validate(&self) -> Result<()> {
        if self.search.default_k == 0 {
            bail!("search.default_k must be at least 1");
        }
        if self.search.default_k > self.search.max_k {
            bail!(
                "search.default_k ({}) exceeds search.max_k ({})",
                self.search.default_k,
                self.search.max_k
            );
        }
        if self.encoder.dimension == 0 {
            bail!("encoder.dimension must be at least 1");
        }
        if self.encoder.timeout_ms == 0 || self.search.timeout_ms == 0 {
            bail!("timeouts must be non-zero");
        }
        if self.index.path.trim().is_empty() {
            bail!("index.path must not be empty");
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("SUBSEARCH_INDEX_PATH") {
            self.index.path = path;
        }
        if let Ok(level) = std::env::var("SUBSEARCH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(endpoint) = std::env::var("SUBSEARCH_ENCODER_ENDPOINT") {
            self.encoder.endpoint = endpoint;
        }
        if let Ok(key) = std::env::var("SUBSEARCH_ENCODER_API_KEY") {
            self.encoder.api_key = Some(key);
        }
        if let Ok(addr) = std::env::var("SUBSEARCH_LISTEN") {
            self.service.listen_addr = addr;
        }
    }
}

fn resolve_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Parse a config file without env overrides or defaults-on-missing.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: AppConfig =
        toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}

/// Load the config, writing a default file first if none exists.
pub fn load_or_create_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = resolve_path(path);
    let mut cfg = if path.exists() {
        load_config(&path)?
    } else {
        let cfg = AppConfig::default();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create config dir {}", parent.display()))?;
        }
        let text = toml::to_string_pretty(&cfg).context("serialize default config")?;
        fs::write(&path, text).with_context(|| format!("write config {}", path.display()))?;
        cfg
    };
    cfg.apply_env_overrides();
    cfg.validate()?;
    Ok(cfg)
}
