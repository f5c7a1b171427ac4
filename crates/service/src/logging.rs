use std::path::Path;

use anyhow::{Context, Result};
use core_types::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber described by `cfg`.
///
/// `RUST_LOG` overrides `cfg.level`. When `cfg.file` is set, a daily rolling
/// file layer is added; the returned guard flushes it and must outlive logging.
pub fn init_tracing_with_config(cfg: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .with_context(|| format!("invalid log filter `{}`", cfg.level))?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(true);
    layers.push(if cfg.json {
        stderr.json().boxed()
    } else {
        stderr.boxed()
    });

    let mut guard = None;
    if !cfg.file.trim().is_empty() {
        let path = Path::new(&cfg.file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .context("logging.file has no file name")?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create log dir {}", dir.display()))?;

        let (writer, g) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));
        guard = Some(g);
        let file = fmt::layer().with_ansi(false).with_writer(writer);
        layers.push(if cfg.json {
            file.json().boxed()
        } else {
            file.boxed()
        });
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("install tracing subscriber")?;
    Ok(guard)
}
