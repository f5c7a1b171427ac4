//! Entry point for the SubSearch daemon: loads the snapshot once and serves
//! framed search requests over local TCP.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use core_types::config::load_or_create_config;
use mimalloc::MiMalloc;
use service::{EngineSearchHandler, SearchHandler, build_state, init_tracing_with_config, serve};
use tokio::net::TcpListener;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Parser)]
#[command(name = "subsearchd", version, about = "SubSearch retrieval daemon")]
struct Args {
    /// Config file (created with defaults when missing).
    #[arg(long, env = "SUBSEARCH_CONFIG")]
    config: Option<PathBuf>,
    /// Override `service.listen_addr`.
    #[arg(long)]
    listen: Option<String>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let mut cfg = load_or_create_config(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        cfg.service.listen_addr = listen;
    }
    let _guard = init_tracing_with_config(&cfg.logging)?;

    // The remote encoder owns a blocking HTTP client, so the state is built and
    // dropped outside the async runtime.
    let state = Arc::new(build_state(&cfg)?);
    let handler: Arc<dyn SearchHandler> = Arc::new(EngineSearchHandler::new(Arc::clone(&state)));
    let request_timeout = Duration::from_millis(cfg.search.timeout_ms);
    let listen_addr = cfg.service.listen_addr.clone();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("subsearchd")
        .build()
        .context("build tokio runtime")?;

    let outcome = runtime.block_on(async move {
        let listener = TcpListener::bind(&listen_addr)
            .await
            .with_context(|| format!("bind {listen_addr}"))?;
        serve(listener, handler, request_timeout, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for ctrl-c: {e}");
            }
        })
        .await
    });

    runtime.shutdown_timeout(Duration::from_secs(5));
    drop(state);
    tracing::info!("subsearchd stopped");
    outcome
}
