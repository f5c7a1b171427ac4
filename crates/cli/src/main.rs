use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cli::{hits_table, hits_to_json, import_jsonl};
use console::style;
use core_types::DistanceMetric;
use core_types::config::{AppConfig, LoggingConfig, load_or_create_config};
use indicatif::{ProgressBar, ProgressStyle};
use ipc::client::DEFAULT_ADDR;
use ipc::{SearchHit, SearchRequest, TcpClient};
use semantic_index::store::{read_header, write_snapshot};

/// Semantic search over subtitle lines.
#[derive(Parser, Debug)]
#[command(name = "subsearch", version, about = "SubSearch semantic search client")]
struct Cli {
    /// Config file (created with defaults when missing).
    #[arg(long, global = true, env = "SUBSEARCH_CONFIG")]
    config: Option<PathBuf>,
    /// Log at debug level instead of the configured logging.level.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search the local snapshot in-process.
    Search {
        query: String,
        /// Number of results (defaults to search.default_k).
        #[arg(short = 'k', long = "limit")]
        k: Option<usize>,
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Show the snapshot header.
    Info {
        /// Snapshot path (defaults to index.path).
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Convert pre-embedded JSONL records into a snapshot.
    Import {
        input: PathBuf,
        /// Output snapshot (defaults to index.path).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// cosine, dot_product or squared_l2 (defaults to index.metric).
        #[arg(long)]
        metric: Option<DistanceMetric>,
        /// Model id recorded in the header (defaults to the configured encoder's).
        #[arg(long)]
        model: Option<String>,
    },
    /// Query a running subsearchd.
    Remote {
        query: String,
        #[arg(long, default_value = DEFAULT_ADDR)]
        addr: String,
        #[arg(short = 'k', long = "limit")]
        k: Option<u32>,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let cfg = load_or_create_config(cli.config.as_deref())?;
    let _guard = service::init_tracing_with_config(&logging_for(&cfg, cli.verbose))?;

    match cli.command {
        Commands::Search { query, k, json } => search_local(&cfg, &query, k, json),
        Commands::Info { path } => info(&path.unwrap_or_else(|| PathBuf::from(&cfg.index.path))),
        Commands::Import {
            input,
            output,
            metric,
            model,
        } => import(&cfg, &input, output, metric, model),
        Commands::Remote {
            query,
            addr,
            k,
            json,
        } => search_remote(&cfg, &addr, &query, k, json),
    }
}

fn logging_for(cfg: &AppConfig, verbose: bool) -> LoggingConfig {
    let mut logging = cfg.logging.clone();
    if verbose {
        logging.level = "debug".into();
    }
    logging
}

fn search_local(cfg: &AppConfig, query: &str, k: Option<usize>, json: bool) -> Result<()> {
    let state = service::build_state(cfg)?;
    let started = Instant::now();
    let results = match k {
        Some(k) => state.engine().search(query, k),
        None => state.engine().search_default(query),
    }?;
    let hits: Vec<SearchHit> = results.into_iter().map(SearchHit::from).collect();
    print_hits(query, &hits, json, started.elapsed().as_millis())
}

fn search_remote(cfg: &AppConfig, addr: &str, query: &str, k: Option<u32>, json: bool) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    // Leave the service room to answer with its own timeout error first.
    let client = TcpClient::new(addr)
        .with_request_timeout(Duration::from_millis(cfg.search.timeout_ms.saturating_add(500)));
    let resp = runtime.block_on(client.search(SearchRequest::new(query, k)))?;
    print_hits(query, &resp.hits, json, u128::from(resp.took_ms))
}

fn print_hits(query: &str, hits: &[SearchHit], json: bool, took_ms: u128) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&hits_to_json(query, hits))?);
    } else {
        print!("{}", hits_table(hits));
        println!(
            "{}",
            style(format!("{} result(s) in {took_ms} ms", hits.len())).dim()
        );
    }
    Ok(())
}

fn info(path: &Path) -> Result<()> {
    let header = read_header(path)?;
    let bytes = std::fs::metadata(path)
        .with_context(|| format!("stat {}", path.display()))?
        .len();
    println!("{}", style(path.display()).bold());
    println!("  documents  {}", header.doc_count);
    println!("  dimension  {}", header.dimension);
    println!("  metric     {}", header.metric);
    println!(
        "  model      {}",
        if header.model_id.is_empty() {
            "(unknown)"
        } else {
            header.model_id.as_str()
        }
    );
    println!("  size       {}", indicatif::HumanBytes(bytes));
    Ok(())
}

fn import(
    cfg: &AppConfig,
    input: &Path,
    output: Option<PathBuf>,
    metric: Option<DistanceMetric>,
    model: Option<String>,
) -> Result<()> {
    let output = output.unwrap_or_else(|| PathBuf::from(&cfg.index.path));
    let metric = metric.unwrap_or(cfg.index.metric);
    let model = match model {
        Some(model) => model,
        None => encoder::from_config(&cfg.encoder)?.model_id().to_string(),
    };

    let file = File::open(input).with_context(|| format!("open {}", input.display()))?;
    let total = file.metadata().map(|m| m.len()).unwrap_or(0);
    let progress = ProgressBar::new(total);
    progress.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
            .progress_chars("=> "),
    );

    let snapshot = import_jsonl(BufReader::new(file), metric, &model, &progress)
        .with_context(|| format!("import {}", input.display()))?;
    progress.finish_and_clear();

    write_snapshot(&output, &snapshot)?;
    println!(
        "{} {} documents ({}d, {}, model {}) -> {}",
        style("imported").green().bold(),
        snapshot.header.doc_count,
        snapshot.header.dimension,
        snapshot.header.metric,
        model,
        output.display()
    );
    Ok(())
}
