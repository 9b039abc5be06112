//! MSM forecast visualizer.
//!
//! Renders the newest downloaded run (or the one given with `--run`) into
//! frames, a GIF animation and station series. With `--fetch` an acquisition
//! cycle runs first.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use downloader::{DownloadConfig, DownloadManager, HttpCatalog};
use visualizer::{Isolation, Pipeline, PipelineConfig};

#[derive(Parser, Debug)]
#[command(name = "visualizer")]
#[command(about = "Render MSM forecast runs into frames, animation and station series")]
struct Args {
    /// Pipeline configuration file
    #[arg(long, env = "MSM_CONFIG", default_value = "config/msm.yaml")]
    config: PathBuf,

    /// Stored run to process (GRIB2 file or run directory); default is the
    /// newest run in the ledger
    #[arg(long)]
    run: Option<PathBuf>,

    /// Fetch new runs before processing
    #[arg(long)]
    fetch: bool,

    /// Override the render worker count
    #[arg(long, env = "MSM_RENDER_WORKERS")]
    workers: Option<usize>,

    /// Render in this process instead of worker processes
    #[arg(long)]
    in_process: bool,

    /// Override the output directory
    #[arg(long, env = "MSM_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = if args.config.exists() {
        PipelineConfig::load(&args.config)
            .with_context(|| format!("Failed to load {}", args.config.display()))?
    } else {
        info!(path = %args.config.display(), "Config file not found, using defaults");
        PipelineConfig::default()
    };
    if let Some(workers) = args.workers {
        config.render.workers = workers;
    }
    if args.in_process {
        config.render.isolation = Isolation::InProcess;
    }
    if let Some(dir) = args.output_dir {
        config.assemble.output_dir = dir;
    }

    let pipeline = Pipeline::new(config).context("Invalid pipeline configuration")?;

    if args.fetch {
        let config = pipeline.config();
        let catalog = HttpCatalog::new(config.catalog.clone(), config.download.request_timeout())?;
        let manager = DownloadManager::new(DownloadConfig::from(&config.download))?;
        // runs already on disk can still be processed
        if let Err(e) = pipeline.acquire(&catalog, &manager, Utc::now()).await {
            warn!(error = %e, "Acquisition failed");
        }
    }

    info!(
        workers = pipeline.config().render.effective_workers(),
        isolation = ?pipeline.config().render.isolation,
        variables = pipeline.config().variables.len(),
        "Starting MSM visualizer"
    );

    let report = match &args.run {
        Some(path) => pipeline.process_run(path).await,
        None => pipeline.process_latest().await,
    }
    .context("Run processing failed")?;

    info!(report = %serde_json::to_string(&report)?, "Done");
    Ok(())
}
