//! MSM GPV downloader.
//!
//! Runs one acquisition cycle against the archive and exits, or keeps
//! polling when `--interval-secs` is given.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use downloader::{acquire, DownloadConfig, DownloadManager, DownloaderConfig, HttpCatalog, Ledger};

#[derive(Parser, Debug)]
#[command(name = "downloader")]
#[command(about = "Fetches new MSM forecast runs and prunes expired ones")]
struct Args {
    /// Pipeline configuration file
    #[arg(long, env = "MSM_CONFIG", default_value = "config/msm.yaml")]
    config: PathBuf,

    /// Override the local data directory
    #[arg(long, env = "MSM_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Override the ledger path
    #[arg(long, env = "MSM_LEDGER")]
    ledger: Option<PathBuf>,

    /// Poll every N seconds instead of running once
    #[arg(long)]
    interval_secs: Option<u64>,

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
        DownloaderConfig::load(&args.config)
            .with_context(|| format!("Failed to load {}", args.config.display()))?
    } else {
        info!(path = %args.config.display(), "Config file not found, using defaults");
        DownloaderConfig::default()
    };
    if let Some(dir) = args.data_dir {
        config.download.data_dir = dir;
    }
    if let Some(path) = args.ledger {
        config.download.ledger_path = path;
    }

    info!(
        base_url = %config.catalog.base_url,
        data_dir = %config.download.data_dir.display(),
        "Starting MSM downloader"
    );

    let catalog = HttpCatalog::new(config.catalog.clone(), config.download.request_timeout())?;
    let manager = DownloadManager::new(DownloadConfig::from(&config.download))?;
    let mut ledger = Ledger::open(&config.download.ledger_path)?;

    let Some(interval) = args.interval_secs else {
        let report = acquire(&catalog, &manager, &mut ledger, &config.download, Utc::now()).await?;
        info!(
            listed = report.listed,
            fetched = report.fetched.len(),
            failed = report.failed.len(),
            pruned = report.pruned.len(),
            "Download session complete"
        );
        return Ok(());
    };

    info!(interval_secs = interval, "Starting continuous polling");
    loop {
        match acquire(&catalog, &manager, &mut ledger, &config.download, Utc::now()).await {
            Ok(report) => info!(fetched = report.fetched.len(), failed = report.failed.len(), "Cycle finished"),
            Err(e) => error!(error = %e, "Acquisition cycle failed"),
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
        }
    }

    Ok(())
}
