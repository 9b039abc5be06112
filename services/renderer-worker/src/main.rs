//! Frame render worker.
//!
//! Renders a single frame in its own process so a crash or hang cannot take
//! the pipeline down with it. The job arrives as JSON (file or stdin), the
//! [`WorkerReply`] leaves as one JSON line on stdout, and logs go to stderr.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use renderer::{render_to_disk, RenderJob, WorkerReply};

#[derive(Parser, Debug)]
#[command(name = "renderer-worker")]
#[command(about = "Render one MSM forecast frame")]
struct Args {
    /// Render job JSON file, or `-` for stdin
    #[arg(long, default_value = "-")]
    job: PathBuf,

    /// Log level
    #[arg(long, env = "MSM_WORKER_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    // stdout is reserved for the reply
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(io::stderr)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let raw = read_job(&args.job)?;
    let job: RenderJob = serde_json::from_str(&raw).context("Invalid render job")?;

    let start = Instant::now();
    let result = render_to_disk(&job);
    match &result {
        Ok(record) => info!(
            step = job.step_index,
            path = %record.image_path.display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Frame rendered"
        ),
        Err(e) => error!(step = job.step_index, error = %e, "Frame render failed"),
    }

    let reply = WorkerReply::from(result);
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, &reply)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

fn read_job(path: &PathBuf) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut raw = String::new();
        io::stdin().read_to_string(&mut raw).context("Failed to read job from stdin")?;
        Ok(raw)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read job {}", path.display()))
    }
}
