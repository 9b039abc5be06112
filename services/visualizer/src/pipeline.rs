//! End-to-end processing of one stored run:
//! decode, derive, render, assemble, extract station series.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use downloader::{AcquisitionReport, Catalog, Ledger, RunFetcher};
use grib2_parser::decode;
use grid_processor::derive_all;
use msm_common::{DerivedSeries, ForecastRun, PipelineError, PipelineResult};
use serde::Serialize;
use tracing::{info, instrument};

use crate::assemble::assemble;
use crate::config::{Isolation, PipelineConfig};
use crate::pool::{build_jobs, render_all, FrameRenderer, InProcessRenderer, ProcessRenderer};
use crate::stations::{extract_station_series, write_station_files};

/// Summary of one processed run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub steps: usize,
    pub frames_rendered: usize,
    pub failed_steps: Vec<usize>,
    pub stations_extracted: usize,
    pub stations_skipped: Vec<String>,
    pub output_dir: PathBuf,
    pub frame_index: PathBuf,
    pub animation: Option<PathBuf>,
    pub station_data: PathBuf,
    pub elapsed_ms: u64,
}

pub struct Pipeline {
    config: PipelineConfig,
    renderer: Arc<dyn FrameRenderer>,
}

impl Pipeline {
    /// Validate `config` and pick the renderer its isolation mode asks for.
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        let renderer: Arc<dyn FrameRenderer> = match config.render.isolation {
            Isolation::Process => Arc::new(ProcessRenderer::new(config.render.worker_binary()?)),
            Isolation::InProcess => Arc::new(InProcessRenderer),
        };
        Self::with_renderer(config, renderer)
    }

    pub fn with_renderer(config: PipelineConfig, renderer: Arc<dyn FrameRenderer>) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self { config, renderer })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one acquisition cycle into this pipeline's data directory and
    /// ledger. Only reachable once the configuration has been validated.
    pub async fn acquire(
        &self,
        catalog: &dyn Catalog,
        fetcher: &dyn RunFetcher,
        now: DateTime<Utc>,
    ) -> PipelineResult<AcquisitionReport> {
        let mut ledger = Ledger::open(&self.config.download.ledger_path)?;
        let report = downloader::acquire(catalog, fetcher, &mut ledger, &self.config.download, now).await?;
        info!(
            fetched = report.fetched.len(),
            failed = report.failed.len(),
            pruned = report.pruned.len(),
            "Acquisition complete"
        );
        Ok(report)
    }

    /// Process the newest run recorded in the ledger.
    pub async fn process_latest(&self) -> PipelineResult<RunReport> {
        let ledger = Ledger::open(&self.config.download.ledger_path)?;
        let (run_id, entry) = ledger.latest().ok_or_else(|| {
            PipelineError::Config(format!(
                "ledger {} has no runs; run the downloader first",
                ledger.path().display()
            ))
        })?;
        info!(run_id = %run_id, path = %entry.path.display(), "Processing latest run");
        self.process_run(&entry.path).await
    }

    /// Process the run stored at `path` (a GRIB2 file or run directory).
    ///
    /// Decode errors and too few rendered frames fail the run; failed steps,
    /// invalid variables and out-of-grid stations only reduce the output.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn process_run(&self, path: &Path) -> PipelineResult<RunReport> {
        let start = Instant::now();
        let (run, derived) = self.decode_and_derive(path).await?;
        let run_id = run.run_id.to_string();
        let output_dir = self.config.assemble.output_dir.join(&run_id);

        info!(
            run_id = %run_id,
            steps = run.step_count(),
            variables = derived.len(),
            "Run decoded"
        );

        let jobs = build_jobs(&run, &derived, &self.config.render.style, &output_dir);
        let results = render_all(
            self.renderer.as_ref(),
            jobs,
            self.config.render.effective_workers(),
            self.config.render.step_timeout(),
        )
        .await;

        let assemble_config = self.config.assemble.clone();
        let frames_dir = output_dir.clone();
        let artifact = tokio::task::spawn_blocking(move || assemble(results, &assemble_config, &frames_dir))
            .await
            .map_err(|e| PipelineError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        let extraction = extract_station_series(
            &self.config.stations,
            &derived,
            &run.geometry,
            self.config.assemble.sampling,
        );
        let (station_data, _) = write_station_files(&extraction, &derived, &output_dir)?;

        let report = RunReport {
            run_id,
            steps: run.step_count(),
            frames_rendered: artifact.frames.len(),
            failed_steps: artifact.failed_steps,
            stations_extracted: extraction.series.len(),
            stations_skipped: extraction.skipped,
            output_dir,
            frame_index: artifact.index_path,
            animation: artifact.animation_path,
            station_data,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            run_id = %report.run_id,
            frames = report.frames_rendered,
            failed = report.failed_steps.len(),
            stations = report.stations_extracted,
            elapsed_ms = report.elapsed_ms,
            "Run processed"
        );
        Ok(report)
    }

    /// Decoding and derivation are CPU bound and run off the async threads.
    async fn decode_and_derive(&self, path: &Path) -> PipelineResult<(ForecastRun, Vec<DerivedSeries>)> {
        let path = path.to_path_buf();
        let decode_config = self.config.decode.clone();
        let variables = self.config.variables.clone();
        let label = path.display().to_string();

        tokio::task::spawn_blocking(move || {
            let run = decode(&path, &decode_config)?;
            let derived = derive_all(&run, &variables);
            Ok::<_, PipelineError>((run, derived))
        })
        .await
        .map_err(|e| PipelineError::DecodeError {
            run_id: label,
            reason: format!("decode task: {}", e),
        })?
    }
}
