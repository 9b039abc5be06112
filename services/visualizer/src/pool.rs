//! Frame render pool.
//!
//! Each forecast step becomes a self-contained [`RenderJob`] handed by value
//! to a [`FrameRenderer`]. At most `workers` renders run at once, each under
//! its own timeout, and the results come back index-aligned with the jobs no
//! matter in which order they finish.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use msm_common::{DerivedSeries, DerivedValues, ForecastRun, FrameRecord, RenderError};
use renderer::{render_to_disk, FrameStyle, RenderJob, RenderLayer, WorkerReply};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// Renders one frame. Implementations must not share mutable rendering
/// state between calls.
#[async_trait]
pub trait FrameRenderer: Send + Sync {
    async fn render(&self, job: RenderJob) -> Result<FrameRecord, RenderError>;
}

/// Renders on the blocking thread pool of this process.
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessRenderer;

#[async_trait]
impl FrameRenderer for InProcessRenderer {
    async fn render(&self, job: RenderJob) -> Result<FrameRecord, RenderError> {
        let step = job.step_index;
        tokio::task::spawn_blocking(move || render_to_disk(&job))
            .await
            .unwrap_or_else(|e| Err(RenderError::crashed(step, format!("render task: {}", e))))
    }
}

/// Renders each frame in a fresh `renderer-worker` process.
///
/// The job goes to the child's stdin as JSON and a [`WorkerReply`] comes
/// back on its stdout. The child is killed if the render future is dropped,
/// which is how a timed-out step is stopped.
#[derive(Debug, Clone)]
pub struct ProcessRenderer {
    binary: PathBuf,
}

impl ProcessRenderer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl FrameRenderer for ProcessRenderer {
    async fn render(&self, job: RenderJob) -> Result<FrameRecord, RenderError> {
        let step = job.step_index;
        let payload = serde_json::to_vec(&job)
            .map_err(|e| RenderError::failed(step, format!("serialising job: {}", e)))?;

        let mut child = Command::new(&self.binary)
            .arg("--job")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RenderError::crashed(step, format!("spawning {}: {}", self.binary.display(), e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RenderError::crashed(step, "worker stdin unavailable"))?;
        stdin
            .write_all(&payload)
            .await
            .map_err(|e| RenderError::crashed(step, format!("writing job: {}", e)))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| RenderError::crashed(step, format!("waiting for worker: {}", e)))?;

        if !output.status.success() {
            return Err(RenderError::crashed(step, format!("worker exited with {}", output.status)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| RenderError::crashed(step, "worker produced no reply"))?;
        let reply: WorkerReply = serde_json::from_str(line)
            .map_err(|e| RenderError::crashed(step, format!("unreadable worker reply: {}", e)))?;
        reply.into_result()
    }
}

/// One job per run step with a layer for every configured variable, so all
/// frames of a run share one layout. A variable that is invalid at a step
/// becomes an unavailable layer and is drawn as an empty panel.
///
/// A step where no variable is valid still gets a job; its render fails on
/// its own and leaves the other steps alone.
pub fn build_jobs(
    run: &ForecastRun,
    series: &[DerivedSeries],
    style: &FrameStyle,
    output_dir: &Path,
) -> Vec<RenderJob> {
    run.steps
        .iter()
        .map(|step| {
            let layers = series
                .iter()
                .map(|s| {
                    let (values, unavailable) = match s.step(step.index).map(|d| &d.values) {
                        Some(DerivedValues::Valid(values)) => (values.clone(), None),
                        Some(DerivedValues::Invalid { reason }) => (Vec::new(), Some(reason.clone())),
                        None => (Vec::new(), Some("step not derived".to_string())),
                    };
                    RenderLayer {
                        name: s.spec.name.clone(),
                        unit: s.spec.unit.clone(),
                        color_scale: s.spec.color_scale.clone(),
                        value_range: s.spec.value_range,
                        values,
                        unavailable,
                    }
                })
                .collect();

            RenderJob {
                run_id: run.run_id.to_string(),
                step_index: step.index,
                lead_hours: step.lead_hours,
                valid_time: step.valid_time,
                geometry: run.geometry,
                layers,
                style: style.clone(),
                output_dir: output_dir.to_path_buf(),
            }
        })
        .collect()
}

/// Render every job with at most `workers` in flight.
///
/// Returns exactly one result per job, in job order. A failure or timeout
/// is recorded for its own step and never cancels the others.
#[instrument(skip_all, fields(jobs = jobs.len(), workers = workers))]
pub async fn render_all(
    renderer: &dyn FrameRenderer,
    jobs: Vec<RenderJob>,
    workers: usize,
    step_timeout: Duration,
) -> Vec<Result<FrameRecord, RenderError>> {
    let total = jobs.len();
    let start = Instant::now();
    let mut slots: Vec<Option<Result<FrameRecord, RenderError>>> = (0..total).map(|_| None).collect();
    let steps: Vec<usize> = jobs.iter().map(|j| j.step_index).collect();

    let mut results = stream::iter(jobs.into_iter().enumerate())
        .map(|(slot, job)| {
            let step = job.step_index;
            async move {
                let result = match tokio::time::timeout(step_timeout, renderer.render(job)).await {
                    Ok(result) => result,
                    Err(_) => Err(RenderError::timeout(step, step_timeout.as_secs())),
                };
                (slot, result)
            }
        })
        .buffer_unordered(workers.max(1));

    while let Some((slot, result)) = results.next().await {
        match &result {
            Ok(record) => debug!(step = record.step_index(), "Frame rendered"),
            Err(e) => warn!(step = e.step, error = %e, "Frame render failed"),
        }
        slots[slot] = Some(result);
    }
    drop(results);

    let ordered: Vec<Result<FrameRecord, RenderError>> = slots
        .into_iter()
        .zip(steps)
        .map(|(slot, step)| slot.unwrap_or_else(|| Err(RenderError::crashed(step, "no result"))))
        .collect();

    info!(
        total,
        rendered = ordered.iter().filter(|r| r.is_ok()).count(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Render pool finished"
    );
    ordered
}
