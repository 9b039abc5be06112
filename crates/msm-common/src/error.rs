//! Error types for the MSM pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using PipelineError.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Primary error type shared by every pipeline stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    // === Acquisition ===
    #[error("Remote catalog unreachable: {0}")]
    CatalogUnreachable(String),

    #[error("Failed to fetch run {run_id}: {reason}")]
    FetchFailed { run_id: String, reason: String },

    // === Decoding ===
    #[error("Failed to decode run {run_id}: {reason}")]
    DecodeError { run_id: String, reason: String },

    #[error("Run {run_id} step {step} is missing required variable '{variable}'")]
    MissingRequiredVariable {
        run_id: String,
        step: usize,
        variable: String,
    },

    // === Rendering / assembly ===
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Only {available} frame(s) rendered, at least {required} required")]
    InsufficientFrames { available: usize, required: usize },

    #[error("Station '{station}' lies outside the grid")]
    StationOutOfBounds { station: String },

    // === Infrastructure ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Stable short code used in structured logs and the run report.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::CatalogUnreachable(_) => "catalog_unreachable",
            PipelineError::FetchFailed { .. } => "fetch_failed",
            PipelineError::DecodeError { .. } => "decode_error",
            PipelineError::MissingRequiredVariable { .. } => "missing_required_variable",
            PipelineError::Render(_) => "render_error",
            PipelineError::InsufficientFrames { .. } => "insufficient_frames",
            PipelineError::StationOutOfBounds { .. } => "station_out_of_bounds",
            PipelineError::Config(_) => "config",
            PipelineError::Ledger(_) => "ledger",
            PipelineError::Io(_) => "io",
        }
    }

    /// Whether the error aborts the whole run rather than a single step or station.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PipelineError::FetchFailed { .. }
                | PipelineError::Render(_)
                | PipelineError::StationOutOfBounds { .. }
        )
    }
}

/// Failure of a single frame render. Crosses the worker process boundary as JSON.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("Render of step {step} failed: {kind}")]
pub struct RenderError {
    pub step: usize,
    pub kind: RenderErrorKind,
}

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum RenderErrorKind {
    #[error("timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("worker crashed: {0}")]
    WorkerCrashed(String),

    #[error("{0}")]
    Failed(String),
}

impl RenderError {
    pub fn new(step: usize, kind: RenderErrorKind) -> Self {
        Self { step, kind }
    }

    pub fn failed(step: usize, reason: impl Into<String>) -> Self {
        Self::new(step, RenderErrorKind::Failed(reason.into()))
    }

    pub fn crashed(step: usize, reason: impl Into<String>) -> Self {
        Self::new(step, RenderErrorKind::WorkerCrashed(reason.into()))
    }

    pub fn timeout(step: usize, seconds: u64) -> Self {
        Self::new(step, RenderErrorKind::Timeout { seconds })
    }
}
