//! Self-contained description of one frame to render.
//!
//! A job carries everything a worker needs by value, so it can be handed to
//! another thread or serialised to a separate worker process.

use chrono::{DateTime, Utc};
use msm_common::{FrameRecord, GridGeometry, RenderError, ValueRange};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::style::FrameStyle;

/// One variable panel of a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderLayer {
    pub name: String,
    pub unit: String,
    pub color_scale: String,
    pub value_range: ValueRange,
    /// Row-major north-up values, NaN where masked; empty when unavailable
    #[serde(with = "nan_as_null")]
    pub values: Vec<f32>,
    /// Why the variable has no data at this step. The panel keeps its place
    /// in the layout and is drawn empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unavailable: Option<String>,
}

impl RenderLayer {
    pub fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderJob {
    pub run_id: String,
    pub step_index: usize,
    pub lead_hours: u32,
    pub valid_time: DateTime<Utc>,
    pub geometry: GridGeometry,
    pub layers: Vec<RenderLayer>,
    pub style: FrameStyle,
    pub output_dir: PathBuf,
}

impl RenderJob {
    pub fn image_file_name(&self) -> String {
        format!("frame_{:04}.png", self.step_index)
    }

    pub fn metadata_file_name(&self) -> String {
        format!("frame_{:04}_metadata.json", self.step_index)
    }
}

/// What a worker process prints on stdout after handling one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum WorkerReply {
    Rendered(FrameRecord),
    Failed(RenderError),
}

impl From<Result<FrameRecord, RenderError>> for WorkerReply {
    fn from(result: Result<FrameRecord, RenderError>) -> Self {
        match result {
            Ok(record) => WorkerReply::Rendered(record),
            Err(e) => WorkerReply::Failed(e),
        }
    }
}

impl WorkerReply {
    pub fn into_result(self) -> Result<FrameRecord, RenderError> {
        match self {
            WorkerReply::Rendered(record) => Ok(record),
            WorkerReply::Failed(e) => Err(e),
        }
    }
}

/// JSON has no NaN, so masked cells travel as `null`.
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|v| if v.is_finite() { Some(*v) } else { None }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f32>, D::Error> {
        let raw: Vec<Option<f32>> = Vec::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|v| v.unwrap_or(f32::NAN)).collect())
    }
}
