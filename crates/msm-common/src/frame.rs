//! Rendered frame records exchanged between the render pool and the assembler.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::derived::ObservedRange;
use crate::variable::ValueRange;

/// Range information for one variable on one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerRange {
    /// Observed minimum; None when every cell was masked
    pub range_min: Option<f32>,
    pub range_max: Option<f32>,
    pub color_scale: String,
    /// Fixed colouring range
    pub scale_min: f32,
    pub scale_max: f32,
    pub unit: String,
}

impl LayerRange {
    pub fn new(observed: Option<ObservedRange>, scale: ValueRange, color_scale: &str, unit: &str) -> Self {
        Self {
            range_min: observed.map(|r| r.min),
            range_max: observed.map(|r| r.max),
            color_scale: color_scale.to_string(),
            scale_min: scale.min,
            scale_max: scale.max,
            unit: unit.to_string(),
        }
    }

    pub fn observed(&self) -> Option<ObservedRange> {
        match (self.range_min, self.range_max) {
            (Some(min), Some(max)) => Some(ObservedRange { min, max }),
            _ => None,
        }
    }
}

/// Sidecar metadata written next to each frame image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMetadata {
    pub run_id: String,
    pub step_index: usize,
    pub lead_hours: u32,
    pub valid_time: DateTime<Utc>,
    /// Image file name, relative to the metadata file
    pub image_path: String,
    pub variables: BTreeMap<String, LayerRange>,
}

/// A successfully rendered frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub metadata: FrameMetadata,
    pub image_path: PathBuf,
    pub metadata_path: PathBuf,
}

impl FrameRecord {
    pub fn step_index(&self) -> usize {
        self.metadata.step_index
    }
}
