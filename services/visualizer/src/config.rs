//! Pipeline configuration.
//!
//! Loaded once from `config/msm.yaml` and validated before anything runs.
//! Every section is optional; missing keys take their defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use downloader::{CatalogConfig, DownloadSettings};
use grib2_parser::DecodeConfig;
use grid_processor::SamplingMethod;
use msm_common::{
    default_stations, default_variables, validate_variables, PipelineError, PipelineResult,
    Station, VariableSpec,
};
use renderer::{FrameStyle, KNOWN_SCALES};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub download: DownloadSettings,
    #[serde(default)]
    pub decode: DecodeConfig,
    #[serde(default = "default_variables")]
    pub variables: Vec<VariableSpec>,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub assemble: AssembleConfig,
    #[serde(default = "default_stations")]
    pub stations: Vec<Station>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig::default(),
            download: DownloadSettings::default(),
            decode: DecodeConfig::default(),
            variables: default_variables(),
            render: RenderConfig::default(),
            assemble: AssembleConfig::default(),
            stations: default_stations(),
        }
    }
}

/// Where a frame is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// One `renderer-worker` process per frame
    #[default]
    Process,
    /// Blocking threads of this process
    InProcess,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Concurrent frame renders
    #[serde(default = "max_workers")]
    pub workers: usize,
    #[serde(default)]
    pub isolation: Isolation,
    /// `renderer-worker` executable; defaults to the one next to this binary
    #[serde(default)]
    pub worker_binary: Option<PathBuf>,
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    #[serde(default)]
    pub style: FrameStyle,
}

/// Available parallelism minus one for the orchestrating process, at least 1.
pub fn max_workers() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

fn default_step_timeout_secs() -> u64 {
    120
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            workers: max_workers(),
            isolation: Isolation::default(),
            worker_binary: None,
            step_timeout_secs: default_step_timeout_secs(),
            style: FrameStyle::default(),
        }
    }
}

impl RenderConfig {
    /// Configured worker count clamped to `1..=max_workers()`.
    pub fn effective_workers(&self) -> usize {
        self.workers.clamp(1, max_workers())
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn worker_binary(&self) -> PipelineResult<PathBuf> {
        if let Some(path) = &self.worker_binary {
            return Ok(path.clone());
        }
        let exe = std::env::current_exe()?;
        Ok(exe.with_file_name(format!("renderer-worker{}", std::env::consts::EXE_SUFFIX)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembleConfig {
    /// Fewer surviving frames than this fails the run
    #[serde(default = "default_min_frames")]
    pub min_frames: usize,
    #[serde(default = "default_frame_delay_ms")]
    pub frame_delay_ms: u32,
    /// Each run gets its own subdirectory
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub sampling: SamplingMethod,
}

fn default_min_frames() -> usize {
    2
}

fn default_frame_delay_ms() -> u32 {
    500
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for AssembleConfig {
    fn default() -> Self {
        Self {
            min_frames: default_min_frames(),
            frame_delay_ms: default_frame_delay_ms(),
            output_dir: default_output_dir(),
            sampling: SamplingMethod::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml(text: &str) -> PipelineResult<Self> {
        let config: Self = serde_yaml::from_str(text)
            .map_err(|e| PipelineError::Config(format!("invalid YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&text)
    }

    /// Reject anything that would otherwise fail deep inside a run.
    pub fn validate(&self) -> PipelineResult<()> {
        downloader::DownloaderConfig {
            catalog: self.catalog.clone(),
            download: self.download.clone(),
        }
        .validate()?;

        validate_variables(&self.variables, KNOWN_SCALES)?;

        if self.render.workers == 0 {
            return Err(PipelineError::Config("render.workers must be at least 1".into()));
        }
        if self.render.step_timeout_secs == 0 {
            return Err(PipelineError::Config("render.step_timeout_secs must be positive".into()));
        }
        self.render
            .style
            .validate()
            .map_err(|e| PipelineError::Config(format!("render.style: {}", e)))?;

        if self.assemble.min_frames == 0 {
            return Err(PipelineError::Config("assemble.min_frames must be at least 1".into()));
        }
        if self.assemble.frame_delay_ms == 0 {
            return Err(PipelineError::Config("assemble.frame_delay_ms must be positive".into()));
        }

        for station in &self.stations {
            if !(-90.0..=90.0).contains(&station.lat) || !(-180.0..=360.0).contains(&station.lon) {
                return Err(PipelineError::Config(format!(
                    "station '{}' has invalid coordinates ({}, {})",
                    station.name, station.lat, station.lon
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_is_default() {
        let config = PipelineConfig::from_yaml("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.variables.len(), 6);
        assert_eq!(config.stations.len(), 7);
        assert_eq!(config.assemble.min_frames, 2);
        assert_eq!(config.render.isolation, Isolation::Process);
    }

    #[test]
    fn test_partial_sections() {
        let yaml = r#"
render:
  workers: 1
  isolation: in_process
  style:
    panel_width: 240
assemble:
  sampling: bilinear
  frame_delay_ms: 250
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.render.effective_workers(), 1);
        assert_eq!(config.render.isolation, Isolation::InProcess);
        assert_eq!(config.render.style.panel_width, 240);
        assert_eq!(config.render.style.panel_height, 400);
        assert_eq!(config.assemble.sampling, SamplingMethod::Bilinear);
        assert_eq!(config.assemble.frame_delay_ms, 250);
    }

    #[test]
    fn test_workers_clamped_to_maximum() {
        let render = RenderConfig {
            workers: 10_000,
            ..RenderConfig::default()
        };
        assert_eq!(render.effective_workers(), max_workers());
    }

    #[test]
    fn test_unknown_color_scale_rejected() {
        let yaml = r#"
variables:
  - name: Temperature
    sources: [TMP]
    transform: { kind: identity }
    color_scale: jet
    value_range: { min: 0.0, max: 1.0 }
    unit: K
"#;
        let err = PipelineConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("jet"));
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(PipelineConfig::from_yaml("render:\n  workers: 0\n").is_err());
    }

    #[test]
    fn test_bad_style_rejected() {
        let err = PipelineConfig::from_yaml("render:\n  style:\n    background: black\n").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_explicit_worker_binary() {
        let render = RenderConfig {
            worker_binary: Some(PathBuf::from("/opt/msm/renderer-worker")),
            ..RenderConfig::default()
        };
        assert_eq!(
            render.worker_binary().unwrap(),
            PathBuf::from("/opt/msm/renderer-worker")
        );
    }
}
