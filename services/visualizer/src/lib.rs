//! MSM forecast visualizer.
//!
//! Turns a stored forecast run into rendered frames, an animation and
//! station time series:
//!
//! - [`pool`]: isolated, bounded-parallel frame rendering
//! - [`assemble`]: step-ordered frame index and GIF
//! - [`stations`]: point series at fixed stations
//! - [`pipeline`]: the whole sequence for one run

pub mod assemble;
pub mod config;
pub mod pipeline;
pub mod pool;
pub mod stations;

pub use assemble::{assemble, AnimationArtifact, ANIMATION_FILE, FRAME_INDEX_FILE};
pub use config::{max_workers, AssembleConfig, Isolation, PipelineConfig, RenderConfig};
pub use pipeline::{Pipeline, RunReport};
pub use pool::{build_jobs, render_all, FrameRenderer, InProcessRenderer, ProcessRenderer};
pub use stations::{
    axis_ranges, extract_station, extract_station_series, write_station_files, AxisRange,
    StationExtraction, STATION_AXES_FILE, STATION_DATA_FILE,
};
