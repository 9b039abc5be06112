//! Common types shared by the MSM forecast pipeline crates and services.

pub mod derived;
pub mod error;
pub mod frame;
pub mod grid;
pub mod run;
pub mod station;
pub mod variable;

pub use derived::{DerivedSeries, DerivedValues, DerivedVariable, ObservedRange};
pub use error::{PipelineError, PipelineResult, RenderError, RenderErrorKind};
pub use frame::{FrameMetadata, FrameRecord, LayerRange};
pub use grid::{FieldKind, GridField, GridGeometry};
pub use run::{ForecastRun, ForecastStep, RunId};
pub use station::{default_stations, SeriesPoint, Station, StationSeries};
pub use variable::{default_variables, validate_variables, TransformKind, ValueRange, VariableSpec};
