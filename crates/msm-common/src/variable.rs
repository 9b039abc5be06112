//! Display variable definitions: which raw fields feed a variable and how.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// How a display variable is computed from its source fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformKind {
    /// Source values unchanged
    Identity,
    /// `value * factor + offset`, e.g. K to degC or Pa to hPa
    UnitConvert { factor: f32, offset: f32 },
    /// Per-step rate from a cumulative field: `max(0, cur - prev)`
    AccumulationDiff,
    /// `sqrt(u^2 + v^2)` over two component fields
    VectorMagnitude,
    /// Cell-wise maximum across two or more fields
    LayerMaximum,
    /// The first source when the step has it, else the cell-wise maximum of
    /// the remaining sources. Total cloud cover with a low/mid/high fallback.
    TotalOrLayerMaximum,
}

impl TransformKind {
    /// Accepted number of source fields (min, max).
    fn arity(&self) -> (usize, usize) {
        match self {
            TransformKind::Identity
            | TransformKind::UnitConvert { .. }
            | TransformKind::AccumulationDiff => (1, 1),
            TransformKind::VectorMagnitude => (2, 2),
            TransformKind::LayerMaximum => (2, usize::MAX),
            TransformKind::TotalOrLayerMaximum => (3, usize::MAX),
        }
    }

    /// Transforms whose output for a step depends on earlier steps.
    pub fn is_stateful(&self) -> bool {
        matches!(self, TransformKind::AccumulationDiff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn span(&self) -> f32 {
        self.max - self.min
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    /// Position of `value` in the range, clamped to [0, 1]. NaN stays NaN.
    pub fn normalize(&self, value: f32) -> f32 {
        if value.is_nan() {
            return f32::NAN;
        }
        let span = self.span();
        if span <= 0.0 {
            return 0.0;
        }
        ((value - self.min) / span).clamp(0.0, 1.0)
    }
}

/// A named display quantity with its rendering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    /// Raw field short names, in the order the transform consumes them
    pub sources: Vec<String>,
    pub transform: TransformKind,
    pub color_scale: String,
    /// Fixed range used for colouring
    pub value_range: ValueRange,
    pub unit: String,
    /// Physically plausible range; values outside become NaN after the transform
    #[serde(default)]
    pub valid_range: Option<ValueRange>,
}

impl VariableSpec {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::Config("variable with empty name".into()));
        }
        let (min, max) = self.transform.arity();
        let n = self.sources.len();
        if n < min || n > max {
            return Err(PipelineError::Config(format!(
                "variable '{}': transform {:?} takes {} source field(s), got {}",
                self.name,
                self.transform,
                if min == max {
                    min.to_string()
                } else {
                    format!("at least {}", min)
                },
                n
            )));
        }
        if !(self.value_range.min < self.value_range.max) {
            return Err(PipelineError::Config(format!(
                "variable '{}': value_range min must be below max",
                self.name
            )));
        }
        if let Some(valid) = &self.valid_range {
            if !(valid.min <= valid.max) {
                return Err(PipelineError::Config(format!(
                    "variable '{}': valid_range min must not exceed max",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Validate a variable set against the colour scales the renderer knows.
pub fn validate_variables(specs: &[VariableSpec], known_scales: &[&str]) -> PipelineResult<()> {
    if specs.is_empty() {
        return Err(PipelineError::Config("no display variables configured".into()));
    }
    let mut seen = HashSet::new();
    for spec in specs {
        spec.validate()?;
        if !seen.insert(spec.name.as_str()) {
            return Err(PipelineError::Config(format!(
                "duplicate variable name '{}'",
                spec.name
            )));
        }
        if !known_scales.contains(&spec.color_scale.as_str()) {
            return Err(PipelineError::Config(format!(
                "variable '{}': unknown color scale '{}'",
                spec.name, spec.color_scale
            )));
        }
    }
    Ok(())
}

fn spec(
    name: &str,
    sources: &[&str],
    transform: TransformKind,
    color_scale: &str,
    range: (f32, f32),
    unit: &str,
    valid: Option<(f32, f32)>,
) -> VariableSpec {
    VariableSpec {
        name: name.to_string(),
        sources: sources.iter().map(|s| s.to_string()).collect(),
        transform,
        color_scale: color_scale.to_string(),
        value_range: ValueRange::new(range.0, range.1),
        unit: unit.to_string(),
        valid_range: valid.map(|(min, max)| ValueRange::new(min, max)),
    }
}

/// The six MSM surface variables shown on each frame.
pub fn default_variables() -> Vec<VariableSpec> {
    vec![
        spec(
            "Temperature",
            &["TMP"],
            TransformKind::UnitConvert {
                factor: 1.0,
                offset: -273.15,
            },
            "rdylbu_r",
            (-10.0, 35.0),
            "°C",
            Some((-90.0, 60.0)),
        ),
        spec(
            "Pressure",
            &["PRMSL"],
            TransformKind::UnitConvert {
                factor: 0.01,
                offset: 0.0,
            },
            "rdylgn_r",
            (990.0, 1025.0),
            "hPa",
            Some((850.0, 1100.0)),
        ),
        spec(
            "Humidity",
            &["RH"],
            TransformKind::Identity,
            "ylgnbu",
            (40.0, 100.0),
            "%",
            Some((0.0, 100.0)),
        ),
        spec(
            "Precipitation",
            &["APCP"],
            TransformKind::AccumulationDiff,
            "weather_precip",
            (0.0, 50.0),
            "mm/h",
            Some((0.0, 500.0)),
        ),
        spec(
            "Wind Speed",
            &["UGRD", "VGRD"],
            TransformKind::VectorMagnitude,
            "weather_wind",
            (0.0, 25.0),
            "m/s",
            Some((0.0, 150.0)),
        ),
        spec(
            "Cloud Cover",
            &["TCDC", "LCDC", "MCDC", "HCDC"],
            TransformKind::TotalOrLayerMaximum,
            "greys_r",
            (0.0, 100.0),
            "%",
            Some((0.0, 100.0)),
        ),
    ]
}
