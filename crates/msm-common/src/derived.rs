//! Display variables computed from a decoded run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::grid::GridGeometry;
use crate::variable::VariableSpec;

/// Values of one variable at one step, or the reason it could not be computed.
#[derive(Debug, Clone, PartialEq)]
pub enum DerivedValues {
    Valid(Vec<f32>),
    Invalid { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedVariable {
    pub name: String,
    pub step_index: usize,
    pub valid_time: DateTime<Utc>,
    pub values: DerivedValues,
}

impl DerivedVariable {
    pub fn is_valid(&self) -> bool {
        matches!(self.values, DerivedValues::Valid(_))
    }

    pub fn values(&self) -> Option<&[f32]> {
        match &self.values {
            DerivedValues::Valid(v) => Some(v),
            DerivedValues::Invalid { .. } => None,
        }
    }

    /// Min/max over finite cells, None when the step is invalid or fully masked.
    pub fn observed_range(&self) -> Option<ObservedRange> {
        ObservedRange::of(self.values()?)
    }
}

/// Extent of the values actually present in a field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservedRange {
    pub min: f32,
    pub max: f32,
}

impl ObservedRange {
    pub fn of(values: &[f32]) -> Option<Self> {
        values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<Self>, v| match acc {
                None => Some(Self { min: v, max: v }),
                Some(r) => Some(Self {
                    min: r.min.min(v),
                    max: r.max.max(v),
                }),
            })
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// A variable over every step of a run, index-aligned with the run's steps.
#[derive(Debug, Clone)]
pub struct DerivedSeries {
    pub spec: VariableSpec,
    pub geometry: GridGeometry,
    pub steps: Vec<DerivedVariable>,
}

impl DerivedSeries {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn step(&self, index: usize) -> Option<&DerivedVariable> {
        self.steps.get(index)
    }
}
