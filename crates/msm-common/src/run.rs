//! Forecast run identity and the decoded run structure.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::grid::{GridField, GridGeometry};

const RUN_ID_FORMAT: &str = "%Y%m%d%H%M%S";

/// Identity of a forecast run: its issue time, written as `YYYYMMDDHHMMSS`.
///
/// Ordering follows issue time, so the newest run is the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId(DateTime<Utc>);

impl RunId {
    pub fn from_issue_time(issue_time: DateTime<Utc>) -> Self {
        Self(issue_time)
    }

    pub fn issue_time(&self) -> DateTime<Utc> {
        self.0
    }

    /// UTC hour of the issue cycle.
    pub fn cycle_hour(&self) -> u32 {
        self.0.hour()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(RUN_ID_FORMAT))
    }
}

impl FromStr for RunId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let naive = NaiveDateTime::parse_from_str(s, RUN_ID_FORMAT)
            .map_err(|e| PipelineError::Config(format!("invalid run id '{}': {}", s, e)))?;
        Ok(Self(Utc.from_utc_datetime(&naive)))
    }
}

impl TryFrom<String> for RunId {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RunId> for String {
    fn from(id: RunId) -> Self {
        id.to_string()
    }
}

/// One forecast lead time of a run with all fields decoded for it.
#[derive(Debug, Clone)]
pub struct ForecastStep {
    /// Position in the run, 0-based
    pub index: usize,
    pub lead_hours: u32,
    pub valid_time: DateTime<Utc>,
    /// Fields keyed by parameter short name (TMP, PRMSL, ...)
    pub fields: BTreeMap<String, GridField>,
}

impl ForecastStep {
    pub fn field(&self, name: &str) -> Option<&GridField> {
        self.fields.get(name)
    }
}

/// A decoded forecast run. Steps are ordered by lead time and share one geometry.
#[derive(Debug, Clone)]
pub struct ForecastRun {
    pub run_id: RunId,
    pub geometry: GridGeometry,
    pub steps: Vec<ForecastStep>,
}

impl ForecastRun {
    pub fn issue_time(&self) -> DateTime<Utc> {
        self.run_id.issue_time()
    }

    pub fn valid_time(&self, lead_hours: u32) -> DateTime<Utc> {
        self.issue_time() + Duration::hours(lead_hours as i64)
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}
