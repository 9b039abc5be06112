//! Fixed observation points and their extracted time series.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl Station {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            name: name.into(),
            lat,
            lon,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub valid_time: DateTime<Utc>,
    /// None where the step was invalid or the sampled cell was masked
    pub value: Option<f32>,
}

/// Per-station record: one series per display variable, in step order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationSeries {
    #[serde(flatten)]
    pub station: Station,
    pub series: BTreeMap<String, Vec<SeriesPoint>>,
}

/// JMA observatories used for the station time series.
pub fn default_stations() -> Vec<Station> {
    vec![
        Station::new("Sapporo", 43.06, 141.35),
        Station::new("Sendai", 38.27, 140.87),
        Station::new("Tokyo", 35.69, 139.69),
        Station::new("Nagoya", 35.17, 136.91),
        Station::new("Osaka", 34.69, 135.50),
        Station::new("Fukuoka", 33.58, 130.38),
        Station::new("Naha", 26.21, 127.69),
    ]
}
