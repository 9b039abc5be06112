//! Point time series at fixed stations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use grid_processor::{sample, SamplingMethod};
use msm_common::{
    DerivedSeries, GridGeometry, PipelineError, PipelineResult, SeriesPoint, Station,
    StationSeries,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const STATION_DATA_FILE: &str = "station_data.json";
pub const STATION_AXES_FILE: &str = "station_axes.json";

/// Series for the stations inside the grid, in configured order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationExtraction {
    pub series: Vec<StationSeries>,
    /// Names of stations left out because they lie outside the grid
    pub skipped: Vec<String>,
}

/// Sample every derived variable at one station for every step.
///
/// A step that is invalid, or whose sampled cell is masked, yields a point
/// with no value so all series keep one point per step.
pub fn extract_station(
    station: &Station,
    derived: &[DerivedSeries],
    geometry: &GridGeometry,
    method: SamplingMethod,
) -> PipelineResult<StationSeries> {
    if !geometry.contains(station.lat, station.lon) {
        return Err(PipelineError::StationOutOfBounds {
            station: station.name.clone(),
        });
    }

    let series = derived
        .iter()
        .map(|variable| {
            let points = variable
                .steps
                .iter()
                .map(|step| SeriesPoint {
                    valid_time: step.valid_time,
                    value: step
                        .values()
                        .and_then(|values| sample(geometry, values, station.lat, station.lon, method)),
                })
                .collect();
            (variable.name().to_string(), points)
        })
        .collect();

    Ok(StationSeries {
        station: station.clone(),
        series,
    })
}

/// Extract all stations; out-of-grid stations are warned about and skipped.
pub fn extract_station_series(
    stations: &[Station],
    derived: &[DerivedSeries],
    geometry: &GridGeometry,
    method: SamplingMethod,
) -> StationExtraction {
    let mut extraction = StationExtraction::default();
    for station in stations {
        match extract_station(station, derived, geometry, method) {
            Ok(series) => extraction.series.push(series),
            Err(e) => {
                warn!(station = %station.name, lat = station.lat, lon = station.lon, error = %e, "Station skipped");
                extraction.skipped.push(station.name.clone());
            }
        }
    }
    extraction
}

/// Common y-axis for one variable across all station charts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: f32,
    pub max: f32,
}

/// Per-variable axis ranges: percentages span 0..100, everything else the
/// observed min/max over all stations widened by 10%.
pub fn axis_ranges(series: &[StationSeries], derived: &[DerivedSeries]) -> BTreeMap<String, AxisRange> {
    let mut ranges = BTreeMap::new();
    for variable in derived {
        let name = variable.name();
        if variable.spec.unit == "%" {
            ranges.insert(name.to_string(), AxisRange { min: 0.0, max: 100.0 });
            continue;
        }

        let values = series
            .iter()
            .filter_map(|s| s.series.get(name))
            .flatten()
            .filter_map(|p| p.value);
        let Some((min, max)) = values.fold(None, |acc: Option<(f32, f32)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        }) else {
            continue;
        };

        let mut margin = (max - min) * 0.1;
        if margin == 0.0 {
            margin = if max == 0.0 { 1.0 } else { max.abs() * 0.1 };
        }
        ranges.insert(
            name.to_string(),
            AxisRange {
                min: min - margin,
                max: max + margin,
            },
        );
    }
    ranges
}

/// Write `station_data.json` and `station_axes.json`; returns their paths.
pub fn write_station_files(
    extraction: &StationExtraction,
    derived: &[DerivedSeries],
    output_dir: &Path,
) -> PipelineResult<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(output_dir)?;
    let to_io = |e: serde_json::Error| std::io::Error::new(std::io::ErrorKind::InvalidData, e);

    let data_path = output_dir.join(STATION_DATA_FILE);
    std::fs::write(
        &data_path,
        serde_json::to_vec_pretty(&extraction.series).map_err(to_io)?,
    )?;

    let axes_path = output_dir.join(STATION_AXES_FILE);
    let axes = axis_ranges(&extraction.series, derived);
    std::fs::write(&axes_path, serde_json::to_vec_pretty(&axes).map_err(to_io)?)?;

    info!(
        stations = extraction.series.len(),
        skipped = extraction.skipped.len(),
        path = %data_path.display(),
        "Station series written"
    );
    Ok((data_path, axes_path))
}
