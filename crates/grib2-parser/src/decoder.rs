//! Decoding of a stored MSM run into a [`ForecastRun`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use msm_common::{
    FieldKind, ForecastRun, ForecastStep, GridField, GridGeometry, PipelineError, PipelineResult,
    RunId,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::sections::GridDefinition;
use crate::{Grib2Error, Grib2Message, Grib2Reader, Grib2Tables};

/// Which raw fields to extract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Every step must carry these or the run is rejected
    #[serde(default = "default_required_fields")]
    pub required_fields: Vec<String>,
    /// Extracted when present
    #[serde(default = "default_optional_fields")]
    pub optional_fields: Vec<String>,
}

fn default_required_fields() -> Vec<String> {
    ["PRMSL", "TMP", "RH", "UGRD", "VGRD"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_optional_fields() -> Vec<String> {
    ["APCP", "TCDC", "LCDC", "MCDC", "HCDC", "PRES", "DSWRF"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            required_fields: default_required_fields(),
            optional_fields: default_optional_fields(),
        }
    }
}

impl DecodeConfig {
    fn wants(&self, name: &str) -> bool {
        self.required_fields.iter().any(|f| f == name) || self.optional_fields.iter().any(|f| f == name)
    }
}

/// Decode a stored run. `path` is a single GRIB2 file or a directory whose
/// `.bin`/`.grib2` files together form the run.
///
/// Steps come out ordered by lead time. Only fields named in `config` are
/// kept; the first occurrence of a field at a given lead time wins.
pub fn decode(path: &Path, config: &DecodeConfig) -> PipelineResult<ForecastRun> {
    let label = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let decode_error = |reason: String| PipelineError::DecodeError {
        run_id: label.clone(),
        reason,
    };

    let files = collect_files(path).map_err(|e| decode_error(e.to_string()))?;
    if files.is_empty() {
        return Err(decode_error("no GRIB2 files found".to_string()));
    }

    let tables = Arc::new(Grib2Tables::msm());
    let mut issue_time: Option<DateTime<Utc>> = None;
    let mut geometry: Option<GridGeometry> = None;
    let mut by_lead: BTreeMap<u32, BTreeMap<String, GridField>> = BTreeMap::new();
    let mut message_count = 0usize;

    for file in &files {
        let data = std::fs::read(file)
            .map_err(|e| decode_error(format!("{}: {}", file.display(), e)))?;
        let mut reader = Grib2Reader::new(Bytes::from(data), tables.clone());

        loop {
            let msg = match reader.next_message() {
                Ok(Some(msg)) => msg,
                Ok(None) => break,
                Err(e) if e.is_structural() => {
                    return Err(decode_error(format!("{}: {}", file.display(), e)));
                }
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "Skipping unreadable GRIB2 message");
                    continue;
                }
            };
            message_count += 1;

            if !config.wants(msg.parameter()) {
                continue;
            }

            let reference = msg.identification.reference_time;
            match issue_time {
                None => issue_time = Some(reference),
                Some(t) if t != reference => {
                    return Err(decode_error(format!(
                        "mixed reference times {} and {}",
                        t, reference
                    )));
                }
                Some(_) => {}
            }

            let (field, lead) = match decode_field(&msg) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!(
                        file = %file.display(),
                        parameter = msg.parameter(),
                        error = %e,
                        "Skipping undecodable field"
                    );
                    continue;
                }
            };

            match &geometry {
                None => geometry = Some(field.geometry),
                Some(g) if *g != field.geometry => {
                    return Err(decode_error(format!(
                        "field {} at +{}h is on a different grid",
                        field.name, lead
                    )));
                }
                Some(_) => {}
            }

            let step = by_lead.entry(lead).or_default();
            if step.contains_key(&field.name) {
                debug!(parameter = %field.name, level = %field.level, lead, "Duplicate field ignored");
                continue;
            }
            step.insert(field.name.clone(), field);
        }
    }

    let (issue_time, geometry) = match (issue_time, geometry) {
        (Some(t), Some(g)) => (t, g),
        _ => {
            return Err(decode_error(format!(
                "none of {} message(s) carried a wanted field",
                message_count
            )))
        }
    };

    let run_id = RunId::from_issue_time(issue_time);
    let mut steps = Vec::with_capacity(by_lead.len());
    for (index, (lead_hours, fields)) in by_lead.into_iter().enumerate() {
        if let Some(missing) = config.required_fields.iter().find(|f| !fields.contains_key(*f)) {
            return Err(PipelineError::MissingRequiredVariable {
                run_id: run_id.to_string(),
                step: index,
                variable: missing.clone(),
            });
        }
        steps.push(ForecastStep {
            index,
            lead_hours,
            valid_time: issue_time + chrono::Duration::hours(lead_hours as i64),
            fields,
        });
    }

    let present: BTreeSet<&str> = steps
        .iter()
        .flat_map(|s| s.fields.keys().map(|k| k.as_str()))
        .collect();
    info!(
        run_id = %run_id,
        files = files.len(),
        messages = message_count,
        steps = steps.len(),
        fields = ?present,
        "Decoded forecast run"
    );

    Ok(ForecastRun {
        run_id,
        geometry,
        steps,
    })
}

fn collect_files(path: &Path) -> std::io::Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("bin") | Some("grib2") | Some("grb2")
                )
        })
        .collect();
    files.sort();
    Ok(files)
}

fn decode_field(msg: &Grib2Message) -> Result<(GridField, u32), Grib2Error> {
    let product = &msg.product_definition;
    let lead = product.lead_hours()?;
    let kind = match product.accumulation_hours()? {
        Some((start_hour, end_hour)) => FieldKind::Accumulated {
            start_hour,
            end_hour,
        },
        None => FieldKind::Instant,
    };

    let raw = msg.unpack_data()?;
    let (geometry, values) = to_north_up(&msg.grid_definition, raw);

    Ok((
        GridField {
            name: product.parameter_short_name.clone(),
            level: product.level_description.clone(),
            kind,
            geometry,
            values,
        },
        lead,
    ))
}

/// Reorder values into rows north to south, columns west to east.
fn to_north_up(grid: &GridDefinition, values: Vec<f32>) -> (GridGeometry, Vec<f32>) {
    let ni = grid.ni as usize;
    let nj = grid.nj as usize;
    let geometry = GridGeometry::new(
        ni,
        nj,
        grid.first_latitude.max(grid.last_latitude),
        grid.first_longitude.min(grid.last_longitude),
        grid.dj,
        grid.di,
    );

    let i_negative = grid.scanning_mode & 0x80 != 0;
    let j_positive = grid.scanning_mode & 0x40 != 0;
    let j_consecutive = grid.scanning_mode & 0x20 != 0;
    if !i_negative && !j_positive && !j_consecutive {
        return (geometry, values);
    }

    let mut out = vec![f32::NAN; ni * nj];
    for (k, value) in values.into_iter().enumerate() {
        let (i, j) = if j_consecutive {
            (k / nj, k % nj)
        } else {
            (k % ni, k / ni)
        };
        let col = if i_negative { ni - 1 - i } else { i };
        let row = if j_positive { nj - 1 - j } else { j };
        out[row * ni + col] = value;
    }
    (geometry, out)
}
