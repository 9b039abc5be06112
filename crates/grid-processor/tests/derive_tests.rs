//! Derivation over hand-built runs.

use std::collections::BTreeMap;

use chrono::{Duration, TimeZone, Utc};
use grid_processor::{derive, derive_all};
use msm_common::{
    default_variables, FieldKind, ForecastRun, ForecastStep, GridField, GridGeometry, RunId,
    TransformKind, ValueRange, VariableSpec,
};

fn geometry() -> GridGeometry {
    GridGeometry::new(1, 1, 35.0, 139.0, 0.05, 0.0625)
}

/// Single-cell run; `fields[i]` lists (name, value) present at step i.
fn run_with(fields: Vec<Vec<(&str, f32)>>) -> ForecastRun {
    let issue = Utc.with_ymd_and_hms(2025, 11, 27, 15, 0, 0).unwrap();
    let steps = fields
        .into_iter()
        .enumerate()
        .map(|(index, present)| {
            let fields: BTreeMap<String, GridField> = present
                .into_iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        GridField {
                            name: name.to_string(),
                            level: "surface".into(),
                            kind: FieldKind::Instant,
                            geometry: geometry(),
                            values: vec![value],
                        },
                    )
                })
                .collect();
            ForecastStep {
                index,
                lead_hours: index as u32,
                valid_time: issue + Duration::hours(index as i64),
                fields,
            }
        })
        .collect();
    ForecastRun {
        run_id: RunId::from_issue_time(issue),
        geometry: geometry(),
        steps,
    }
}

fn precip_spec() -> VariableSpec {
    default_variables()
        .into_iter()
        .find(|v| v.transform == TransformKind::AccumulationDiff)
        .unwrap()
}

fn values(series: &msm_common::DerivedSeries) -> Vec<Option<f32>> {
    series
        .steps
        .iter()
        .map(|s| s.values().map(|v| v[0]))
        .collect()
}

#[test]
fn test_accumulation_diff_single_cell() {
    let run = run_with(
        [0.0, 3.0, 3.0, 7.0, 5.0]
            .iter()
            .map(|v| vec![("APCP", *v)])
            .collect(),
    );
    let series = derive(&run, &precip_spec());
    assert_eq!(
        values(&series),
        vec![Some(0.0), Some(3.0), Some(0.0), Some(4.0), Some(0.0)]
    );
}

#[test]
fn test_accumulation_gap_uses_last_present_total() {
    let run = run_with(vec![
        vec![("APCP", 0.0)],
        vec![("APCP", 2.0)],
        vec![],
        vec![("APCP", 5.0)],
    ]);
    let series = derive(&run, &precip_spec());
    assert_eq!(values(&series), vec![Some(0.0), Some(2.0), None, Some(3.0)]);
}

#[test]
fn test_missing_source_invalidates_only_that_step() {
    let wind = default_variables()
        .into_iter()
        .find(|v| v.transform == TransformKind::VectorMagnitude)
        .unwrap();
    let run = run_with(vec![
        vec![("UGRD", 3.0), ("VGRD", 4.0)],
        vec![("UGRD", 3.0)],
        vec![("UGRD", 6.0), ("VGRD", 8.0)],
    ]);

    let series = derive(&run, &wind);
    assert_eq!(series.steps.len(), 3);
    assert_eq!(values(&series), vec![Some(5.0), None, Some(10.0)]);
    match &series.steps[1].values {
        msm_common::DerivedValues::Invalid { reason } => assert!(reason.contains("VGRD")),
        other => panic!("expected invalid step, got {:?}", other),
    }
}

#[test]
fn test_valid_range_masks_implausible_values() {
    let spec = VariableSpec {
        name: "Humidity".into(),
        sources: vec!["RH".into()],
        transform: TransformKind::Identity,
        color_scale: "ylgnbu".into(),
        value_range: ValueRange::new(40.0, 100.0),
        unit: "%".into(),
        valid_range: Some(ValueRange::new(0.0, 100.0)),
    };
    let run = run_with(vec![vec![("RH", 140.0)], vec![("RH", 60.0)]]);
    let series = derive(&run, &spec);

    assert!(series.steps[0].is_valid());
    assert!(series.steps[0].values().unwrap()[0].is_nan());
    assert_eq!(series.steps[1].values().unwrap()[0], 60.0);
}

#[test]
fn test_derive_all_is_aligned_with_steps() {
    let step = vec![
        ("TMP", 283.15),
        ("PRMSL", 101_300.0),
        ("RH", 70.0),
        ("UGRD", 1.0),
        ("VGRD", 1.0),
        ("APCP", 0.0),
        ("LCDC", 10.0),
        ("MCDC", 50.0),
        ("HCDC", 20.0),
    ];
    let run = run_with(vec![step.clone(), step.clone(), step]);

    let specs = default_variables();
    let all = derive_all(&run, &specs);
    assert_eq!(all.len(), specs.len());
    for (series, spec) in all.iter().zip(&specs) {
        assert_eq!(series.name(), spec.name);
        assert_eq!(series.steps.len(), 3);
        assert!(series.steps.iter().all(|s| s.is_valid()), "{}", spec.name);
    }

    let temperature = &all[0].steps[0].values().unwrap()[0];
    assert!((temperature - 10.0).abs() < 1e-3);
    let pressure = &all[1].steps[0].values().unwrap()[0];
    assert!((pressure - 1013.0).abs() < 1e-3);
    // no TCDC in the run, so the layer maximum is shown
    let cloud = &all[5].steps[0].values().unwrap()[0];
    assert_eq!(*cloud, 50.0);
}

fn cloud_spec() -> VariableSpec {
    default_variables()
        .into_iter()
        .find(|v| v.name == "Cloud Cover")
        .unwrap()
}

#[test]
fn test_cloud_cover_prefers_total() {
    let run = run_with(vec![vec![
        ("TCDC", 70.0),
        ("LCDC", 10.0),
        ("MCDC", 90.0),
        ("HCDC", 20.0),
    ]]);
    let series = derive(&run, &cloud_spec());
    assert_eq!(values(&series), vec![Some(70.0)]);
}

#[test]
fn test_cloud_cover_falls_back_per_step() {
    let run = run_with(vec![
        vec![("TCDC", 70.0), ("LCDC", 10.0), ("MCDC", 90.0), ("HCDC", 20.0)],
        vec![("LCDC", 10.0), ("MCDC", 90.0), ("HCDC", 20.0)],
        vec![("LCDC", 10.0), ("HCDC", 20.0)],
    ]);
    let series = derive(&run, &cloud_spec());

    assert_eq!(values(&series), vec![Some(70.0), Some(90.0), None]);
    match &series.steps[2].values {
        msm_common::DerivedValues::Invalid { reason } => {
            assert!(reason.contains("TCDC"), "{}", reason);
            assert!(reason.contains("MCDC"), "{}", reason);
        }
        other => panic!("expected invalid step, got {:?}", other),
    }
}

#[test]
fn test_misconfigured_spec_marks_every_step_invalid() {
    let mut wind = default_variables().remove(4);
    wind.sources.truncate(1);
    let run = run_with(vec![vec![("UGRD", 1.0)], vec![("UGRD", 1.0)]]);
    let series = derive(&run, &wind);
    assert_eq!(series.steps.len(), 2);
    assert!(series.steps.iter().all(|s| !s.is_valid()));
}
