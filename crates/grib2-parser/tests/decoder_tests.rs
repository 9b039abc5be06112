//! End-to-end decoding of synthetic runs.

use grib2_parser::{decode, DecodeConfig};
use msm_common::{FieldKind, PipelineError};
use test_utils::{assert_approx_eq, temp_msm_run, write_msm_run, Grib2Builder, MsmRunSpec};

#[test]
fn test_decodes_steps_in_lead_order() {
    let spec = MsmRunSpec {
        lead_hours: vec![0, 1, 2, 3, 4],
        cumulative_precip: vec![0.0, 3.0, 3.0, 7.0, 5.0],
        parts: 3,
        ..Default::default()
    };
    let (_dir, run_dir) = temp_msm_run(&spec).unwrap();

    let run = decode(&run_dir, &DecodeConfig::default()).unwrap();
    assert_eq!(run.run_id.to_string(), "20251127150000");
    assert_eq!(run.steps.len(), 5);
    for (i, step) in run.steps.iter().enumerate() {
        assert_eq!(step.index, i);
        assert_eq!(step.lead_hours, spec.lead_hours[i]);
        assert_eq!(step.valid_time, run.valid_time(step.lead_hours));
    }
    assert_eq!((run.geometry.width, run.geometry.height), (12, 10));
    assert_approx_eq!(run.geometry.north, 40.0, 1e-9);
    assert_approx_eq!(run.geometry.west, 135.0, 1e-9);
}

#[test]
fn test_accumulated_field_keeps_interval() {
    let (_dir, run_dir) = temp_msm_run(&MsmRunSpec::default()).unwrap();
    let run = decode(&run_dir, &DecodeConfig::default()).unwrap();

    let apcp = run.steps[2].field("APCP").expect("APCP decoded");
    assert_eq!(
        apcp.kind,
        FieldKind::Accumulated {
            start_hour: 0,
            end_hour: 2
        }
    );
    assert_approx_eq!(apcp.values[0], 3.0, 1e-6);
}

#[test]
fn test_missing_required_field_names_step_and_variable() {
    let spec = MsmRunSpec {
        omit: vec![(2, "RH")],
        ..Default::default()
    };
    let (_dir, run_dir) = temp_msm_run(&spec).unwrap();

    match decode(&run_dir, &DecodeConfig::default()) {
        Err(PipelineError::MissingRequiredVariable { step, variable, .. }) => {
            assert_eq!(step, 2);
            assert_eq!(variable, "RH");
        }
        other => panic!("expected MissingRequiredVariable, got {:?}", other.map(|r| r.steps.len())),
    }
}

#[test]
fn test_missing_optional_field_is_tolerated() {
    let spec = MsmRunSpec {
        omit: vec![(1, "HCDC")],
        ..Default::default()
    };
    let (_dir, run_dir) = temp_msm_run(&spec).unwrap();

    let run = decode(&run_dir, &DecodeConfig::default()).unwrap();
    assert!(run.steps[1].field("HCDC").is_none());
    assert!(run.steps[2].field("HCDC").is_some());
}

#[test]
fn test_south_to_north_rows_are_normalised() {
    let dir = tempfile::tempdir().unwrap();
    let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
    let bytes = Grib2Builder::new_msm()
        .with_grid(4, 3, 36.0, 139.0, 1.0)
        .with_south_to_north_rows()
        .with_data(data.clone())
        .build();
    let path = dir.path().join("single.bin");
    std::fs::write(&path, bytes).unwrap();

    let config = DecodeConfig {
        required_fields: vec!["TMP".into()],
        optional_fields: vec![],
    };
    let run = decode(&path, &config).unwrap();
    let values = &run.steps[0].field("TMP").unwrap().values;
    for (got, want) in values.iter().zip(&data) {
        assert_approx_eq!(*got, *want, 0.01);
    }
    assert_approx_eq!(run.geometry.north, 36.0, 1e-9);
}

#[test]
fn test_unreadable_file_is_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.bin"), b"not a grib file at all").unwrap();

    let err = decode(dir.path(), &DecodeConfig::default()).unwrap_err();
    assert!(matches!(err, PipelineError::DecodeError { .. }), "{}", err);
}

#[test]
fn test_empty_directory_is_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = decode(dir.path(), &DecodeConfig::default()).unwrap_err();
    assert!(matches!(err, PipelineError::DecodeError { .. }));
}

#[test]
fn test_mixed_issue_times_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_msm_run(dir.path(), &MsmRunSpec::default()).unwrap();
    let other = Grib2Builder::new_msm()
        .with_grid(12, 10, 40.0, 135.0, 0.5)
        .with_reference_time(2025, 11, 27, 18)
        .build();
    std::fs::write(dir.path().join("zz_other.bin"), other).unwrap();

    let err = decode(dir.path(), &DecodeConfig::default()).unwrap_err();
    assert!(err.to_string().contains("mixed reference times"));
}
