//! Frames written to disk by `render_to_disk`.

use chrono::{TimeZone, Utc};
use msm_common::{FrameMetadata, GridGeometry, ValueRange};
use renderer::{render_to_disk, FrameStyle, Layout, MapExtent, RenderJob, RenderLayer};

fn small_style() -> FrameStyle {
    FrameStyle {
        panel_width: 96,
        panel_height: 72,
        extent: MapExtent {
            west: 134.0,
            east: 142.0,
            south: 34.0,
            north: 40.0,
        },
        ..FrameStyle::default()
    }
}

fn layers() -> Vec<RenderLayer> {
    let geometry = grid();
    let n = geometry.len();
    vec![
        RenderLayer {
            name: "Temperature".to_string(),
            unit: "°C".to_string(),
            color_scale: "rdylbu_r".to_string(),
            value_range: ValueRange::new(-10.0, 35.0),
            values: (0..n).map(|i| i as f32 / 10.0).collect(),
            unavailable: None,
        },
        RenderLayer {
            name: "Precipitation".to_string(),
            unit: "mm/h".to_string(),
            color_scale: "weather_precip".to_string(),
            value_range: ValueRange::new(0.0, 50.0),
            values: vec![0.0; n],
            unavailable: None,
        },
        RenderLayer {
            name: "Cloud Cover".to_string(),
            unit: "%".to_string(),
            color_scale: "greys_r".to_string(),
            value_range: ValueRange::new(0.0, 100.0),
            values: vec![f32::NAN; n],
            unavailable: None,
        },
    ]
}

fn grid() -> GridGeometry {
    GridGeometry::new(12, 10, 40.0, 135.0, 0.5, 0.5)
}

#[test]
fn test_render_to_disk_writes_image_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let job = RenderJob {
        run_id: "20251127150000".to_string(),
        step_index: 7,
        lead_hours: 7,
        valid_time: Utc.with_ymd_and_hms(2025, 11, 27, 22, 0, 0).unwrap(),
        geometry: grid(),
        layers: layers(),
        style: small_style(),
        output_dir: dir.path().join("frames"),
    };

    let record = render_to_disk(&job).unwrap();

    assert_eq!(record.step_index(), 7);
    assert_eq!(record.image_path, dir.path().join("frames/frame_0007.png"));
    assert!(record.metadata_path.ends_with("frame_0007_metadata.json"));

    let layout = Layout::new(3, &job.style);
    let image = image::open(&record.image_path).unwrap().to_rgba8();
    assert_eq!(image.dimensions(), (layout.width, layout.height));
    // background colour at the top-left corner
    assert_eq!(image.get_pixel(0, 0).0, [0x1a, 0x1a, 0x1a, 255]);

    let written: FrameMetadata =
        serde_json::from_slice(&std::fs::read(&record.metadata_path).unwrap()).unwrap();
    assert_eq!(written, record.metadata);
    assert_eq!(written.image_path, "frame_0007.png");
    assert_eq!(written.variables.len(), 3);
    assert_eq!(written.variables["Precipitation"].range_max, Some(0.0));
    assert_eq!(written.variables["Cloud Cover"].range_min, None);
    assert_eq!(written.variables["Temperature"].color_scale, "rdylbu_r");
}

#[test]
fn test_metadata_json_uses_camel_case_keys() {
    let dir = tempfile::tempdir().unwrap();
    let job = RenderJob {
        run_id: "20251127150000".to_string(),
        step_index: 0,
        lead_hours: 0,
        valid_time: Utc.with_ymd_and_hms(2025, 11, 27, 15, 0, 0).unwrap(),
        geometry: grid(),
        layers: layers().into_iter().take(1).collect(),
        style: small_style(),
        output_dir: dir.path().to_path_buf(),
    };

    let record = render_to_disk(&job).unwrap();
    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&record.metadata_path).unwrap()).unwrap();
    assert_eq!(raw["stepIndex"], 0);
    assert_eq!(raw["validTime"], "2025-11-27T15:00:00Z");
    assert!(raw["variables"]["Temperature"]["rangeMin"].is_number());
    assert!(raw["variables"]["Temperature"]["rangeMax"].is_number());
}

#[test]
fn test_unwritable_output_is_a_render_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, b"x").unwrap();
    let job = RenderJob {
        run_id: "20251127150000".to_string(),
        step_index: 2,
        lead_hours: 2,
        valid_time: Utc.with_ymd_and_hms(2025, 11, 27, 17, 0, 0).unwrap(),
        geometry: grid(),
        layers: layers(),
        style: small_style(),
        // a regular file cannot hold the frame directory
        output_dir: blocker.join("frames"),
    };

    let err = render_to_disk(&job).unwrap_err();
    assert_eq!(err.step, 2);
}
