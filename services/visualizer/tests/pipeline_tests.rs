//! Whole-run processing of synthetic MSM runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use downloader::{Catalog, DownloadError, Ledger, RunDescriptor, RunFetcher, RunPart};
use msm_common::{FrameMetadata, FrameRecord, PipelineError, RenderError};
use renderer::{FrameStyle, RenderJob};
use test_utils::{assert_approx_eq, temp_msm_run, write_msm_run, MsmRunSpec};
use visualizer::{
    FrameRenderer, InProcessRenderer, Isolation, Pipeline, PipelineConfig, ANIMATION_FILE,
    FRAME_INDEX_FILE, STATION_DATA_FILE,
};

fn config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.render.workers = 2;
    config.render.isolation = Isolation::InProcess;
    config.render.style = FrameStyle {
        panel_width: 120,
        panel_height: 100,
        ..FrameStyle::default()
    };
    config.assemble.output_dir = root.join("output");
    config.download.data_dir = root.join("data");
    config.download.ledger_path = root.join("data/ledger.json");
    config
}

#[tokio::test]
async fn test_run_produces_frames_animation_and_stations() {
    let (tmp, run_dir) = temp_msm_run(&MsmRunSpec::default()).unwrap();
    let pipeline = Pipeline::new(config(tmp.path())).unwrap();

    let report = pipeline.process_run(&run_dir).await.unwrap();

    assert_eq!(report.run_id, "20251127150000");
    assert_eq!(report.steps, 4);
    assert_eq!(report.frames_rendered, 4);
    assert!(report.failed_steps.is_empty());
    // only Tokyo lies inside the 35.5-40N, 135-140.5E test grid
    assert_eq!(report.stations_extracted, 1);
    assert_eq!(report.stations_skipped.len(), 6);
    assert!(report.stations_skipped.contains(&"Naha".to_string()));

    let out = tmp.path().join("output/20251127150000");
    assert_eq!(report.output_dir, out);
    assert!(out.join("frame_0000.png").exists());
    assert!(out.join("frame_0003_metadata.json").exists());
    assert_eq!(report.animation, Some(out.join(ANIMATION_FILE)));

    let index: Vec<FrameMetadata> =
        serde_json::from_slice(&std::fs::read(out.join(FRAME_INDEX_FILE)).unwrap()).unwrap();
    assert_eq!(
        index.iter().map(|m| m.step_index).collect::<Vec<_>>(),
        vec![0, 1, 2, 3]
    );
    assert_eq!(index[0].variables.len(), 6);
    assert_eq!(index[2].variables["Precipitation"].color_scale, "weather_precip");

    let stations: serde_json::Value =
        serde_json::from_slice(&std::fs::read(out.join(STATION_DATA_FILE)).unwrap()).unwrap();
    assert_eq!(stations[0]["name"], "Tokyo");
    let precip = stations[0]["series"]["Precipitation"].as_array().unwrap();
    let rates: Vec<f64> = precip.iter().map(|p| p["value"].as_f64().unwrap()).collect();
    for (rate, expected) in rates.iter().zip([0.0, 1.0, 2.0, 0.5]) {
        assert_approx_eq!(*rate, expected, 1e-4);
    }
    let wind = stations[0]["series"]["Wind Speed"][1]["value"].as_f64().unwrap();
    assert_approx_eq!(wind, 5.0, 1e-4);
}

#[tokio::test]
async fn test_missing_precipitation_step_degrades_gracefully() {
    let spec = MsmRunSpec {
        omit: vec![(2, "APCP")],
        ..Default::default()
    };
    let (tmp, run_dir) = temp_msm_run(&spec).unwrap();
    let pipeline = Pipeline::new(config(tmp.path())).unwrap();

    let report = pipeline.process_run(&run_dir).await.unwrap();
    assert_eq!(report.frames_rendered, 4);

    let out = tmp.path().join("output/20251127150000");
    let index: Vec<FrameMetadata> =
        serde_json::from_slice(&std::fs::read(out.join(FRAME_INDEX_FILE)).unwrap()).unwrap();
    assert!(!index[2].variables.contains_key("Precipitation"));
    assert!(index[3].variables.contains_key("Precipitation"));

    let stations: serde_json::Value =
        serde_json::from_slice(&std::fs::read(out.join(STATION_DATA_FILE)).unwrap()).unwrap();
    let precip = &stations[0]["series"]["Precipitation"];
    assert!(precip[2]["value"].is_null());
    // differenced against the last present total (step 1)
    assert_approx_eq!(precip[3]["value"].as_f64().unwrap(), 2.5, 1e-4);
}

#[tokio::test]
async fn test_frames_share_one_size_when_first_step_lacks_a_variable() {
    use image::AnimationDecoder;

    let spec = MsmRunSpec {
        omit: vec![(0, "APCP")],
        ..Default::default()
    };
    let (tmp, run_dir) = temp_msm_run(&spec).unwrap();
    let pipeline = Pipeline::new(config(tmp.path())).unwrap();

    let report = pipeline.process_run(&run_dir).await.unwrap();
    assert_eq!(report.frames_rendered, 4);

    let out = tmp.path().join("output/20251127150000");
    let sizes: Vec<(u32, u32)> = (0..4)
        .map(|i| image::image_dimensions(out.join(format!("frame_{:04}.png", i))).unwrap())
        .collect();
    assert!(sizes.iter().all(|s| *s == sizes[0]), "frame sizes differ: {:?}", sizes);

    let index: Vec<FrameMetadata> =
        serde_json::from_slice(&std::fs::read(out.join(FRAME_INDEX_FILE)).unwrap()).unwrap();
    assert!(!index[0].variables.contains_key("Precipitation"));
    assert_eq!(index[1].variables.len(), 6);

    let gif = std::fs::File::open(report.animation.unwrap()).unwrap();
    let frames = image::codecs::gif::GifDecoder::new(gif)
        .unwrap()
        .into_frames()
        .collect_frames()
        .unwrap();
    assert_eq!(frames.len(), 4);
    for frame in &frames {
        assert_eq!(frame.buffer().dimensions(), sizes[0]);
    }
}

#[tokio::test]
async fn test_missing_required_field_fails_run() {
    let spec = MsmRunSpec {
        omit: vec![(1, "TMP")],
        ..Default::default()
    };
    let (tmp, run_dir) = temp_msm_run(&spec).unwrap();
    let pipeline = Pipeline::new(config(tmp.path())).unwrap();

    let err = pipeline.process_run(&run_dir).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::MissingRequiredVariable { step: 1, .. }
    ));
    assert!(!tmp.path().join("output/20251127150000").exists());
}

/// Renders step 0 only; every other step fails.
struct OnlyFirstStep;

#[async_trait]
impl FrameRenderer for OnlyFirstStep {
    async fn render(&self, job: RenderJob) -> Result<FrameRecord, RenderError> {
        if job.step_index == 0 {
            InProcessRenderer.render(job).await
        } else {
            Err(RenderError::crashed(job.step_index, "segfault"))
        }
    }
}

#[tokio::test]
async fn test_too_many_failed_frames_is_insufficient() {
    let (tmp, run_dir) = temp_msm_run(&MsmRunSpec::default()).unwrap();
    let pipeline = Pipeline::with_renderer(config(tmp.path()), Arc::new(OnlyFirstStep)).unwrap();

    let err = pipeline.process_run(&run_dir).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::InsufficientFrames {
            available: 1,
            required: 2
        }
    ));
}

#[tokio::test]
async fn test_latest_run_comes_from_ledger() {
    let (tmp, run_dir) = temp_msm_run(&MsmRunSpec::default()).unwrap();
    let config = config(tmp.path());

    let mut ledger = Ledger::open(&config.download.ledger_path).unwrap();
    ledger
        .record("20251127150000".parse().unwrap(), run_dir, "fingerprint")
        .unwrap();

    let pipeline = Pipeline::new(config).unwrap();
    let report = pipeline.process_latest().await.unwrap();
    assert_eq!(report.run_id, "20251127150000");
    assert_eq!(report.frames_rendered, 4);
}

#[tokio::test]
async fn test_empty_ledger_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(config(tmp.path())).unwrap();

    let err = pipeline.process_latest().await.unwrap_err();
    assert!(err.to_string().contains("no runs"));
}

/// Publishes one synthetic run.
struct OneRunCatalog;

#[async_trait]
impl Catalog for OneRunCatalog {
    async fn list_available_runs(&self) -> Result<Vec<RunDescriptor>, DownloadError> {
        Ok(vec![RunDescriptor::new(
            "20251127150000".parse().unwrap(),
            vec![RunPart {
                file_name: "Z__C_RJTD_20251127150000_MSM_GPV_Rjp_Lsurf_FH00-03_grib2.bin".into(),
                url: "http://archive/msm.bin".into(),
                listing_meta: "2025-11-27 18:00 1.2M".into(),
            }],
        )])
    }
}

/// Writes the synthetic run instead of downloading.
struct SyntheticFetcher;

#[async_trait]
impl RunFetcher for SyntheticFetcher {
    async fn fetch(&self, _run: &RunDescriptor, dest_dir: &Path) -> Result<PathBuf, DownloadError> {
        write_msm_run(dest_dir, &MsmRunSpec::default())?;
        Ok(dest_dir.to_path_buf())
    }
}

#[tokio::test]
async fn test_fetched_run_is_processed_as_latest() {
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(config(tmp.path())).unwrap();

    let acquired = pipeline
        .acquire(&OneRunCatalog, &SyntheticFetcher, chrono::Utc::now())
        .await
        .unwrap();
    assert_eq!(acquired.fetched.len(), 1);

    let report = pipeline.process_latest().await.unwrap();
    assert_eq!(report.run_id, "20251127150000");
    assert_eq!(report.frames_rendered, 4);
}

#[test]
fn test_invalid_config_is_rejected_before_acquisition() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config(tmp.path());
    config.render.workers = 0;

    // acquisition is a Pipeline method, so nothing can be fetched
    assert!(matches!(Pipeline::new(config), Err(PipelineError::Config(_))));
    assert!(!tmp.path().join("data").exists());
}

#[test]
fn test_shipped_config_matches_defaults() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/msm.yaml");
    let config = PipelineConfig::load(&path).unwrap();
    assert_eq!(config, PipelineConfig::default());

    let acquisition = downloader::DownloaderConfig::load(&path).unwrap();
    assert_eq!(acquisition.download, config.download);
}
