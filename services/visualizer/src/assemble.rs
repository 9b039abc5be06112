//! Artifact assembly: ordered frame index and the animated GIF.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::gif::{GifEncoder, Repeat};
use image::{imageops, Delay, Frame, Rgba, RgbaImage};
use msm_common::{FrameMetadata, FrameRecord, PipelineError, PipelineResult, RenderError};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::AssembleConfig;

pub const FRAME_INDEX_FILE: &str = "frames.json";
pub const ANIMATION_FILE: &str = "msm_forecast.gif";

/// The surviving frames of a run in forecast-step order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationArtifact {
    pub frames: Vec<FrameRecord>,
    pub failed_steps: Vec<usize>,
    pub frame_delay_ms: u32,
    pub index_path: PathBuf,
    /// None when the GIF could not be written; the frames are still usable
    pub animation_path: Option<PathBuf>,
}

impl AnimationArtifact {
    pub fn steps(&self) -> Vec<usize> {
        self.frames.iter().map(FrameRecord::step_index).collect()
    }
}

/// Order the successful frames by step and write the frame index and GIF.
///
/// Fails only when fewer than `min_frames` frames survived.
#[instrument(skip_all, fields(results = results.len(), output = %output_dir.display()))]
pub fn assemble(
    results: Vec<Result<FrameRecord, RenderError>>,
    config: &AssembleConfig,
    output_dir: &Path,
) -> PipelineResult<AnimationArtifact> {
    let mut frames = Vec::with_capacity(results.len());
    let mut failed_steps = Vec::new();
    for result in results {
        match result {
            Ok(frame) => frames.push(frame),
            Err(e) => failed_steps.push(e.step),
        }
    }
    frames.sort_by_key(FrameRecord::step_index);
    failed_steps.sort_unstable();

    if frames.len() < config.min_frames {
        return Err(PipelineError::InsufficientFrames {
            available: frames.len(),
            required: config.min_frames,
        });
    }
    if !failed_steps.is_empty() {
        warn!(failed_steps = ?failed_steps, "Assembling without failed steps");
    }

    std::fs::create_dir_all(output_dir)?;

    let index_path = output_dir.join(FRAME_INDEX_FILE);
    let index: Vec<&FrameMetadata> = frames.iter().map(|f| &f.metadata).collect();
    let json = serde_json::to_vec_pretty(&index)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(&index_path, json)?;

    let gif_path = output_dir.join(ANIMATION_FILE);
    let animation_path = match write_gif(&frames, config.frame_delay_ms, &gif_path) {
        Ok(()) => Some(gif_path),
        Err(e) => {
            warn!(path = %gif_path.display(), error = %e, "Animation not written");
            None
        }
    };

    info!(
        frames = frames.len(),
        failed = failed_steps.len(),
        index = %index_path.display(),
        "Frames assembled"
    );

    Ok(AnimationArtifact {
        frames,
        failed_steps,
        frame_delay_ms: config.frame_delay_ms,
        index_path,
        animation_path,
    })
}

/// Infinite-loop GIF of the frame images in the given order.
///
/// A GIF has one logical screen size, so every frame is placed top-left on a
/// canvas as large as the largest frame. The uncovered area is white.
pub fn write_gif(frames: &[FrameRecord], delay_ms: u32, path: &Path) -> image::ImageResult<()> {
    let (width, height) = frames.iter().try_fold((0u32, 0u32), |(w, h), record| {
        let (fw, fh) = image::image_dimensions(&record.image_path)?;
        Ok::<_, image::ImageError>((w.max(fw), h.max(fh)))
    })?;

    let delay = Delay::from_numer_denom_ms(delay_ms, 1);
    let file = BufWriter::new(File::create(path)?);
    let mut encoder = GifEncoder::new_with_speed(file, 10);
    encoder.set_repeat(Repeat::Infinite)?;

    for record in frames {
        let buffer = image::open(&record.image_path)?.to_rgba8();
        let buffer = if buffer.dimensions() == (width, height) {
            buffer
        } else {
            debug!(
                step = record.step_index(),
                from = ?buffer.dimensions(),
                to = ?(width, height),
                "Padding frame"
            );
            let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
            imageops::overlay(&mut canvas, &buffer, 0, 0);
            canvas
        };
        encoder.encode_frame(Frame::from_parts(buffer, 0, 0, delay))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn frame(dir: &Path, step: usize) -> FrameRecord {
        sized_frame(dir, step, 8, 6)
    }

    fn sized_frame(dir: &Path, step: usize, width: u32, height: u32) -> FrameRecord {
        let image_path = dir.join(format!("frame_{:04}.png", step));
        RgbaImage::from_pixel(width, height, Rgba([step as u8 * 20, 40, 60, 255]))
            .save(&image_path)
            .unwrap();
        FrameRecord {
            metadata: FrameMetadata {
                run_id: "20251127150000".to_string(),
                step_index: step,
                lead_hours: step as u32,
                valid_time: Utc.with_ymd_and_hms(2025, 11, 27, 15 + step as u32, 0, 0).unwrap(),
                image_path: format!("frame_{:04}.png", step),
                variables: BTreeMap::new(),
            },
            image_path,
            metadata_path: dir.join(format!("frame_{:04}_metadata.json", step)),
        }
    }

    fn config(min_frames: usize) -> AssembleConfig {
        AssembleConfig {
            min_frames,
            ..AssembleConfig::default()
        }
    }

    #[test]
    fn test_too_few_frames_is_insufficient() {
        let dir = tempfile::tempdir().unwrap();
        let mut results: Vec<Result<FrameRecord, RenderError>> = (0..10)
            .map(|i| Err(RenderError::failed(i, "boom")))
            .collect();
        results[6] = Ok(frame(dir.path(), 6));

        let err = assemble(results, &config(2), dir.path()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientFrames {
                available: 1,
                required: 2
            }
        ));
        assert!(!dir.path().join(FRAME_INDEX_FILE).exists());
    }

    #[test]
    fn test_exact_minimum_is_ordered_by_step() {
        let dir = tempfile::tempdir().unwrap();
        // completion order, not step order
        let results = vec![
            Ok(frame(dir.path(), 7)),
            Err(RenderError::failed(3, "boom")),
            Ok(frame(dir.path(), 2)),
            Err(RenderError::timeout(0, 120)),
        ];

        let artifact = assemble(results, &config(2), dir.path()).unwrap();
        assert_eq!(artifact.steps(), vec![2, 7]);
        assert_eq!(artifact.failed_steps, vec![0, 3]);

        let index: Vec<FrameMetadata> =
            serde_json::from_slice(&std::fs::read(&artifact.index_path).unwrap()).unwrap();
        assert_eq!(
            index.iter().map(|m| m.step_index).collect::<Vec<_>>(),
            vec![2, 7]
        );
    }

    #[test]
    fn test_gif_has_one_frame_per_survivor() {
        use image::AnimationDecoder;

        let dir = tempfile::tempdir().unwrap();
        let results = (0..3).map(|i| Ok(frame(dir.path(), i))).collect();
        let artifact = assemble(results, &config(2), dir.path()).unwrap();

        let path = artifact.animation_path.unwrap();
        let decoder = image::codecs::gif::GifDecoder::new(File::open(&path).unwrap()).unwrap();
        let frames = decoder.into_frames().collect_frames().unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(
            std::time::Duration::from(frames[0].delay()),
            std::time::Duration::from_millis(500)
        );
    }

    #[test]
    fn test_missing_image_keeps_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = frame(dir.path(), 0);
        let b = frame(dir.path(), 1);
        a.image_path = dir.path().join("gone.png");

        let artifact = assemble(vec![Ok(a), Ok(b)], &config(2), dir.path()).unwrap();
        assert!(artifact.animation_path.is_none());
        assert!(artifact.index_path.exists());
    }

    #[test]
    fn test_gif_pads_frames_to_largest() {
        use image::AnimationDecoder;

        let dir = tempfile::tempdir().unwrap();
        // first step rendered with fewer panels
        let frames = vec![
            sized_frame(dir.path(), 0, 20, 10),
            sized_frame(dir.path(), 1, 20, 30),
            sized_frame(dir.path(), 2, 20, 30),
        ];
        let path = dir.path().join(ANIMATION_FILE);
        write_gif(&frames, 500, &path).unwrap();

        let decoder = image::codecs::gif::GifDecoder::new(File::open(&path).unwrap()).unwrap();
        let decoded = decoder.into_frames().collect_frames().unwrap();
        assert_eq!(decoded.len(), 3);
        for frame in &decoded {
            assert_eq!(frame.buffer().dimensions(), (20, 30));
        }
        let first = decoded[0].buffer();
        assert!(first.get_pixel(5, 5).0[0] < 64);
        assert!(first.get_pixel(5, 25).0.iter().all(|&c| c > 224));
    }
}
