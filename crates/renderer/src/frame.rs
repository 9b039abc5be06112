//! Composite frame rendering.
//!
//! A frame shows one forecast step: one map panel per layer, laid out in up
//! to two columns. Every step of a run carries the same layers, so all its
//! frames share one size; a layer without data is drawn as an empty panel.
//! Each panel has a graticule, a vertical colour bar and a title, under a
//! common suptitle. Rasterisation is plate carrée over the style's
//! map extent with nearest-cell sampling of the source grid.

use std::collections::BTreeMap;
use std::fs;

use chrono::Utc;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use msm_common::{
    FrameMetadata, FrameRecord, GridGeometry, LayerRange, ObservedRange, RenderError,
};
use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::colorscale::ColorScale;
use crate::job::{RenderJob, RenderLayer};
use crate::png;
use crate::style::{FrameStyle, MapExtent};
use crate::text::TextPainter;

const MARGIN: u32 = 16;
const HEADER: u32 = 48;
const FOOTER: u32 = 28;
const PANEL_TITLE: u32 = 28;
const BAR_GAP: u32 = 10;
const BAR_WIDTH: u32 = 14;
const BAR_LABELS: u32 = 56;
const AXIS_LABELS: u32 = 18;

const TITLE_SIZE: f32 = 22.0;
const PANEL_TITLE_SIZE: f32 = 16.0;
const LABEL_SIZE: f32 = 11.0;
const FOOTER_COLOR: [u8; 4] = [0x66, 0x66, 0x66, 255];

/// Pixel layout of a frame with `n` panels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub cols: u32,
    pub rows: u32,
    pub cell_width: u32,
    pub cell_height: u32,
    pub width: u32,
    pub height: u32,
}

impl Layout {
    pub fn new(panels: usize, style: &FrameStyle) -> Self {
        let cols = panels.clamp(1, 2) as u32;
        let rows = (panels.max(1) as u32 + cols - 1) / cols;
        let cell_width = style.panel_width + BAR_GAP + BAR_WIDTH + BAR_LABELS + MARGIN;
        let cell_height = PANEL_TITLE + style.panel_height + AXIS_LABELS + MARGIN;
        Self {
            cols,
            rows,
            cell_width,
            cell_height,
            width: MARGIN + cols * cell_width,
            height: HEADER + rows * cell_height + FOOTER,
        }
    }

    /// Top-left corner of the map area of panel `index`.
    pub fn panel_origin(&self, index: usize) -> (u32, u32) {
        let col = index as u32 % self.cols;
        let row = index as u32 / self.cols;
        (
            MARGIN + col * self.cell_width,
            HEADER + row * self.cell_height + PANEL_TITLE,
        )
    }
}

/// Render a job into an in-memory image.
pub fn render(job: &RenderJob, painter: &TextPainter) -> Result<RgbaImage, RenderError> {
    let style = &job.style;
    style
        .validate()
        .map_err(|e| RenderError::failed(job.step_index, format!("invalid style: {}", e)))?;
    if !job.layers.iter().any(RenderLayer::is_available) {
        return Err(RenderError::failed(job.step_index, "no renderable variables"));
    }

    let mut scales = Vec::with_capacity(job.layers.len());
    for layer in &job.layers {
        if layer.is_available() && layer.values.len() != job.geometry.len() {
            return Err(RenderError::failed(
                job.step_index,
                format!(
                    "layer {} has {} values for a {}x{} grid",
                    layer.name,
                    layer.values.len(),
                    job.geometry.width,
                    job.geometry.height
                ),
            ));
        }
        let scale = ColorScale::named(&layer.color_scale).ok_or_else(|| {
            RenderError::failed(
                job.step_index,
                format!("unknown color scale {}", layer.color_scale),
            )
        })?;
        scales.push(scale);
    }

    let layout = Layout::new(job.layers.len(), style);
    let mut canvas = RgbaImage::from_pixel(layout.width, layout.height, Rgba(style.color(&style.background)));

    for (index, (layer, scale)) in job.layers.iter().zip(&scales).enumerate() {
        let (x0, y0) = layout.panel_origin(index);
        draw_panel(&mut canvas, x0, y0, job.geometry, layer, scale, style, painter);
    }

    let text = style.color(&style.text);
    let title = format!(
        "MSM Forecast | {} (FT+{}h)",
        job.valid_time.format("%Y-%m-%d %H:%M UTC"),
        job.lead_hours
    );
    painter.draw_centered(&mut canvas, &title, layout.width as i32 / 2, 12, TITLE_SIZE, text);

    let footer = format!("Generated: {}", Utc::now().format("%Y-%m-%d %H:%M"));
    let footer_width = painter.width(&footer, LABEL_SIZE) as i32;
    painter.draw(
        &mut canvas,
        &footer,
        layout.width as i32 - MARGIN as i32 - footer_width,
        (layout.height - FOOTER + 8) as i32,
        LABEL_SIZE,
        FOOTER_COLOR,
    );

    Ok(canvas)
}

/// Render a job and write the image and its metadata sidecar into
/// `job.output_dir`.
#[instrument(skip(job), fields(run_id = %job.run_id, step = job.step_index))]
pub fn render_to_disk(job: &RenderJob) -> Result<FrameRecord, RenderError> {
    let painter = TextPainter::load(job.style.font_path.as_deref());
    let canvas = render(job, &painter)?;
    let (width, height) = canvas.dimensions();

    let encoded = png::encode_auto(canvas.as_raw(), width as usize, height as usize)
        .map_err(|e| RenderError::failed(job.step_index, e.to_string()))?;

    let io_error = |e: std::io::Error| RenderError::failed(job.step_index, e.to_string());
    fs::create_dir_all(&job.output_dir).map_err(io_error)?;

    let image_path = job.output_dir.join(job.image_file_name());
    fs::write(&image_path, &encoded).map_err(io_error)?;

    let metadata = frame_metadata(job);
    let metadata_path = job.output_dir.join(job.metadata_file_name());
    let json = serde_json::to_vec_pretty(&metadata)
        .map_err(|e| RenderError::failed(job.step_index, e.to_string()))?;
    fs::write(&metadata_path, json).map_err(io_error)?;

    debug!(
        image = %image_path.display(),
        bytes = encoded.len(),
        width,
        height,
        "Frame written"
    );

    Ok(FrameRecord {
        metadata,
        image_path,
        metadata_path,
    })
}

/// Metadata record for a job: the observed range of every available layer
/// next to the fixed range it was coloured with.
pub fn frame_metadata(job: &RenderJob) -> FrameMetadata {
    let variables: BTreeMap<String, LayerRange> = job
        .layers
        .iter()
        .filter(|layer| layer.is_available())
        .map(|layer| {
            (
                layer.name.clone(),
                LayerRange::new(
                    ObservedRange::of(&layer.values),
                    layer.value_range,
                    &layer.color_scale,
                    &layer.unit,
                ),
            )
        })
        .collect();

    FrameMetadata {
        run_id: job.run_id.clone(),
        step_index: job.step_index,
        lead_hours: job.lead_hours,
        valid_time: job.valid_time,
        image_path: job.image_file_name(),
        variables,
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_panel(
    canvas: &mut RgbaImage,
    x0: u32,
    y0: u32,
    geometry: GridGeometry,
    layer: &RenderLayer,
    scale: &ColorScale,
    style: &FrameStyle,
    painter: &TextPainter,
) {
    let (w, h) = (style.panel_width, style.panel_height);
    let face = style.color(&style.face);
    if layer.is_available() {
        let pixels = rasterize(geometry, layer, scale, &style.extent, w, h, face);
        for (i, px) in pixels.chunks_exact(4).enumerate() {
            let (x, y) = (i as u32 % w, i as u32 / w);
            canvas.put_pixel(x0 + x, y0 + y, Rgba([px[0], px[1], px[2], px[3]]));
        }
    } else {
        draw_filled_rect_mut(canvas, Rect::at(x0 as i32, y0 as i32).of_size(w, h), Rgba(face));
    }

    draw_graticule(canvas, x0, y0, style, painter);
    if !layer.is_available() {
        painter.draw_centered(
            canvas,
            "No data",
            (x0 + w / 2) as i32,
            (y0 + h / 2) as i32 - 8,
            PANEL_TITLE_SIZE,
            style.color(&style.text),
        );
    }
    draw_hollow_rect_mut(
        canvas,
        Rect::at(x0 as i32 - 1, y0 as i32 - 1).of_size(w + 2, h + 2),
        Rgba(style.color(&style.border)),
    );

    let text = style.color(&style.text);
    painter.draw_centered(
        canvas,
        &layer.name,
        (x0 + w / 2) as i32,
        (y0 - PANEL_TITLE + 4) as i32,
        PANEL_TITLE_SIZE,
        text,
    );

    draw_color_bar(canvas, x0 + w + BAR_GAP, y0, h, layer, scale, style, painter);
}

/// Colour the map area of one panel as RGBA bytes, rows in parallel.
pub fn rasterize(
    geometry: GridGeometry,
    layer: &RenderLayer,
    scale: &ColorScale,
    extent: &MapExtent,
    width: u32,
    height: u32,
    face: [u8; 4],
) -> Vec<u8> {
    let cols: Vec<Option<usize>> = (0..width)
        .map(|x| nearest(extent.lon_at(x, width), geometry.west, geometry.dlon, geometry.width))
        .collect();

    let mut pixels = vec![0u8; (width * height * 4) as usize];
    pixels
        .par_chunks_mut((width * 4) as usize)
        .enumerate()
        .for_each(|(y, row_px)| {
            let lat = extent.lat_at(y as u32, height);
            let row = nearest(geometry.north - lat, 0.0, geometry.dlat, geometry.height);
            for (x, px) in row_px.chunks_exact_mut(4).enumerate() {
                let color = match (row, cols[x]) {
                    (Some(r), Some(c)) => {
                        let value = layer.values[r * geometry.width + c];
                        scale
                            .color_at(layer.value_range.normalize(value))
                            .map(|rgba| blend(face, rgba))
                            .unwrap_or(face)
                    }
                    _ => face,
                };
                px.copy_from_slice(&color);
            }
        });
    pixels
}

/// Nearest grid index along one axis, None more than half a cell outside.
fn nearest(coord: f64, origin: f64, step: f64, count: usize) -> Option<usize> {
    if step <= 0.0 || count == 0 {
        return None;
    }
    let pos = ((coord - origin) / step).round();
    if pos < 0.0 || pos >= count as f64 {
        return None;
    }
    Some(pos as usize)
}

fn blend(under: [u8; 4], over: [u8; 4]) -> [u8; 4] {
    let a = over[3] as f32 / 255.0;
    let mix = |u: u8, o: u8| (o as f32 * a + u as f32 * (1.0 - a)).round() as u8;
    [mix(under[0], over[0]), mix(under[1], over[1]), mix(under[2], over[2]), 255]
}

fn draw_graticule(canvas: &mut RgbaImage, x0: u32, y0: u32, style: &FrameStyle, painter: &TextPainter) {
    let (w, h) = (style.panel_width, style.panel_height);
    let extent = &style.extent;
    let grid = Rgba(style.color(&style.grid));
    let text = style.color(&style.text);
    let step = style.graticule_step;

    let mut lon = (extent.west / step).ceil() * step;
    while lon <= extent.east {
        let x = x0 as f32 + extent.x_of(lon, w) as f32;
        draw_line_segment_mut(canvas, (x, y0 as f32), (x, (y0 + h - 1) as f32), grid);
        let label = format!("{}°E", lon);
        let lw = painter.width(&label, LABEL_SIZE) as i32;
        painter.draw(canvas, &label, x as i32 - lw / 2, (y0 + h + 3) as i32, LABEL_SIZE, text);
        lon += step;
    }

    let mut lat = (extent.south / step).ceil() * step;
    while lat <= extent.north {
        let y = y0 as f32 + extent.y_of(lat, h) as f32;
        draw_line_segment_mut(canvas, (x0 as f32, y), ((x0 + w - 1) as f32, y), grid);
        let label = format!("{}°N", lat);
        painter.draw(canvas, &label, x0 as i32 + 3, y as i32 - 12, LABEL_SIZE, text);
        lat += step;
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_color_bar(
    canvas: &mut RgbaImage,
    x0: u32,
    y0: u32,
    height: u32,
    layer: &RenderLayer,
    scale: &ColorScale,
    style: &FrameStyle,
    painter: &TextPainter,
) {
    let face = style.color(&style.face);
    for y in 0..height {
        let t = 1.0 - (y as f32 + 0.5) / height as f32;
        let color = scale.color_at(t).map(|c| blend(face, c)).unwrap_or(face);
        for x in 0..BAR_WIDTH {
            canvas.put_pixel(x0 + x, y0 + y, Rgba(color));
        }
    }
    draw_hollow_rect_mut(
        canvas,
        Rect::at(x0 as i32, y0 as i32).of_size(BAR_WIDTH, height),
        Rgba(style.color(&style.border)),
    );

    let text = style.color(&style.text);
    let range = layer.value_range;
    let label_x = (x0 + BAR_WIDTH + 4) as i32;
    for (t, value) in [
        (1.0, range.min),
        (0.5, range.min + range.span() / 2.0),
        (0.0, range.max),
    ] {
        let y = y0 as f32 + t * (height - 1) as f32;
        painter.draw(canvas, &tick_label(value, range.span()), label_x, y as i32 - 6, LABEL_SIZE, text);
    }
    painter.draw(
        canvas,
        &format!("[{}]", layer.unit),
        label_x,
        y0 as i32 + height as i32 / 2 + 14,
        LABEL_SIZE,
        text,
    );
}

fn tick_label(value: f32, span: f32) -> String {
    if span >= 10.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use msm_common::{RenderErrorKind, ValueRange};

    fn layer(values: Vec<f32>) -> RenderLayer {
        RenderLayer {
            name: "Temperature".to_string(),
            unit: "°C".to_string(),
            color_scale: "rdylbu_r".to_string(),
            value_range: ValueRange::new(0.0, 10.0),
            values,
            unavailable: None,
        }
    }

    fn job(layers: Vec<RenderLayer>) -> RenderJob {
        RenderJob {
            run_id: "20251127150000".to_string(),
            step_index: 5,
            lead_hours: 5,
            valid_time: Utc.with_ymd_and_hms(2025, 11, 27, 20, 0, 0).unwrap(),
            // 4x3 grid covering 36..37N, 136..137.5E
            geometry: GridGeometry::new(4, 3, 37.0, 136.0, 0.5, 0.5),
            layers,
            style: FrameStyle {
                panel_width: 80,
                panel_height: 64,
                extent: MapExtent {
                    west: 135.0,
                    east: 139.0,
                    south: 35.0,
                    north: 38.0,
                },
                ..FrameStyle::default()
            },
            output_dir: std::env::temp_dir(),
        }
    }

    #[test]
    fn test_layout_columns() {
        let style = FrameStyle::default();
        assert_eq!(Layout::new(1, &style).cols, 1);
        let six = Layout::new(6, &style);
        assert_eq!((six.cols, six.rows), (2, 3));
        let three = Layout::new(3, &style);
        assert_eq!((three.cols, three.rows), (2, 2));
        assert_eq!(three.panel_origin(2).0, three.panel_origin(0).0);
        assert!(three.panel_origin(1).0 > three.panel_origin(0).0);
    }

    #[test]
    fn test_nearest_axis_lookup() {
        assert_eq!(nearest(136.2, 136.0, 0.5, 4), Some(0));
        assert_eq!(nearest(136.3, 136.0, 0.5, 4), Some(1));
        assert_eq!(nearest(135.7, 136.0, 0.5, 4), None);
        assert_eq!(nearest(137.7, 136.0, 0.5, 4), Some(3));
        assert_eq!(nearest(137.9, 136.0, 0.5, 4), None);
    }

    #[test]
    fn test_rasterize_colors_only_covered_pixels() {
        let j = job(vec![layer(vec![10.0; 12])]);
        let scale = ColorScale::named("rdylbu_r").unwrap();
        let face = [42, 42, 42, 255];
        let px = rasterize(j.geometry, &j.layers[0], &scale, &j.style.extent, 80, 64, face);

        let at = |x: usize, y: usize| &px[(y * 80 + x) * 4..(y * 80 + x) * 4 + 4];
        // north-west corner of the extent is outside the grid
        assert_eq!(at(0, 0), &face);
        // 136.5E, 36.5N is inside; max of rdylbu_r is #a50026
        let x = ((136.5 - 135.0) / 4.0 * 80.0) as usize;
        let y = ((38.0 - 36.5) / 3.0 * 64.0) as usize;
        assert_eq!(at(x, y), &[0xa5, 0x00, 0x26, 255]);
    }

    #[test]
    fn test_masked_cells_show_face() {
        let j = job(vec![layer(vec![f32::NAN; 12])]);
        let scale = ColorScale::named("rdylbu_r").unwrap();
        let face = [42, 42, 42, 255];
        let px = rasterize(j.geometry, &j.layers[0], &scale, &j.style.extent, 80, 64, face);
        assert!(px.chunks_exact(4).all(|p| p == face));
    }

    #[test]
    fn test_no_layers_is_a_render_error() {
        let err = render(&job(vec![]), &TextPainter::none()).unwrap_err();
        assert_eq!(err.step, 5);
        assert!(matches!(err.kind, RenderErrorKind::Failed(ref m) if m.contains("no renderable")));
    }

    #[test]
    fn test_wrong_value_count_is_a_render_error() {
        let err = render(&job(vec![layer(vec![1.0; 5])]), &TextPainter::none()).unwrap_err();
        assert!(matches!(err.kind, RenderErrorKind::Failed(_)));
    }

    #[test]
    fn test_unknown_scale_is_a_render_error() {
        let mut l = layer(vec![1.0; 12]);
        l.color_scale = "jet".to_string();
        assert!(render(&job(vec![l]), &TextPainter::none()).is_err());
    }

    #[test]
    fn test_metadata_reports_observed_and_fixed_ranges() {
        let mut values = vec![2.0; 12];
        values[3] = 7.5;
        values[4] = f32::NAN;
        let meta = frame_metadata(&job(vec![layer(values)]));
        let range = &meta.variables["Temperature"];
        assert_eq!(range.range_min, Some(2.0));
        assert_eq!(range.range_max, Some(7.5));
        assert_eq!((range.scale_min, range.scale_max), (0.0, 10.0));
        assert_eq!(meta.image_path, "frame_0005.png");
    }

    fn unavailable(name: &str) -> RenderLayer {
        RenderLayer {
            name: name.to_string(),
            values: Vec::new(),
            unavailable: Some("APCP missing".to_string()),
            ..layer(Vec::new())
        }
    }

    #[test]
    fn test_unavailable_layer_keeps_frame_size() {
        let full = render(
            &job(vec![layer(vec![1.0; 12]), layer(vec![2.0; 12]), layer(vec![3.0; 12])]),
            &TextPainter::none(),
        )
        .unwrap();
        let partial = render(
            &job(vec![layer(vec![1.0; 12]), unavailable("Precipitation"), layer(vec![3.0; 12])]),
            &TextPainter::none(),
        )
        .unwrap();
        assert_eq!(full.dimensions(), partial.dimensions());

        // the empty panel shows only the face colour inside its map area
        let style = job(vec![]).style;
        let layout = Layout::new(3, &style);
        let (x0, y0) = layout.panel_origin(1);
        let face = Rgba(style.color(&style.face));
        assert_eq!(*partial.get_pixel(x0 + 1, y0 + 1), face);
    }

    #[test]
    fn test_only_unavailable_layers_is_a_render_error() {
        let err = render(&job(vec![unavailable("Precipitation")]), &TextPainter::none()).unwrap_err();
        assert!(matches!(err.kind, RenderErrorKind::Failed(ref m) if m.contains("no renderable")));
    }

    #[test]
    fn test_metadata_leaves_out_unavailable_layers() {
        let meta = frame_metadata(&job(vec![layer(vec![1.0; 12]), unavailable("Precipitation")]));
        assert!(meta.variables.contains_key("Temperature"));
        assert!(!meta.variables.contains_key("Precipitation"));
    }
}
