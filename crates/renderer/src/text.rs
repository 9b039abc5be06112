//! Text drawing for titles and labels.

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_text_mut;
use rusttype::{point, Font, Scale};
use std::path::Path;
use tracing::warn;

/// Draws text with an optional TrueType font. Without a font every call is a
/// no-op, so frames still render on hosts with no font installed.
pub struct TextPainter {
    font: Option<Font<'static>>,
}

impl TextPainter {
    pub fn load(path: Option<&Path>) -> Self {
        let font = path.and_then(|p| match std::fs::read(p) {
            Ok(bytes) => {
                let font = Font::try_from_vec(bytes);
                if font.is_none() {
                    warn!(path = %p.display(), "Font file is not a usable TrueType font, drawing without labels");
                }
                font
            }
            Err(e) => {
                warn!(path = %p.display(), error = %e, "Failed to read font, drawing without labels");
                None
            }
        });
        Self { font }
    }

    pub fn none() -> Self {
        Self { font: None }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Advance width of `text` in pixels.
    pub fn width(&self, text: &str, size: f32) -> u32 {
        let Some(font) = &self.font else {
            return 0;
        };
        let scale = Scale::uniform(size);
        font.layout(text, scale, point(0.0, 0.0))
            .filter_map(|g| g.pixel_bounding_box().map(|bb| bb.max.x))
            .max()
            .unwrap_or(0)
            .max(0) as u32
    }

    pub fn draw(&self, canvas: &mut RgbaImage, text: &str, x: i32, y: i32, size: f32, color: [u8; 4]) {
        if let Some(font) = &self.font {
            draw_text_mut(canvas, Rgba(color), x, y, Scale::uniform(size), font, text);
        }
    }

    /// Draw `text` horizontally centred on `cx`.
    pub fn draw_centered(&self, canvas: &mut RgbaImage, text: &str, cx: i32, y: i32, size: f32, color: [u8; 4]) {
        let w = self.width(text, size) as i32;
        self.draw(canvas, text, cx - w / 2, y, size, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_font_draws_nothing() {
        let painter = TextPainter::load(Some(Path::new("/nonexistent/font.ttf")));
        assert!(!painter.has_font());
        let mut canvas = RgbaImage::from_pixel(10, 10, Rgba([1, 2, 3, 255]));
        painter.draw(&mut canvas, "label", 0, 0, 12.0, [255, 255, 255, 255]);
        assert!(canvas.pixels().all(|p| p.0 == [1, 2, 3, 255]));
        assert_eq!(painter.width("label", 12.0), 0);
    }

    #[test]
    fn test_garbage_font_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        assert!(!TextPainter::load(Some(&path)).has_font());
    }
}
