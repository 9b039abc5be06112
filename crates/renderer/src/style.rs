//! Frame layout and theme configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Geographic window drawn in every panel, degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapExtent {
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
}

impl Default for MapExtent {
    fn default() -> Self {
        Self {
            west: 128.0,
            east: 148.0,
            south: 30.0,
            north: 46.0,
        }
    }
}

impl MapExtent {
    pub fn is_valid(&self) -> bool {
        self.west < self.east && self.south < self.north
    }

    /// Longitude at the centre of pixel column `x` of a `width` wide panel.
    pub fn lon_at(&self, x: u32, width: u32) -> f64 {
        self.west + (x as f64 + 0.5) / width as f64 * (self.east - self.west)
    }

    /// Latitude at the centre of pixel row `y` of a `height` tall panel.
    pub fn lat_at(&self, y: u32, height: u32) -> f64 {
        self.north - (y as f64 + 0.5) / height as f64 * (self.north - self.south)
    }

    pub fn x_of(&self, lon: f64, width: u32) -> f64 {
        (lon - self.west) / (self.east - self.west) * width as f64
    }

    pub fn y_of(&self, lat: f64, height: u32) -> f64 {
        (self.north - lat) / (self.north - self.south) * height as f64
    }
}

/// Dark theme and panel geometry shared by every frame of an animation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameStyle {
    #[serde(default)]
    pub extent: MapExtent,
    #[serde(default = "default_panel_width")]
    pub panel_width: u32,
    #[serde(default = "default_panel_height")]
    pub panel_height: u32,
    /// Degrees between graticule lines
    #[serde(default = "default_graticule_step")]
    pub graticule_step: f64,
    #[serde(default = "default_background")]
    pub background: String,
    /// Panel face where no data is drawn
    #[serde(default = "default_face")]
    pub face: String,
    #[serde(default = "default_text")]
    pub text: String,
    #[serde(default = "default_grid")]
    pub grid: String,
    #[serde(default = "default_border")]
    pub border: String,
    /// TrueType font for titles and labels; frames are drawn without text when unset
    #[serde(default)]
    pub font_path: Option<PathBuf>,
}

fn default_panel_width() -> u32 {
    480
}

fn default_panel_height() -> u32 {
    400
}

fn default_graticule_step() -> f64 {
    5.0
}

fn default_background() -> String {
    "#1a1a1a".to_string()
}

fn default_face() -> String {
    "#2a2a2a".to_string()
}

fn default_text() -> String {
    "#e0e0e0".to_string()
}

fn default_grid() -> String {
    "#404040".to_string()
}

fn default_border() -> String {
    "#808080".to_string()
}

impl Default for FrameStyle {
    fn default() -> Self {
        Self {
            extent: MapExtent::default(),
            panel_width: default_panel_width(),
            panel_height: default_panel_height(),
            graticule_step: default_graticule_step(),
            background: default_background(),
            face: default_face(),
            text: default_text(),
            grid: default_grid(),
            border: default_border(),
            font_path: None,
        }
    }
}

impl FrameStyle {
    /// Check the style before any frame is rendered.
    pub fn validate(&self) -> Result<(), String> {
        if !self.extent.is_valid() {
            return Err(format!("invalid map extent {:?}", self.extent));
        }
        if self.panel_width < 64 || self.panel_height < 64 {
            return Err(format!(
                "panel size {}x{} is below 64x64",
                self.panel_width, self.panel_height
            ));
        }
        if self.graticule_step <= 0.0 {
            return Err("graticule_step must be positive".to_string());
        }
        for (key, value) in [
            ("background", &self.background),
            ("face", &self.face),
            ("text", &self.text),
            ("grid", &self.grid),
            ("border", &self.border),
        ] {
            if hex_to_rgb(value).is_none() {
                return Err(format!("{} colour '{}' is not #rrggbb", key, value));
            }
        }
        Ok(())
    }

    pub fn color(&self, hex: &str) -> [u8; 4] {
        let (r, g, b) = hex_to_rgb(hex).unwrap_or((128, 128, 128));
        [r, g, b, 255]
    }
}

/// Parse hex color string to RGB
pub fn hex_to_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }

    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;

    Some((r, g, b))
}
