//! Regular latitude/longitude grid geometry and decoded fields.

use serde::{Deserialize, Serialize};

/// Geometry of a regular lat/lon grid.
///
/// Rows are stored north to south and columns west to east, whatever the
/// scanning order of the source message was.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    /// Number of columns (longitude points)
    pub width: usize,
    /// Number of rows (latitude points)
    pub height: usize,
    /// Latitude of the first (northernmost) row in degrees
    pub north: f64,
    /// Longitude of the first (westernmost) column in degrees
    pub west: f64,
    /// Latitude spacing in degrees (positive)
    pub dlat: f64,
    /// Longitude spacing in degrees (positive)
    pub dlon: f64,
}

impl GridGeometry {
    pub fn new(width: usize, height: usize, north: f64, west: f64, dlat: f64, dlon: f64) -> Self {
        Self {
            width,
            height,
            north,
            west,
            dlat,
            dlon,
        }
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn south(&self) -> f64 {
        self.north - self.height.saturating_sub(1) as f64 * self.dlat
    }

    pub fn east(&self) -> f64 {
        self.west + self.width.saturating_sub(1) as f64 * self.dlon
    }

    pub fn lat_of_row(&self, row: usize) -> f64 {
        self.north - row as f64 * self.dlat
    }

    pub fn lon_of_col(&self, col: usize) -> f64 {
        self.west + col as f64 * self.dlon
    }

    /// True when the point lies inside the grid's bounding box (edges included).
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.south() && lat <= self.north && lon >= self.west && lon <= self.east()
    }

    /// Fractional (column, row) position of a point, or None outside the grid.
    pub fn fractional_index(&self, lat: f64, lon: f64) -> Option<(f64, f64)> {
        if !self.contains(lat, lon) {
            return None;
        }
        let x = (lon - self.west) / self.dlon;
        let y = (self.north - lat) / self.dlat;
        Some((x, y))
    }

    /// Index of the grid cell nearest to a point, or None outside the grid.
    pub fn nearest_index(&self, lat: f64, lon: f64) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let (x, y) = self.fractional_index(lat, lon)?;
        let col = (x.round() as usize).min(self.width - 1);
        let row = (y.round() as usize).min(self.height - 1);
        Some(row * self.width + col)
    }
}

/// Whether a field is an instantaneous value or an accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Instant,
    /// Accumulated over [start_hour, end_hour] of lead time
    Accumulated { start_hour: u32, end_hour: u32 },
}

/// One decoded 2-D field. Missing or masked cells are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct GridField {
    pub name: String,
    pub level: String,
    pub kind: FieldKind,
    pub geometry: GridGeometry,
    pub values: Vec<f32>,
}

impl GridField {
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.geometry.height || col >= self.geometry.width {
            return None;
        }
        self.values.get(row * self.geometry.width + col).copied()
    }
}
