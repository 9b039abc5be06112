//! Point sampling of gridded values.

use msm_common::GridGeometry;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMethod {
    #[default]
    Nearest,
    Bilinear,
}

/// Nearest neighbor interpolation at fractional grid position (x, y).
pub fn nearest_interpolate(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    if x < 0.0 || y < 0.0 {
        return f32::NAN;
    }
    let col = x.round() as usize;
    let row = y.round() as usize;

    if col >= width || row >= height {
        return f32::NAN;
    }

    data[row * width + col]
}

/// Bilinear interpolation between the four surrounding grid points.
///
/// Any NaN corner makes the result NaN.
pub fn bilinear_interpolate(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    if x < 0.0 || y < 0.0 || width == 0 || height == 0 {
        return f32::NAN;
    }
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    if x0 >= width || y0 >= height {
        return f32::NAN;
    }
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let xf = (x - x0 as f64) as f32;
    let yf = (y - y0 as f64) as f32;

    let v00 = data[y0 * width + x0];
    let v10 = data[y0 * width + x1];
    let v01 = data[y1 * width + x0];
    let v11 = data[y1 * width + x1];

    if v00.is_nan() || v10.is_nan() || v01.is_nan() || v11.is_nan() {
        return f32::NAN;
    }

    let top = v00 * (1.0 - xf) + v10 * xf;
    let bottom = v01 * (1.0 - xf) + v11 * xf;
    top * (1.0 - yf) + bottom * yf
}

/// Value at a geographic point. None outside the grid or on a masked cell.
pub fn sample(
    geometry: &GridGeometry,
    values: &[f32],
    lat: f64,
    lon: f64,
    method: SamplingMethod,
) -> Option<f32> {
    let (x, y) = geometry.fractional_index(lat, lon)?;
    let value = match method {
        SamplingMethod::Nearest => {
            nearest_interpolate(values, geometry.width, geometry.height, x, y)
        }
        SamplingMethod::Bilinear => {
            bilinear_interpolate(values, geometry.width, geometry.height, x, y)
        }
    };
    if value.is_nan() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_interpolate() {
        let data: Vec<f32> = vec![
            1.0, 2.0, 3.0,
            4.0, 5.0, 6.0,
            7.0, 8.0, 9.0,
        ];

        assert_eq!(nearest_interpolate(&data, 3, 3, 0.4, 0.4), 1.0);
        assert_eq!(nearest_interpolate(&data, 3, 3, 0.6, 0.6), 5.0);
        assert!(nearest_interpolate(&data, 3, 3, 3.0, 0.0).is_nan());
    }

    #[test]
    fn test_bilinear_interpolate() {
        let data: Vec<f32> = vec![
            1.0, 2.0,
            3.0, 4.0,
        ];

        assert_eq!(bilinear_interpolate(&data, 2, 2, 1.0, 1.0), 4.0);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 0.5, 0.5), 2.5);
        assert!(bilinear_interpolate(&[1.0, f32::NAN, 3.0, 4.0], 2, 2, 0.5, 0.5).is_nan());
    }

    #[test]
    fn test_sample_by_coordinates() {
        // rows north to south: lat 36, 35; cols lon 139, 140
        let geometry = GridGeometry::new(2, 2, 36.0, 139.0, 1.0, 1.0);
        let values = [1.0, 2.0, 3.0, 4.0];

        assert_eq!(sample(&geometry, &values, 35.1, 139.9, SamplingMethod::Nearest), Some(4.0));
        assert_eq!(sample(&geometry, &values, 35.5, 139.5, SamplingMethod::Bilinear), Some(2.5));
        assert_eq!(sample(&geometry, &values, 26.2, 127.7, SamplingMethod::Nearest), None);
    }

    #[test]
    fn test_sample_masked_cell_is_none() {
        let geometry = GridGeometry::new(2, 1, 36.0, 139.0, 1.0, 1.0);
        assert_eq!(sample(&geometry, &[f32::NAN, 1.0], 36.0, 139.0, SamplingMethod::Nearest), None);
    }
}
