//! Cell-wise transforms applied to source fields.
//!
//! Missing cells are NaN on input and stay NaN on output.

use msm_common::ValueRange;

pub fn unit_convert(values: &[f32], factor: f32, offset: f32) -> Vec<f32> {
    values.iter().map(|v| v * factor + offset).collect()
}

/// `sqrt(u^2 + v^2)`
pub fn vector_magnitude(u: &[f32], v: &[f32]) -> Vec<f32> {
    u.iter().zip(v).map(|(a, b)| a.hypot(*b)).collect()
}

/// Cell-wise maximum. A cell is NaN only when every layer is NaN there.
pub fn layer_maximum(layers: &[&[f32]]) -> Vec<f32> {
    let len = layers.first().map(|l| l.len()).unwrap_or(0);
    (0..len)
        .map(|i| {
            layers
                .iter()
                .map(|layer| layer[i])
                .filter(|v| !v.is_nan())
                .fold(f32::NAN, |acc, v| if acc.is_nan() { v } else { acc.max(v) })
        })
        .collect()
}

/// Per-step amount from a cumulative total: `max(0, current - previous)`.
///
/// Without a previous total the cumulative value itself is the amount.
/// A cell missing from the previous total likewise falls back to its
/// current value.
pub fn accumulation_rate(previous: Option<&[f32]>, current: &[f32]) -> Vec<f32> {
    match previous {
        None => current.iter().map(|c| clamp_non_negative(*c)).collect(),
        Some(prev) => current
            .iter()
            .zip(prev)
            .map(|(c, p)| {
                if p.is_nan() {
                    clamp_non_negative(*c)
                } else {
                    clamp_non_negative(c - p)
                }
            })
            .collect(),
    }
}

fn clamp_non_negative(v: f32) -> f32 {
    if v.is_nan() {
        v
    } else {
        v.max(0.0)
    }
}

/// Replace values outside `range` with NaN. Returns the number of cells masked.
pub fn mask_outside(values: &mut [f32], range: ValueRange) -> usize {
    let mut masked = 0;
    for v in values.iter_mut() {
        if !v.is_nan() && !range.contains(*v) {
            *v = f32::NAN;
            masked += 1;
        }
    }
    masked
}
