//! GRIB2 data unpacking.
//!
//! Simple packing (template 5.0) is decoded here; other packings go through
//! the `grib` crate in [`crate::Grib2Message::unpack_data`].

use crate::Grib2Error;

/// Scaling parameters of a simple-packed field.
#[derive(Debug, Clone, Copy)]
pub struct SimplePacking {
    pub bits_per_value: u8,
    pub reference_value: f32,
    pub binary_scale_factor: i16,
    pub decimal_scale_factor: i16,
}

/// Unpack simple packed GRIB2 data into `num_points` values, NaN where the
/// bitmap marks a point missing.
///
/// value = (R + packed * 2^E) * 10^-D
///
/// With a bitmap the packed stream only holds the present points.
pub fn unpack_simple(
    packed_data: &[u8],
    num_points: usize,
    packing: SimplePacking,
    bitmap: Option<&[u8]>,
) -> Result<Vec<f32>, Grib2Error> {
    let binary_scale = 2.0_f64.powi(packing.binary_scale_factor as i32);
    let decimal_scale = 10.0_f64.powi(-(packing.decimal_scale_factor as i32));
    let reference = packing.reference_value as f64;
    let bits = packing.bits_per_value as usize;

    if bits > 32 {
        return Err(Grib2Error::UnpackingError(format!(
            "Invalid number of bits per value: {}",
            bits
        )));
    }

    let mut reader = BitReader::new(packed_data);
    let mut values = Vec::with_capacity(num_points);

    for i in 0..num_points {
        if let Some(bm) = bitmap {
            let byte = bm.get(i / 8).copied().ok_or_else(|| {
                Grib2Error::UnpackingError(format!("Bitmap too short for {} points", num_points))
            })?;
            if (byte >> (7 - (i % 8))) & 1 == 0 {
                values.push(f32::NAN);
                continue;
            }
        }

        let packed = if bits == 0 {
            0
        } else {
            reader.read(bits).ok_or_else(|| {
                Grib2Error::UnpackingError(format!(
                    "Packed data exhausted at point {} of {}",
                    i, num_points
                ))
            })?
        };

        values.push(((reference + packed as f64 * binary_scale) * decimal_scale) as f32);
    }

    Ok(values)
}

/// MSB-first bit reader over a byte slice.
struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn read(&mut self, num_bits: usize) -> Option<u32> {
        if self.position + num_bits > self.data.len() * 8 {
            return None;
        }
        let mut result = 0u64;
        let mut remaining = num_bits;
        while remaining > 0 {
            let byte = self.data[self.position / 8] as u64;
            let offset = self.position % 8;
            let take = (8 - offset).min(remaining);
            let chunk = (byte >> (8 - offset - take)) & ((1u64 << take) - 1);
            result = (result << take) | chunk;
            self.position += take;
            remaining -= take;
        }
        Some(result as u32)
    }
}
