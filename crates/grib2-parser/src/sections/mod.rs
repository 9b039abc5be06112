//! GRIB2 section parsing.
//!
//! A GRIB2 message is a 16-byte indicator followed by length-prefixed
//! sections and the `7777` end marker. Sections 2-7 may repeat inside one
//! message, each repetition of section 7 closing one field. Every parser
//! here takes the bytes of a single section, starting at its length octets.

use crate::tables::Grib2Tables;
use crate::Grib2Error;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};

/// Section 0: Indicator Section (16 bytes)
#[derive(Debug, Clone)]
pub struct Indicator {
    pub discipline: u8,
    pub edition: u8,
    pub message_length: u64,
}

/// Section 1: Identification Section
#[derive(Debug, Clone)]
pub struct Identification {
    pub center: u16,
    pub sub_center: u16,
    pub table_version: u8,
    pub local_table_version: u8,
    pub significance_of_reference_time: u8,
    pub reference_time: DateTime<Utc>,
    pub production_status: u8,
    pub data_type: u8,
}

/// Section 3: Grid Definition Section (template 3.0, regular lat/lon)
#[derive(Debug, Clone, PartialEq)]
pub struct GridDefinition {
    pub template: u16,
    pub num_data_points: u32,
    /// Points along a parallel
    pub ni: u32,
    /// Points along a meridian
    pub nj: u32,
    pub first_latitude: f64,
    pub first_longitude: f64,
    pub last_latitude: f64,
    pub last_longitude: f64,
    /// i (longitude) direction increment in degrees
    pub di: f64,
    /// j (latitude) direction increment in degrees
    pub dj: f64,
    pub scanning_mode: u8,
}

/// Statistical processing of a template 4.8 product.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticalProcess {
    /// Code table 4.10 (1 = accumulation)
    pub process: u8,
    pub time_range_unit: u8,
    pub time_range_length: u32,
}

/// Section 4: Product Definition Section
#[derive(Debug, Clone)]
pub struct ProductDefinition {
    pub template: u16,
    pub parameter_category: u8,
    pub parameter_number: u8,
    pub parameter_short_name: String,
    pub level_type: u8,
    pub level_value: f64,
    pub level_description: String,
    pub time_unit: u8,
    pub forecast_time: u32,
    pub statistical: Option<StatisticalProcess>,
}

impl ProductDefinition {
    /// Lead time in hours. For statistically processed products this is the
    /// end of the processing interval.
    pub fn lead_hours(&self) -> Result<u32, Grib2Error> {
        let start = hours_from_unit(self.forecast_time, self.time_unit)?;
        match &self.statistical {
            Some(stat) => Ok(start + hours_from_unit(stat.time_range_length, stat.time_range_unit)?),
            None => Ok(start),
        }
    }

    /// Accumulation interval (start, end) in hours, if this is an accumulated product.
    pub fn accumulation_hours(&self) -> Result<Option<(u32, u32)>, Grib2Error> {
        match &self.statistical {
            Some(stat) if stat.process == 1 => {
                let start = hours_from_unit(self.forecast_time, self.time_unit)?;
                Ok(Some((start, self.lead_hours()?)))
            }
            _ => Ok(None),
        }
    }
}

/// Section 5: Data Representation Section
#[derive(Debug, Clone)]
pub struct DataRepresentation {
    pub num_data_points: u32,
    pub template: u16,
    pub reference_value: f32,
    pub binary_scale_factor: i16,
    pub decimal_scale_factor: i16,
    pub bits_per_value: u8,
    pub original_data_type: u8,
}

/// Section 6: Bitmap Section
#[derive(Debug, Clone)]
pub struct Bitmap {
    /// 0 = bitmap follows, 254 = reuse previous bitmap, 255 = none
    pub indicator: u8,
    pub data: Bytes,
}

/// A section located inside a message.
#[derive(Debug, Clone, Copy)]
pub struct SectionRef<'a> {
    pub number: u8,
    pub data: &'a [u8],
}

// ===== Parsing Functions =====

/// Parse Section 0 (Indicator) from start of message
pub fn parse_indicator(data: &[u8]) -> Result<Indicator, Grib2Error> {
    if data.len() < 16 {
        return Err(Grib2Error::InvalidFormat(
            "Not enough data for indicator section".to_string(),
        ));
    }

    if &data[0..4] != b"GRIB" {
        return Err(Grib2Error::InvalidFormat(
            "Invalid GRIB magic bytes".to_string(),
        ));
    }

    // Octets 5-6 reserved, 7 discipline, 8 edition, 9-16 total length
    let discipline = data[6];
    let edition = data[7];
    if edition != 2 {
        return Err(Grib2Error::InvalidFormat(format!(
            "Expected GRIB edition 2, got {}",
            edition
        )));
    }

    let mut length = [0u8; 8];
    length.copy_from_slice(&data[8..16]);

    Ok(Indicator {
        discipline,
        edition,
        message_length: u64::from_be_bytes(length),
    })
}

/// Split a message into its sections, stopping at the `7777` marker.
pub fn split_sections(message: &[u8]) -> Result<Vec<SectionRef<'_>>, Grib2Error> {
    let mut sections = Vec::new();
    let mut offset = 16;

    loop {
        if offset + 4 <= message.len() && &message[offset..offset + 4] == b"7777" {
            return Ok(sections);
        }
        if offset + 5 > message.len() {
            return Err(Grib2Error::InvalidFormat(
                "Message ended before end marker".to_string(),
            ));
        }

        let length = read_u32(message, offset) as usize;
        let number = message[offset + 4];
        if length < 5 || offset + length > message.len() {
            return Err(Grib2Error::InvalidSection {
                section: number,
                reason: format!("Invalid section length {} at offset {}", length, offset),
            });
        }

        sections.push(SectionRef {
            number,
            data: &message[offset..offset + length],
        });
        offset += length;
    }
}

/// Parse Section 1 (Identification)
pub fn parse_identification(section: &[u8]) -> Result<Identification, Grib2Error> {
    if section.len() < 21 {
        return Err(Grib2Error::InvalidSection {
            section: 1,
            reason: "Not enough data".to_string(),
        });
    }

    let s = &section[5..];
    let year = u16::from_be_bytes([s[7], s[8]]);
    let (month, day, hour, minute, second) = (s[9], s[10], s[11], s[12], s[13]);

    let reference_time = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
        .ok_or_else(|| Grib2Error::InvalidSection {
            section: 1,
            reason: format!(
                "Invalid date: {}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            ),
        })?;

    Ok(Identification {
        center: u16::from_be_bytes([s[0], s[1]]),
        sub_center: u16::from_be_bytes([s[2], s[3]]),
        table_version: s[4],
        local_table_version: s[5],
        significance_of_reference_time: s[6],
        reference_time: DateTime::<Utc>::from_naive_utc_and_offset(reference_time, Utc),
        production_status: s.get(14).copied().unwrap_or(0),
        data_type: s.get(15).copied().unwrap_or(0),
    })
}

/// Parse Section 3 (Grid Definition). Only template 3.0 is supported.
pub fn parse_grid_definition(section: &[u8]) -> Result<GridDefinition, Grib2Error> {
    if section.len() < 14 {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: "Not enough data".to_string(),
        });
    }

    // 5 source, 6-9 number of points, 10-11 optional list, 12-13 template
    let num_data_points = read_u32(section, 6);
    let template = u16::from_be_bytes([section[12], section[13]]);
    if template != 0 {
        return Err(Grib2Error::UnsupportedTemplate(format!(
            "grid definition template 3.{}",
            template
        )));
    }

    let gd = &section[14..];
    if gd.len() < 58 {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: format!("Template 3.0 needs at least 58 bytes, got {}", gd.len()),
        });
    }

    // Angles are in units of basic_angle / subdivisions, microdegrees when unset
    let basic_angle = read_u32(gd, 24);
    let subdivisions = read_u32(gd, 28);
    let unit = if basic_angle == 0 || subdivisions == 0 || subdivisions == u32::MAX {
        1e-6
    } else {
        basic_angle as f64 / subdivisions as f64
    };
    let angle = |offset: usize| decode_grib2_signed(&gd[offset..offset + 4]) as f64 * unit;

    let ni = read_u32(gd, 16);
    let nj = read_u32(gd, 20);
    let first_latitude = angle(32);
    let first_longitude = angle(36);
    let last_latitude = angle(41);
    let last_longitude = angle(45);

    // Increments may be flagged missing (all ones); derive them from the corners
    let raw_di = read_u32(gd, 49);
    let raw_dj = read_u32(gd, 53);
    let di = if raw_di == u32::MAX {
        (last_longitude - first_longitude).abs() / ni.saturating_sub(1).max(1) as f64
    } else {
        raw_di as f64 * unit
    };
    let dj = if raw_dj == u32::MAX {
        (last_latitude - first_latitude).abs() / nj.saturating_sub(1).max(1) as f64
    } else {
        raw_dj as f64 * unit
    };

    Ok(GridDefinition {
        template,
        num_data_points,
        ni,
        nj,
        first_latitude,
        first_longitude,
        last_latitude,
        last_longitude,
        di,
        dj,
        scanning_mode: gd[57],
    })
}

/// Parse Section 4 (Product Definition). Templates 4.0 and 4.8 are understood.
pub fn parse_product_definition(
    section: &[u8],
    discipline: u8,
    tables: &Grib2Tables,
) -> Result<ProductDefinition, Grib2Error> {
    if section.len() < 34 {
        return Err(Grib2Error::InvalidSection {
            section: 4,
            reason: "Not enough data".to_string(),
        });
    }

    // 5-6 coordinate values, 7-8 template, 9 category, 10 number,
    // 17 time unit, 18-21 forecast time, 22 level type, 23-27 scaled level
    let template = u16::from_be_bytes([section[7], section[8]]);
    if template != 0 && template != 8 {
        return Err(Grib2Error::UnsupportedTemplate(format!(
            "product definition template 4.{}",
            template
        )));
    }

    let parameter_category = section[9];
    let parameter_number = section[10];
    let time_unit = section[17];
    let forecast_time = read_u32(section, 18);

    let level_type = section[22];
    let scale_factor = match section[23] {
        0xFF => 0,
        b if b & 0x80 != 0 => -((b & 0x7F) as i32),
        b => b as i32,
    };
    let scaled_value = read_u32(section, 24);
    let level_value = if scaled_value == u32::MAX {
        0.0
    } else {
        scaled_value as f64 / 10f64.powi(scale_factor)
    };

    let statistical = if template == 8 {
        // 34-40 end of interval, 41 number of ranges, 42-45 missing count,
        // 46 process, 47 increment type, 48 range unit, 49-52 range length
        if section.len() < 58 {
            return Err(Grib2Error::InvalidSection {
                section: 4,
                reason: format!("Template 4.8 needs at least 58 bytes, got {}", section.len()),
            });
        }
        Some(StatisticalProcess {
            process: section[46],
            time_range_unit: section[48],
            time_range_length: read_u32(section, 49),
        })
    } else {
        None
    };

    Ok(ProductDefinition {
        template,
        parameter_category,
        parameter_number,
        parameter_short_name: tables.get_parameter_name(discipline, parameter_category, parameter_number),
        level_type,
        level_value,
        level_description: tables.get_level_description(level_type, level_value),
        time_unit,
        forecast_time,
        statistical,
    })
}

/// Parse Section 5 (Data Representation)
pub fn parse_data_representation(section: &[u8]) -> Result<DataRepresentation, Grib2Error> {
    if section.len() < 11 {
        return Err(Grib2Error::InvalidSection {
            section: 5,
            reason: "Not enough data".to_string(),
        });
    }

    let num_data_points = read_u32(section, 5);
    let template = u16::from_be_bytes([section[9], section[10]]);

    // Templates 5.0, 5.2, 5.3, 5.40 and 5.41 share the simple packing header
    let t = &section[11..];
    let (reference_value, binary_scale_factor, decimal_scale_factor, bits_per_value, original_data_type) =
        if t.len() >= 10 {
            (
                f32::from_be_bytes([t[0], t[1], t[2], t[3]]),
                decode_grib2_signed16(&t[4..6]),
                decode_grib2_signed16(&t[6..8]),
                t[8],
                t[9],
            )
        } else {
            (0.0, 0, 0, 0, 0)
        };

    Ok(DataRepresentation {
        num_data_points,
        template,
        reference_value,
        binary_scale_factor,
        decimal_scale_factor,
        bits_per_value,
        original_data_type,
    })
}

/// Parse Section 6 (Bitmap)
pub fn parse_bitmap(section: &[u8]) -> Result<Bitmap, Grib2Error> {
    if section.len() < 6 {
        return Err(Grib2Error::InvalidSection {
            section: 6,
            reason: "Not enough data".to_string(),
        });
    }

    Ok(Bitmap {
        indicator: section[5],
        data: Bytes::copy_from_slice(&section[6..]),
    })
}

/// Parse Section 7 (Data), returning the packed payload.
pub fn parse_data_section(section: &[u8]) -> Result<Bytes, Grib2Error> {
    if section.len() < 5 {
        return Err(Grib2Error::InvalidSection {
            section: 7,
            reason: "Not enough data".to_string(),
        });
    }
    Ok(Bytes::copy_from_slice(&section[5..]))
}

// ===== Helper Functions =====

/// Decode a 4-byte GRIB2 sign-magnitude integer (MSB is the sign bit).
///
/// Returns 0 for slices of any other length.
pub fn decode_grib2_signed(bytes: &[u8]) -> i32 {
    if bytes.len() != 4 {
        return 0;
    }
    let raw = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magnitude = (raw & 0x7FFF_FFFF) as i32;
    if raw & 0x8000_0000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Decode a 2-byte GRIB2 sign-magnitude integer.
pub fn decode_grib2_signed16(bytes: &[u8]) -> i16 {
    if bytes.len() != 2 {
        return 0;
    }
    let raw = u16::from_be_bytes([bytes[0], bytes[1]]);
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Convert a count of code table 4.4 time units to whole hours.
fn hours_from_unit(value: u32, unit: u8) -> Result<u32, Grib2Error> {
    let hours = match unit {
        0 => value / 60,
        1 => value,
        2 => value * 24,
        10 => value * 3,
        11 => value * 6,
        12 => value * 12,
        13 => value / 3600,
        other => {
            return Err(Grib2Error::UnsupportedTemplate(format!(
                "time unit code {}",
                other
            )))
        }
    };
    Ok(hours)
}
