//! Synthetic GRIB2 data.
//!
//! Messages have valid structure (sections 0-8, template 3.0 grid, template
//! 4.0 or 4.8 product, template 5.0 simple packing) so they exercise the real
//! parser. NaN values are written as missing points through a bitmap.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Build a single-field GRIB2 message.
#[derive(Debug, Clone)]
pub struct Grib2Builder {
    discipline: u8,
    center: u16,
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    // Grid definition, angles in microdegrees
    ni: u32,
    nj: u32,
    la1: i64,
    lo1: i64,
    la2: i64,
    lo2: i64,
    di: u32,
    dj: u32,
    scanning_mode: u8,
    // Product definition
    param_category: u8,
    param_number: u8,
    level_type: u8,
    level_scale: u8,
    level_value: u32,
    forecast_hour: u32,
    /// Template 4.8 accumulation length in hours
    accumulation_hours: Option<u32>,
    data_values: Vec<f32>,
}

impl Grib2Builder {
    /// 1.5 m temperature on a small grid over Kanto, issued 2025-11-27 15 UTC.
    pub fn new_msm() -> Self {
        let ni = 8;
        let nj = 6;
        Self {
            discipline: 0,
            center: 34, // JMA
            year: 2025,
            month: 11,
            day: 27,
            hour: 15,
            ni,
            nj,
            la1: 37_000_000,
            lo1: 138_000_000,
            la2: 34_500_000,
            lo2: 141_500_000,
            di: 500_000,
            dj: 500_000,
            scanning_mode: 0b0000_0000, // +i, -j, i consecutive
            param_category: 0,
            param_number: 0,
            level_type: 103,
            level_scale: 1,
            level_value: 15, // 1.5 m
            forecast_hour: 0,
            accumulation_hours: None,
            data_values: vec![288.15; (ni * nj) as usize],
        }
    }

    pub fn with_reference_time(mut self, year: u16, month: u8, day: u8, hour: u8) -> Self {
        self.year = year;
        self.month = month;
        self.day = day;
        self.hour = hour;
        self
    }

    /// Grid of `ni` x `nj` points starting at (`north`, `west`) with
    /// `step` degree spacing in both directions.
    pub fn with_grid(mut self, ni: u32, nj: u32, north: f64, west: f64, step: f64) -> Self {
        let micro = |deg: f64| (deg * 1e6).round() as i64;
        self.ni = ni;
        self.nj = nj;
        self.la1 = micro(north);
        self.lo1 = micro(west);
        self.la2 = micro(north - step * (nj as f64 - 1.0));
        self.lo2 = micro(west + step * (ni as f64 - 1.0));
        self.di = micro(step) as u32;
        self.dj = micro(step) as u32;
        self.data_values = vec![0.0; (ni * nj) as usize];
        self
    }

    /// Store rows south to north (scanning mode bit 2) with `data` given
    /// north to south; the builder reverses the rows.
    pub fn with_south_to_north_rows(mut self) -> Self {
        self.scanning_mode |= 0b0100_0000;
        std::mem::swap(&mut self.la1, &mut self.la2);
        self
    }

    pub fn with_parameter(mut self, category: u8, number: u8) -> Self {
        self.param_category = category;
        self.param_number = number;
        self
    }

    pub fn with_level(mut self, level_type: u8, scale: u8, value: u32) -> Self {
        self.level_type = level_type;
        self.level_scale = scale;
        self.level_value = value;
        self
    }

    pub fn with_forecast_hour(mut self, hour: u32) -> Self {
        self.forecast_hour = hour;
        self
    }

    /// Accumulation over [start, start + hours] using product template 4.8.
    pub fn with_accumulation(mut self, start: u32, hours: u32) -> Self {
        self.forecast_hour = start;
        self.accumulation_hours = Some(hours);
        self
    }

    pub fn with_constant_value(mut self, value: f32) -> Self {
        self.data_values = vec![value; (self.ni * self.nj) as usize];
        self
    }

    pub fn with_gradient(mut self, min_val: f32, max_val: f32) -> Self {
        let n = (self.ni * self.nj) as usize;
        self.data_values = (0..n)
            .map(|i| min_val + (max_val - min_val) * (i as f32 / n as f32))
            .collect();
        self
    }

    /// Values in north-to-south, west-to-east order.
    pub fn with_data(mut self, data: Vec<f32>) -> Self {
        self.data_values = data;
        self
    }

    /// Build the complete GRIB2 message bytes
    pub fn build(&self) -> Vec<u8> {
        build_multi_field(std::slice::from_ref(self))
    }

    fn section1(&self) -> Vec<u8> {
        let mut s = Vec::new();
        s.extend_from_slice(&21u32.to_be_bytes());
        s.push(1);
        s.extend_from_slice(&self.center.to_be_bytes());
        s.extend_from_slice(&0u16.to_be_bytes()); // sub-centre
        s.push(4); // master table version
        s.push(1); // local table version
        s.push(1); // start of forecast
        s.extend_from_slice(&self.year.to_be_bytes());
        s.extend_from_slice(&[self.month, self.day, self.hour, 0, 0]);
        s.push(0); // operational
        s.push(1); // forecast
        s
    }

    fn section3(&self) -> Vec<u8> {
        let mut s = Vec::new();
        s.extend_from_slice(&72u32.to_be_bytes());
        s.push(3);
        s.push(0); // source of grid definition
        s.extend_from_slice(&(self.ni * self.nj).to_be_bytes());
        s.push(0);
        s.push(0);
        s.extend_from_slice(&0u16.to_be_bytes()); // template 3.0

        s.push(4); // shape of the earth: GRS80
        s.push(0);
        s.extend_from_slice(&0u32.to_be_bytes());
        s.push(0);
        s.extend_from_slice(&0u32.to_be_bytes());
        s.push(0);
        s.extend_from_slice(&0u32.to_be_bytes());

        s.extend_from_slice(&self.ni.to_be_bytes());
        s.extend_from_slice(&self.nj.to_be_bytes());
        s.extend_from_slice(&0u32.to_be_bytes()); // basic angle
        s.extend_from_slice(&0xFFFF_FFFFu32.to_be_bytes()); // subdivisions

        s.extend_from_slice(&sign_magnitude32(self.la1));
        s.extend_from_slice(&sign_magnitude32(self.lo1));
        s.push(48); // resolution and component flags
        s.extend_from_slice(&sign_magnitude32(self.la2));
        s.extend_from_slice(&sign_magnitude32(self.lo2));
        s.extend_from_slice(&self.di.to_be_bytes());
        s.extend_from_slice(&self.dj.to_be_bytes());
        s.push(self.scanning_mode);
        s
    }

    fn section4(&self) -> Vec<u8> {
        let mut s = Vec::new();
        let template: u16 = if self.accumulation_hours.is_some() { 8 } else { 0 };
        let length: u32 = if template == 8 { 58 } else { 34 };
        s.extend_from_slice(&length.to_be_bytes());
        s.push(4);
        s.extend_from_slice(&0u16.to_be_bytes()); // coordinate values
        s.extend_from_slice(&template.to_be_bytes());

        s.push(self.param_category);
        s.push(self.param_number);
        s.push(2); // forecast
        s.push(0);
        s.push(0);
        s.extend_from_slice(&0u16.to_be_bytes());
        s.push(0);
        s.push(1); // hours
        s.extend_from_slice(&self.forecast_hour.to_be_bytes());

        s.push(self.level_type);
        s.push(self.level_scale);
        s.extend_from_slice(&self.level_value.to_be_bytes());
        s.push(255);
        s.push(0);
        s.extend_from_slice(&0u32.to_be_bytes());

        if let Some(hours) = self.accumulation_hours {
            let end = self.forecast_hour + hours;
            let end_hour = self.hour as u32 + end;
            // end of overall interval; day rollover is irrelevant to the parser
            s.extend_from_slice(&self.year.to_be_bytes());
            s.extend_from_slice(&[self.month, self.day, (end_hour % 24) as u8, 0, 0]);
            s.push(1); // one time range
            s.extend_from_slice(&0u32.to_be_bytes()); // missing values
            s.push(1); // accumulation
            s.push(2); // successive times, same start
            s.push(1); // hours
            s.extend_from_slice(&hours.to_be_bytes());
            s.push(255);
            s.extend_from_slice(&0u32.to_be_bytes());
        }
        s
    }

    /// Rows in GRIB scanning order.
    fn scan_ordered(&self) -> Vec<f32> {
        if self.scanning_mode & 0b0100_0000 == 0 {
            return self.data_values.clone();
        }
        let ni = self.ni as usize;
        self.data_values
            .chunks(ni)
            .rev()
            .flat_map(|row| row.iter().copied())
            .collect()
    }

    fn sections_5_to_7(&self) -> Vec<u8> {
        let values = self.scan_ordered();
        let present: Vec<f32> = values.iter().copied().filter(|v| !v.is_nan()).collect();

        let (min_val, max_val) = present.iter().fold(
            (f32::INFINITY, f32::NEG_INFINITY),
            |(min, max), &v| (min.min(v), max.max(v)),
        );
        let (reference, range) = if present.is_empty() {
            (0.0, 0.0)
        } else {
            (min_val, max_val - min_val)
        };
        let bits: u8 = if range == 0.0 { 0 } else { 16 };
        // value = R + packed * 2^E with packed < 2^16
        let binary_scale_factor: i16 = if range == 0.0 {
            0
        } else {
            (range / 65535.0).log2().ceil() as i16
        };

        let mut out = Vec::new();

        // Section 5: template 5.0
        out.extend_from_slice(&21u32.to_be_bytes());
        out.push(5);
        out.extend_from_slice(&(present.len() as u32).to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&reference.to_be_bytes());
        out.extend_from_slice(&sign_magnitude16(binary_scale_factor));
        out.extend_from_slice(&sign_magnitude16(0));
        out.push(bits);
        out.push(0);

        // Section 6
        if present.len() == values.len() {
            out.extend_from_slice(&6u32.to_be_bytes());
            out.push(6);
            out.push(255);
        } else {
            let mut bitmap = vec![0u8; values.len().div_ceil(8)];
            for (i, v) in values.iter().enumerate() {
                if !v.is_nan() {
                    bitmap[i / 8] |= 0x80 >> (i % 8);
                }
            }
            out.extend_from_slice(&(6 + bitmap.len() as u32).to_be_bytes());
            out.push(6);
            out.push(0);
            out.extend_from_slice(&bitmap);
        }

        // Section 7
        let mut packed = Vec::new();
        if bits > 0 {
            let scale = 2.0_f32.powi(binary_scale_factor as i32);
            for v in &present {
                let p = ((v - reference) / scale).round().clamp(0.0, 65535.0) as u16;
                packed.extend_from_slice(&p.to_be_bytes());
            }
        }
        out.extend_from_slice(&(5 + packed.len() as u32).to_be_bytes());
        out.push(7);
        out.extend_from_slice(&packed);
        out
    }
}

/// One message carrying several fields: sections 3-7 repeat for each builder,
/// section 0 and 1 come from the first.
pub fn build_multi_field(builders: &[Grib2Builder]) -> Vec<u8> {
    let first = match builders.first() {
        Some(b) => b,
        None => return Vec::new(),
    };

    let mut body = first.section1();
    for b in builders {
        body.extend_from_slice(&b.section3());
        body.extend_from_slice(&b.section4());
        body.extend_from_slice(&b.sections_5_to_7());
    }

    let total = 16 + body.len() + 4;
    let mut message = Vec::with_capacity(total);
    message.extend_from_slice(b"GRIB");
    message.extend_from_slice(&[0, 0]);
    message.push(first.discipline);
    message.push(2);
    message.extend_from_slice(&(total as u64).to_be_bytes());
    message.extend_from_slice(&body);
    message.extend_from_slice(b"7777");
    message
}

fn sign_magnitude32(value: i64) -> [u8; 4] {
    let magnitude = value.unsigned_abs() as u32 & 0x7FFF_FFFF;
    let raw = if value < 0 { magnitude | 0x8000_0000 } else { magnitude };
    raw.to_be_bytes()
}

fn sign_magnitude16(value: i16) -> [u8; 2] {
    let magnitude = value.unsigned_abs() & 0x7FFF;
    let raw = if value < 0 { magnitude | 0x8000 } else { magnitude };
    raw.to_be_bytes()
}

/// Shape of a synthetic MSM run written by [`write_msm_run`].
#[derive(Debug, Clone)]
pub struct MsmRunSpec {
    pub lead_hours: Vec<u32>,
    pub ni: u32,
    pub nj: u32,
    pub north: f64,
    pub west: f64,
    pub step: f64,
    /// Cumulative precipitation per step (mm), applied to every cell
    pub cumulative_precip: Vec<f32>,
    /// Leave these fields out of the given step index
    pub omit: Vec<(usize, &'static str)>,
    /// Number of files the steps are split across
    pub parts: usize,
}

impl Default for MsmRunSpec {
    fn default() -> Self {
        Self {
            lead_hours: vec![0, 1, 2, 3],
            ni: 12,
            nj: 10,
            north: 40.0,
            west: 135.0,
            step: 0.5,
            cumulative_precip: vec![0.0, 1.0, 3.0, 3.5],
            omit: Vec::new(),
            parts: 2,
        }
    }
}

impl MsmRunSpec {
    fn fields_for(&self, index: usize, lead: u32) -> Vec<Grib2Builder> {
        let base = Grib2Builder::new_msm()
            .with_grid(self.ni, self.nj, self.north, self.west, self.step)
            .with_forecast_hour(lead);
        let t = lead as f32;

        let mut fields = vec![
            ("PRMSL", base.clone().with_parameter(3, 1).with_level(101, 0, 0).with_gradient(100_500.0 + 10.0 * t, 101_800.0)),
            ("TMP", base.clone().with_parameter(0, 0).with_gradient(278.15, 293.15 + t)),
            ("RH", base.clone().with_parameter(1, 1).with_gradient(40.0, 95.0)),
            ("UGRD", base.clone().with_parameter(2, 2).with_level(103, 0, 10).with_constant_value(3.0)),
            ("VGRD", base.clone().with_parameter(2, 3).with_level(103, 0, 10).with_constant_value(4.0)),
            ("LCDC", base.clone().with_parameter(6, 3).with_level(1, 0, 0).with_gradient(0.0, 60.0)),
            ("MCDC", base.clone().with_parameter(6, 4).with_level(1, 0, 0).with_constant_value(30.0)),
            ("HCDC", base.clone().with_parameter(6, 5).with_level(1, 0, 0).with_gradient(80.0, 10.0)),
        ];
        if let Some(precip) = self.cumulative_precip.get(index) {
            // MSM accumulates precipitation from the issue time
            let apcp = base
                .clone()
                .with_parameter(1, 8)
                .with_level(1, 0, 0)
                .with_accumulation(0, lead)
                .with_constant_value(*precip);
            fields.push(("APCP", apcp));
        }

        fields
            .into_iter()
            .filter(|(name, _)| !self.omit.contains(&(index, *name)))
            .map(|(_, b)| b)
            .collect()
    }
}

/// Write a synthetic run into `dir`, one file per part, each message holding
/// one field. Returns the written paths in order.
pub fn write_msm_run(dir: &Path, spec: &MsmRunSpec) -> io::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let parts = spec.parts.max(1);
    let per_part = spec.lead_hours.len().div_ceil(parts).max(1);

    let mut paths = Vec::new();
    for (part, chunk) in spec.lead_hours.chunks(per_part).enumerate() {
        let first_lead = chunk[0];
        let last_lead = chunk[chunk.len() - 1];
        let name = format!(
            "Z__C_RJTD_20251127150000_MSM_GPV_Rjp_Lsurf_FH{:02}-{:02}_grib2.bin",
            first_lead, last_lead
        );
        let mut bytes = Vec::new();
        for (offset, lead) in chunk.iter().enumerate() {
            let index = part * per_part + offset;
            for field in spec.fields_for(index, *lead) {
                bytes.extend_from_slice(&field.build());
            }
        }
        let path = dir.join(name);
        std::fs::write(&path, bytes)?;
        paths.push(path);
    }
    Ok(paths)
}

/// Write a synthetic run into a fresh temporary directory.
pub fn temp_msm_run(spec: &MsmRunSpec) -> io::Result<(TempDir, PathBuf)> {
    let dir = TempDir::new()?;
    let run_dir = dir.path().join("20251127150000");
    write_msm_run(&run_dir, spec)?;
    Ok((dir, run_dir))
}
