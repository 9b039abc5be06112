//! GRIB2 parameter and level lookup tables.
//!
//! Translates numeric GRIB2 codes into the short names used as field keys
//! (TMP, PRMSL, ...) and readable level descriptions.

use std::collections::HashMap;

/// Lookup key for parameter: (discipline, category, number)
pub type ParamKey = (u8, u8, u8);

/// Level description - either static text or a template with {value} placeholder
#[derive(Debug, Clone)]
pub enum LevelDescription {
    Static(String),
    Template(String),
}

impl LevelDescription {
    /// Format the description. `{value}` is replaced by the level value and
    /// `{value_hpa}` by the value converted from Pa to hPa.
    pub fn format(&self, value: f64) -> String {
        match self {
            LevelDescription::Static(s) => s.clone(),
            LevelDescription::Template(t) => t
                .replace("{value}", &format_level(value))
                .replace("{value_hpa}", &format_level(value / 100.0)),
        }
    }
}

fn format_level(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// GRIB2 parameter and level lookup tables.
#[derive(Debug, Clone, Default)]
pub struct Grib2Tables {
    parameters: HashMap<ParamKey, String>,
    levels: HashMap<u8, LevelDescription>,
}

impl Grib2Tables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables covering the JMA MSM surface product.
    ///
    /// JMA encodes the accumulated precipitation of the surface file as
    /// 0/1/52 with statistical processing; it is exposed as APCP like the
    /// standard 0/1/8 code.
    pub fn msm() -> Self {
        let mut tables = Self::new();
        for (category, number, name) in [
            (0, 0, "TMP"),
            (1, 1, "RH"),
            (1, 8, "APCP"),
            (1, 52, "APCP"),
            (2, 2, "UGRD"),
            (2, 3, "VGRD"),
            (3, 0, "PRES"),
            (3, 1, "PRMSL"),
            (4, 7, "DSWRF"),
            (6, 1, "TCDC"),
            (6, 3, "LCDC"),
            (6, 4, "MCDC"),
            (6, 5, "HCDC"),
        ] {
            tables.add_parameter(0, category, number, name.to_string());
        }

        tables.add_level(1, LevelDescription::Static("surface".to_string()));
        tables.add_level(101, LevelDescription::Static("mean sea level".to_string()));
        tables.add_level(100, LevelDescription::Template("{value_hpa} hPa".to_string()));
        tables.add_level(
            103,
            LevelDescription::Template("{value} m above ground".to_string()),
        );
        tables.add_level(10, LevelDescription::Static("entire atmosphere".to_string()));
        tables
    }

    pub fn add_parameter(&mut self, discipline: u8, category: u8, number: u8, name: String) {
        self.parameters.insert((discipline, category, number), name);
    }

    pub fn add_level(&mut self, level_type: u8, description: LevelDescription) {
        self.levels.insert(level_type, description);
    }

    /// Look up parameter short name by GRIB2 codes.
    ///
    /// Returns "P{discipline}_{category}_{number}" if not found.
    pub fn get_parameter_name(&self, discipline: u8, category: u8, number: u8) -> String {
        self.parameters
            .get(&(discipline, category, number))
            .cloned()
            .unwrap_or_else(|| format!("P{}_{}_{}", discipline, category, number))
    }

    /// Look up level description by type code and value.
    pub fn get_level_description(&self, level_type: u8, level_value: f64) -> String {
        match self.levels.get(&level_type) {
            Some(desc) => desc.format(level_value),
            None => format!("Level type {} value {}", level_type, format_level(level_value)),
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.levels.is_empty()
    }
}
