//! GRIB2 parser (WMO FM 92 GRIB Edition 2) and MSM run decoder.
//!
//! [`Grib2Reader`] walks the messages of a file and yields one
//! [`Grib2Message`] per field. [`decode`] turns the files of a forecast run
//! into a [`msm_common::ForecastRun`].

pub mod decoder;
pub mod sections;
pub mod tables;
pub mod unpacking;

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

pub use decoder::{decode, DecodeConfig};
pub use sections::{
    DataRepresentation, GridDefinition, Identification, Indicator, ProductDefinition,
    StatisticalProcess,
};
pub use tables::{Grib2Tables, LevelDescription};
pub use unpacking::{unpack_simple, SimplePacking};

#[derive(Debug, Error)]
pub enum Grib2Error {
    /// The byte stream is not a well-formed sequence of GRIB2 messages
    #[error("Invalid GRIB2 format: {0}")]
    InvalidFormat(String),

    #[error("Invalid section {section}: {reason}")]
    InvalidSection { section: u8, reason: String },

    #[error("Unpacking failed: {0}")]
    UnpackingError(String),

    #[error("Unsupported: {0}")]
    UnsupportedTemplate(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Grib2Error {
    /// Structural errors leave the rest of the stream unreadable.
    pub fn is_structural(&self) -> bool {
        matches!(self, Grib2Error::InvalidFormat(_) | Grib2Error::Io(_))
    }
}

/// One field of a GRIB2 message with the sections that describe it.
#[derive(Debug, Clone)]
pub struct Grib2Message {
    pub discipline: u8,
    pub identification: Identification,
    pub grid_definition: GridDefinition,
    pub product_definition: ProductDefinition,
    pub data_representation: DataRepresentation,
    /// Bitmap bytes when section 6 carries (or reuses) one
    pub bitmap: Option<Bytes>,
    pub data: Bytes,
    /// Whole enclosing message, needed by the fallback unpacker
    raw: Bytes,
    /// Position of this field inside its message
    field_index: usize,
}

impl Grib2Message {
    pub fn parameter(&self) -> &str {
        &self.product_definition.parameter_short_name
    }

    /// Decode the field values in GRIB scanning order. Missing points are NaN.
    pub fn unpack_data(&self) -> Result<Vec<f32>, Grib2Error> {
        let grid = &self.grid_definition;
        let num_points = (grid.ni as usize) * (grid.nj as usize);
        let repr = &self.data_representation;

        let values = if repr.template == 0 {
            unpack_simple(
                &self.data,
                num_points,
                SimplePacking {
                    bits_per_value: repr.bits_per_value,
                    reference_value: repr.reference_value,
                    binary_scale_factor: repr.binary_scale_factor,
                    decimal_scale_factor: repr.decimal_scale_factor,
                },
                self.bitmap.as_deref(),
            )?
        } else {
            self.unpack_with_grib_crate()?
        };

        if values.len() != num_points {
            return Err(Grib2Error::UnpackingError(format!(
                "Expected {} values, decoded {}",
                num_points,
                values.len()
            )));
        }
        Ok(values)
    }

    /// Complex, JPEG2000 and PNG packings are delegated to the `grib` crate.
    fn unpack_with_grib_crate(&self) -> Result<Vec<f32>, Grib2Error> {
        let file = grib::from_reader(Cursor::new(self.raw.to_vec()))
            .map_err(|e| Grib2Error::UnpackingError(format!("grib crate: {}", e)))?;
        let (_, submessage) = file.iter().nth(self.field_index).ok_or_else(|| {
            Grib2Error::UnpackingError(format!("grib crate found no field {}", self.field_index))
        })?;
        let decoder = grib::Grib2SubmessageDecoder::from(submessage)
            .map_err(|e| Grib2Error::UnpackingError(format!("grib crate: {}", e)))?;
        let values = decoder
            .dispatch()
            .map_err(|e| Grib2Error::UnpackingError(format!("grib crate: {}", e)))?;
        Ok(values.collect())
    }
}

/// Sequential reader over the GRIB2 messages in a byte buffer.
pub struct Grib2Reader {
    data: Bytes,
    offset: usize,
    tables: Arc<Grib2Tables>,
    pending: VecDeque<Grib2Message>,
}

impl Grib2Reader {
    pub fn new(data: Bytes, tables: Arc<Grib2Tables>) -> Self {
        Self {
            data,
            offset: 0,
            tables,
            pending: VecDeque::new(),
        }
    }

    /// Next field, or None at end of data.
    ///
    /// After a non-structural error the reader has already moved past the
    /// offending message, so reading can continue.
    pub fn next_message(&mut self) -> Result<Option<Grib2Message>, Grib2Error> {
        if let Some(msg) = self.pending.pop_front() {
            return Ok(Some(msg));
        }

        let start = match find_magic(&self.data[self.offset..]) {
            Some(pos) => self.offset + pos,
            None => {
                self.offset = self.data.len();
                return Ok(None);
            }
        };

        let indicator = match sections::parse_indicator(&self.data[start..]) {
            Ok(ind) => ind,
            Err(e) => {
                self.offset = self.data.len();
                return Err(e);
            }
        };

        let length = indicator.message_length as usize;
        if length < 20 || start + length > self.data.len() {
            self.offset = self.data.len();
            return Err(Grib2Error::InvalidFormat(format!(
                "Message at offset {} claims {} bytes, {} available",
                start,
                length,
                self.data.len() - start
            )));
        }

        let raw = self.data.slice(start..start + length);
        self.offset = start + length;

        self.pending = parse_fields(raw, indicator.discipline, &self.tables)?.into();
        match self.pending.pop_front() {
            Some(msg) => Ok(Some(msg)),
            None => self.next_message(),
        }
    }
}

impl Iterator for Grib2Reader {
    type Item = Result<Grib2Message, Grib2Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_message().transpose()
    }
}

fn find_magic(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"GRIB")
}

/// Split one message into fields; sections 2-7 may repeat after section 1.
fn parse_fields(raw: Bytes, discipline: u8, tables: &Grib2Tables) -> Result<Vec<Grib2Message>, Grib2Error> {
    let sections = sections::split_sections(&raw)?;

    let mut identification = None;
    let mut grid = None;
    let mut product = None;
    let mut repr = None;
    let mut bitmap: Option<Bytes> = None;
    let mut previous_bitmap: Option<Bytes> = None;
    let mut fields = Vec::new();

    for section in sections {
        match section.number {
            1 => identification = Some(sections::parse_identification(section.data)?),
            2 => {}
            3 => grid = Some(sections::parse_grid_definition(section.data)?),
            4 => product = Some(sections::parse_product_definition(section.data, discipline, tables)?),
            5 => repr = Some(sections::parse_data_representation(section.data)?),
            6 => {
                let bm = sections::parse_bitmap(section.data)?;
                bitmap = match bm.indicator {
                    0 => {
                        previous_bitmap = Some(bm.data.clone());
                        Some(bm.data)
                    }
                    254 => Some(previous_bitmap.clone().ok_or_else(|| Grib2Error::InvalidSection {
                        section: 6,
                        reason: "Bitmap reuse without a previous bitmap".to_string(),
                    })?),
                    255 => None,
                    other => {
                        return Err(Grib2Error::UnsupportedTemplate(format!(
                            "predefined bitmap {}",
                            other
                        )))
                    }
                };
            }
            7 => {
                let missing = |section: u8| Grib2Error::InvalidSection {
                    section,
                    reason: "Required section missing before data section".to_string(),
                };
                fields.push(Grib2Message {
                    discipline,
                    identification: identification.clone().ok_or_else(|| missing(1))?,
                    grid_definition: grid.clone().ok_or_else(|| missing(3))?,
                    product_definition: product.clone().ok_or_else(|| missing(4))?,
                    data_representation: repr.clone().ok_or_else(|| missing(5))?,
                    bitmap: bitmap.clone(),
                    data: sections::parse_data_section(section.data)?,
                    raw: raw.clone(),
                    field_index: fields.len(),
                });
            }
            other => {
                return Err(Grib2Error::InvalidSection {
                    section: other,
                    reason: "Unexpected section number".to_string(),
                })
            }
        }
    }

    Ok(fields)
}
