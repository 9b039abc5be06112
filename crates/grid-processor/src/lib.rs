//! Grid processing for the MSM pipeline.
//!
//! - [`derive`]: turn decoded raw fields into display variables
//! - [`sampling`]: read values at geographic points

pub mod derive;
pub mod sampling;
pub mod transform;

pub use derive::{derive, derive_all};
pub use sampling::{bilinear_interpolate, nearest_interpolate, sample, SamplingMethod};
