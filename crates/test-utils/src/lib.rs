//! Shared test utilities for the MSM forecast workspace.
//!
//! - [`grib2`]: synthetic GRIB2 messages and whole runs
//! - [`fixtures`]: archive directory listings
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { workspace = true }
//! ```

pub mod fixtures;
pub mod grib2;

pub use fixtures::*;
pub use grib2::{build_multi_field, temp_msm_run, write_msm_run, Grib2Builder, MsmRunSpec};

/// Macro for approximate floating-point equality assertions.
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}
