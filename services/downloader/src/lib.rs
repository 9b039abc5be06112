//! MSM GPV acquisition.
//!
//! Lists the runs published in the remote archive, fetches the ones the
//! [`Ledger`] does not hold in their current version, and prunes runs past
//! the retention horizon.

pub mod acquire;
pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod ledger;

pub use acquire::{acquire, run_dir, to_fetch, AcquisitionReport};
pub use catalog::{Catalog, HttpCatalog, RunDescriptor, RunPart};
pub use config::{CatalogConfig, DownloadSettings, DownloaderConfig};
pub use download::{DownloadConfig, DownloadManager, RunFetcher};
pub use error::{DownloadError, LedgerError};
pub use ledger::{Ledger, LedgerEntry, RecordOutcome};
