//! Catalog and download settings.
//!
//! Both sections live in the pipeline's YAML file (`config/msm.yaml`); other
//! sections of that file are ignored here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::DownloadError;

/// Acquisition settings as read from the `catalog` and `download` sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloaderConfig {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub download: DownloadSettings,
}

impl DownloaderConfig {
    pub fn from_yaml(text: &str) -> Result<Self, DownloadError> {
        let config: Self = serde_yaml::from_str(text)
            .map_err(|e| DownloadError::Config(format!("invalid YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, DownloadError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DownloadError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<(), DownloadError> {
        self.catalog.validate()?;
        self.download.validate()
    }
}

/// Remote archive layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Root of the `YYYY/MM/DD/` tree, with trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// File name pattern; the first capture group is the 14-digit issue time
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,
    /// Number of newest day directories scanned
    #[serde(default = "default_lookback_days")]
    pub lookback_days: usize,
}

fn default_base_url() -> String {
    "https://database.rish.kyoto-u.ac.jp/arch/jmadata/data/gpv/original/".to_string()
}

fn default_file_pattern() -> String {
    r"Z__C_RJTD_(\d{14})_MSM_GPV_Rjp_Lsurf_FH\d{2}-\d{2}_grib2\.bin".to_string()
}

fn default_lookback_days() -> usize {
    1
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            file_pattern: default_file_pattern(),
            lookback_days: default_lookback_days(),
        }
    }
}

impl CatalogConfig {
    /// The file pattern anchored to whole file names.
    pub fn file_regex(&self) -> Result<Regex, DownloadError> {
        let re = Regex::new(&format!("^(?:{})$", self.file_pattern))
            .map_err(|e| DownloadError::Config(format!("file_pattern: {}", e)))?;
        if re.captures_len() < 2 {
            return Err(DownloadError::Config(
                "file_pattern needs a capture group for the issue time".to_string(),
            ));
        }
        Ok(re)
    }

    fn validate(&self) -> Result<(), DownloadError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(DownloadError::Config(format!(
                "base_url '{}' is not an HTTP(S) URL",
                self.base_url
            )));
        }
        if self.lookback_days == 0 {
            return Err(DownloadError::Config("lookback_days must be at least 1".to_string()));
        }
        self.file_regex().map(|_| ())
    }

    /// Base URL with a guaranteed trailing slash.
    pub fn root(&self) -> String {
        if self.base_url.ends_with('/') {
            self.base_url.clone()
        } else {
            format!("{}/", self.base_url)
        }
    }
}

/// Local storage, retention and retry behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadSettings {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
    /// Runs issued longer ago than this are pruned, except the newest
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u32,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_retry_delay_secs")]
    pub initial_retry_delay_secs: u64,
    #[serde(default = "default_max_retry_delay_secs")]
    pub max_retry_delay_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/gpv")
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/gpv/ledger.json")
}

fn default_retention_hours() -> u32 {
    24
}

fn default_max_concurrent() -> usize {
    2
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_retry_delay_secs() -> u64 {
    2
}

fn default_max_retry_delay_secs() -> u64 {
    120
}

fn default_request_timeout_secs() -> u64 {
    600
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ledger_path: default_ledger_path(),
            retention_hours: default_retention_hours(),
            max_concurrent: default_max_concurrent(),
            max_retries: default_max_retries(),
            initial_retry_delay_secs: default_initial_retry_delay_secs(),
            max_retry_delay_secs: default_max_retry_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl DownloadSettings {
    fn validate(&self) -> Result<(), DownloadError> {
        if self.max_concurrent == 0 {
            return Err(DownloadError::Config("max_concurrent must be at least 1".to_string()));
        }
        if self.initial_retry_delay_secs > self.max_retry_delay_secs {
            return Err(DownloadError::Config(
                "initial_retry_delay_secs exceeds max_retry_delay_secs".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours as i64)
    }

    pub fn initial_retry_delay(&self) -> Duration {
        Duration::from_secs(self.initial_retry_delay_secs)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_secs(self.max_retry_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
