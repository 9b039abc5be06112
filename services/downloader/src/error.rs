use msm_common::PipelineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Failed to read ledger {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to write ledger {path}: {reason}")]
    Write { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Catalog unreachable: {0}")]
    CatalogUnreachable(String),

    #[error("HTTP error for {url}: {reason}")]
    Http { url: String, reason: String },

    #[error("Download size mismatch for {url}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        url: String,
        expected: u64,
        actual: u64,
    },

    #[error("Download failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LedgerError> for PipelineError {
    fn from(e: LedgerError) -> Self {
        PipelineError::Ledger(e.to_string())
    }
}

impl From<DownloadError> for PipelineError {
    fn from(e: DownloadError) -> Self {
        match e {
            DownloadError::CatalogUnreachable(reason) => PipelineError::CatalogUnreachable(reason),
            DownloadError::Config(reason) => PipelineError::Config(reason),
            DownloadError::Ledger(e) => e.into(),
            DownloadError::Io(e) => PipelineError::Io(e),
            other => PipelineError::FetchFailed {
                run_id: String::new(),
                reason: other.to_string(),
            },
        }
    }
}
