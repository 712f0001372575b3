use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Page fetch or per-item update failure reported by the content host.
    #[error("Content host failure: {0}")]
    HostFailure(String),

    #[error(
        "Stale write for scan {scan_id}: expected revision {expected}, found {found}"
    )]
    StaleWrite {
        scan_id: String,
        expected: u64,
        found: u64,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// Errors the batch runner treats as transient host trouble rather than
    /// a broken scan record.
    pub fn is_host_failure(&self) -> bool {
        matches!(self, ScanError::HostFailure(_))
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for ScanError {
    fn from(err: sqlx::Error) -> Self {
        ScanError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
