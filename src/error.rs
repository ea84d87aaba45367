use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Could not start upload: {0}")]
    Authorization(String),

    #[error("Transfer failed{}: {message}", .status.map(|s| format!(" with status {}", s)).unwrap_or_default())]
    Transfer { status: Option<u16>, message: String },

    #[error("Upload URL expired at {expired_at}")]
    ExpiredAuthorization { expired_at: DateTime<Utc> },

    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    #[error("A file named '{0}' is already staged")]
    DuplicateFileName(String),

    #[error("Only one file can be staged at a time, '{0}' was skipped")]
    SingleFileMode(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl UploadError {
    /// Expired authorizations are reported as a kind of transfer failure.
    pub fn is_transfer_error(&self) -> bool {
        matches!(
            self,
            UploadError::Transfer { .. } | UploadError::ExpiredAuthorization { .. }
        )
    }

    /// HTTP status returned by the storage endpoint, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::Transfer { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<std::io::Error> for UploadError {
    fn from(err: std::io::Error) -> Self {
        UploadError::Io(err.to_string())
    }
}

impl From<validator::ValidationErrors> for UploadError {
    fn from(err: validator::ValidationErrors) -> Self {
        UploadError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, UploadError>;
