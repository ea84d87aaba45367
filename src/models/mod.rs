use crate::error::{Result, UploadError};
use crate::utils::validation::validate_file_name;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A local file staged for upload. Cloning shares the underlying bytes.
#[derive(Debug, Clone)]
pub struct FileHandle {
    name: String,
    bytes: Bytes,
}

impl FileHandle {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Result<Self> {
        let name = name.into();
        validate_file_name(&name)?;
        Ok(Self {
            name,
            bytes: bytes.into(),
        })
    }

    /// Reads a local file, naming the handle after the last path component
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| UploadError::InvalidFileName(path.display().to_string()))?;
        let bytes = tokio::fs::read(path).await?;
        Self::new(name, bytes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    pub(crate) fn renamed(&self, name: String) -> Self {
        Self {
            name,
            bytes: self.bytes.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    /// Admitted, waiting for the signed URL
    Pending,
    /// Bytes are being sent
    InFlight,
    Completed,
    Cancelled,
    Failed,
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadState::Completed | UploadState::Cancelled | UploadState::Failed
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, UploadState::Pending | UploadState::InFlight)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The signing service could not be reached or refused the key
    Authorization,
    /// Network error or non-success response from storage
    Transfer,
    /// The signed URL lapsed before the transfer started
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFailure {
    pub kind: FailureKind,
    pub status: Option<u16>,
    pub message: String,
}

impl From<&UploadError> for UploadFailure {
    fn from(err: &UploadError) -> Self {
        let kind = match err {
            UploadError::ExpiredAuthorization { .. } => FailureKind::Expired,
            e if e.is_transfer_error() => FailureKind::Transfer,
            _ => FailureKind::Authorization,
        };
        Self {
            kind,
            status: err.status(),
            message: err.to_string(),
        }
    }
}

/// Read-only view of one staged file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub file_name: String,
    pub destination_key: String,
    pub size: u64,
    /// Percent sent, 0 to 100
    pub progress: f64,
    pub state: UploadState,
    pub failure: Option<UploadFailure>,
}

impl UploadRecord {
    pub(crate) fn pending(file_name: String, destination_key: String, size: u64) -> Self {
        Self {
            file_name,
            destination_key,
            size,
            progress: 0.0,
            state: UploadState::Pending,
            failure: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == UploadState::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.state == UploadState::Failed
    }
}

/// Everything a presentation layer needs to render the staged files
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadView {
    /// Bumped on every change
    pub revision: u64,
    pub records: Vec<UploadRecord>,
    pub completed_paths: BTreeMap<String, String>,
}

impl UploadView {
    pub fn record(&self, file_name: &str) -> Option<&UploadRecord> {
        self.records.iter().find(|r| r.file_name == file_name)
    }
}
