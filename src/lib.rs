pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

pub use config::{DuplicatePolicy, SigningConfig, UploaderConfig};
pub use error::{Result, UploadError};
pub use models::{FailureKind, FileHandle, UploadFailure, UploadRecord, UploadState, UploadView};
pub use services::authorization::{Authorizer, S3PresignAuthorizer, SignedUrl};
pub use services::orchestrator::{Admission, UploadOrchestrator};
pub use services::transfer::{HttpTransport, TransferEvent, TransferStream, Transport};
