use crate::error::{Result, UploadError};
use serde::{Deserialize, Serialize};
use std::env;
use validator::{Validate, ValidationError};

/// What to do when a staged file has the same name as one already tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Refuse the second file
    #[default]
    Reject,
    /// Admit the second file as `name (1).ext`, `name (2).ext`, ...
    AutoSuffix,
}

impl DuplicatePolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "reject" => Some(DuplicatePolicy::Reject),
            "auto_suffix" | "auto-suffix" | "suffix" => Some(DuplicatePolicy::AutoSuffix),
            _ => None,
        }
    }
}

/// Per-orchestrator upload configuration
#[derive(Debug, Clone, Validate)]
pub struct UploaderConfig {
    /// Allow more than one staged file (default: false)
    pub multiple: bool,

    /// Key namespace for uploaded objects (default: "uploads")
    pub destination_path_prefix: String,

    /// Content type signed into the URL and sent with the PUT (default: "text/plain")
    #[validate(custom(function = "validate_content_type"))]
    pub content_type: String,

    /// Lifetime of a signed upload URL in seconds (default: 60)
    #[validate(range(min = 1, max = 604800, message = "URL expiry must be between 1 second and 7 days"))]
    pub authorization_expiry_seconds: u64,

    /// Name collision handling in multiple mode (default: reject)
    pub duplicate_policy: DuplicatePolicy,

    /// Size of the body chunks progress is reported on (default: 64 KB)
    #[validate(range(min = 1, message = "Chunk size must be positive"))]
    pub transfer_chunk_size: usize,
}

fn validate_content_type(value: &str) -> std::result::Result<(), ValidationError> {
    value
        .parse::<mime::Mime>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("invalid_content_type"))
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            multiple: false,
            destination_path_prefix: "uploads".to_string(),
            content_type: mime::TEXT_PLAIN.to_string(),
            authorization_expiry_seconds: 60,
            duplicate_policy: DuplicatePolicy::Reject,
            transfer_chunk_size: 64 * 1024, // 64 KB
        }
    }
}

impl UploaderConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            multiple: env::var("UPLOAD_MULTIPLE")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.multiple),

            destination_path_prefix: env::var("UPLOAD_PATH_PREFIX")
                .unwrap_or(default.destination_path_prefix),

            content_type: env::var("UPLOAD_CONTENT_TYPE").unwrap_or(default.content_type),

            authorization_expiry_seconds: env::var("UPLOAD_URL_EXPIRY_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.authorization_expiry_seconds),

            duplicate_policy: env::var("UPLOAD_DUPLICATE_POLICY")
                .ok()
                .and_then(|v| DuplicatePolicy::parse(&v))
                .unwrap_or(default.duplicate_policy),

            transfer_chunk_size: env::var("UPLOAD_CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.transfer_chunk_size),
        }
    }

    /// Multiple-file staging with auto-suffixed duplicates
    pub fn development() -> Self {
        Self {
            multiple: true,
            duplicate_policy: DuplicatePolicy::AutoSuffix,
            ..Self::default()
        }
    }

    pub fn with_multiple(mut self, multiple: bool) -> Self {
        self.multiple = multiple;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.destination_path_prefix = prefix.into();
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Checks every field, mapping failures to [`UploadError::Config`]
    pub fn check(&self) -> Result<()> {
        self.validate().map_err(UploadError::from)
    }
}

/// Connection settings for the signing service (the S3 bucket owner)
#[derive(Debug, Clone)]
pub struct SigningConfig {
    pub bucket: String,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Custom endpoint for S3-compatible stores (MinIO, R2, ...)
    pub endpoint: Option<String>,
    pub force_path_style: bool,
}

impl SigningConfig {
    /// Reads BUCKET_NAME, BUCKET_REGION, AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY,
    /// S3_ENDPOINT and S3_FORCE_PATH_STYLE
    pub fn from_env() -> Result<Self> {
        let bucket = env::var("BUCKET_NAME")
            .map_err(|_| UploadError::Config("BUCKET_NAME must be set".to_string()))?;

        Ok(Self {
            bucket,
            region: env::var("BUCKET_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            access_key_id: env::var("AWS_ACCESS_KEY_ID").ok(),
            secret_access_key: env::var("AWS_SECRET_ACCESS_KEY").ok(),
            endpoint: env::var("S3_ENDPOINT").ok(),
            force_path_style: env::var("S3_FORCE_PATH_STYLE")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),
        })
    }
}
