use crate::error::{Result, UploadError};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use chrono::{DateTime, Utc};
use std::time::Duration;
use url::Url;

/// A time-limited URL authorizing one PUT of one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: Url,
    /// The PUT must send exactly this `Content-Type`
    pub content_type: String,
    pub expires_at: DateTime<Utc>,
}

impl SignedUrl {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Obtains signed upload URLs from a signing service
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, destination_key: &str) -> Result<SignedUrl>;
}

/// Presigns S3 `PutObject` requests locally with the bucket owner's credentials
pub struct S3PresignAuthorizer {
    client: Client,
    bucket: String,
    content_type: String,
    expires_in: Duration,
}

impl S3PresignAuthorizer {
    pub fn new(client: Client, bucket: String, content_type: String, expires_in: Duration) -> Self {
        Self {
            client,
            bucket,
            content_type,
            expires_in,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl Authorizer for S3PresignAuthorizer {
    async fn authorize(&self, destination_key: &str) -> Result<SignedUrl> {
        let presigning = PresigningConfig::expires_in(self.expires_in)
            .map_err(|e| UploadError::Authorization(format!("Invalid URL expiry: {}", e)))?;
        let issued_at = Utc::now();

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(destination_key)
            .content_type(&self.content_type)
            .presigned(presigning)
            .await
            .map_err(|e| {
                tracing::error!(
                    "Presigning failed: bucket={}, key={}, error={:?}",
                    self.bucket,
                    destination_key,
                    e
                );
                UploadError::Authorization(e.to_string())
            })?;

        let url = Url::parse(request.uri())
            .map_err(|e| UploadError::Authorization(format!("Signed URL is invalid: {}", e)))?;
        let expires_at = issued_at
            + chrono::Duration::from_std(self.expires_in)
                .map_err(|e| UploadError::Authorization(e.to_string()))?;

        tracing::debug!("🔏 Signed PUT for {} (expires {})", destination_key, expires_at);

        Ok(SignedUrl {
            url,
            content_type: self.content_type.clone(),
            expires_at,
        })
    }
}
