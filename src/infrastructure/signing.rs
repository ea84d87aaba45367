use crate::config::{SigningConfig, UploaderConfig};
use crate::error::Result;
use crate::services::authorization::S3PresignAuthorizer;
use crate::services::orchestrator::UploadOrchestrator;
use crate::services::transfer::HttpTransport;
use aws_sdk_s3::config::{Credentials, Region};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub async fn setup_authorizer(
    signing: &SigningConfig,
    uploader: &UploaderConfig,
) -> Arc<S3PresignAuthorizer> {
    match &signing.endpoint {
        Some(endpoint) => info!("☁️  Signing for {} (Bucket: {})", endpoint, signing.bucket),
        None => info!(
            "☁️  Signing for S3 {} (Bucket: {})",
            signing.region, signing.bucket
        ),
    }

    let mut loader = aws_config::from_env().region(Region::new(signing.region.clone()));
    if let Some(endpoint) = &signing.endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    if let (Some(access_key), Some(secret_key)) =
        (&signing.access_key_id, &signing.secret_access_key)
    {
        loader = loader.credentials_provider(Credentials::new(
            access_key.clone(),
            secret_key.clone(),
            None,
            None,
            "static",
        ));
    }
    let aws_config = loader.load().await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(signing.force_path_style)
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);
    Arc::new(S3PresignAuthorizer::new(
        s3_client,
        signing.bucket.clone(),
        uploader.content_type.clone(),
        Duration::from_secs(uploader.authorization_expiry_seconds),
    ))
}

/// Wires an orchestrator to S3 presigning and plain HTTP PUT transfers
pub async fn setup_orchestrator(
    signing: &SigningConfig,
    uploader: UploaderConfig,
) -> Result<UploadOrchestrator> {
    uploader.check()?;
    let authorizer = setup_authorizer(signing, &uploader).await;
    let transport = Arc::new(HttpTransport::new(uploader.transfer_chunk_size)?);
    UploadOrchestrator::new(uploader, authorizer, transport)
}
