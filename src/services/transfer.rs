use crate::error::{Result, UploadError};
use crate::models::FileHandle;
use crate::services::authorization::SignedUrl;
use async_stream::stream;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Body S3 answers with when a presigned URL is used after its expiry
const EXPIRED_REQUEST_MARKER: &str = "Request has expired";

/// One step of a single file transfer. Every transfer ends with exactly one
/// of `Completed`, `Cancelled` or `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// Percent of the body sent so far
    Progress(f64),
    Completed,
    Cancelled,
    Failed(UploadError),
}

impl TransferEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferEvent::Progress(_))
    }
}

pub type TransferStream = BoxStream<'static, TransferEvent>;

/// Sends one file's bytes to its signed URL
pub trait Transport: Send + Sync {
    /// Returns a lazy event stream; nothing is sent until it is polled.
    fn transfer(
        &self,
        file: FileHandle,
        url: SignedUrl,
        cancel: CancellationToken,
    ) -> TransferStream;
}

pub struct HttpTransport {
    client: reqwest::Client,
    chunk_size: usize,
}

impl HttpTransport {
    pub fn new(chunk_size: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| UploadError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, chunk_size))
    }

    pub fn with_client(client: reqwest::Client, chunk_size: usize) -> Self {
        Self {
            client,
            chunk_size: chunk_size.max(1),
        }
    }
}

enum Step {
    Progress(f64),
    Cancelled,
    Response(reqwest::Result<reqwest::Response>),
}

impl Transport for HttpTransport {
    fn transfer(
        &self,
        file: FileHandle,
        url: SignedUrl,
        cancel: CancellationToken,
    ) -> TransferStream {
        let client = self.client.clone();
        let chunk_size = self.chunk_size;

        Box::pin(stream! {
            if cancel.is_cancelled() {
                yield TransferEvent::Cancelled;
                return;
            }
            if url.is_expired() {
                yield TransferEvent::Failed(UploadError::ExpiredAuthorization {
                    expired_at: url.expires_at,
                });
                return;
            }

            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
            let request = client
                .put(url.url.clone())
                .header(CONTENT_TYPE, url.content_type.as_str())
                .header(CONTENT_LENGTH, file.len())
                .body(progress_body(file.bytes(), chunk_size, progress_tx))
                .send();
            tokio::pin!(request);

            let mut last = 0.0;
            let response = loop {
                let step = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Step::Cancelled,
                    Some(value) = progress_rx.recv() => Step::Progress(value),
                    res = &mut request => Step::Response(res),
                };
                match step {
                    Step::Progress(value) => {
                        if value > last {
                            last = value;
                            yield TransferEvent::Progress(value);
                        }
                    }
                    Step::Cancelled => {
                        tracing::debug!("Aborting PUT for {}", file.name());
                        yield TransferEvent::Cancelled;
                        return;
                    }
                    Step::Response(res) => break res,
                }
            };

            match response {
                Ok(resp) if resp.status().is_success() => {
                    yield TransferEvent::Progress(100.0);
                    yield TransferEvent::Completed;
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        text = resp.text() => Some(text.unwrap_or_default()),
                    };
                    match body {
                        Some(body) => {
                            yield TransferEvent::Failed(failure_from_response(status, &body, &url));
                        }
                        None => {
                            tracing::debug!("Abandoned error body for {}", file.name());
                            yield TransferEvent::Cancelled;
                        }
                    }
                }
                Err(e) => {
                    yield TransferEvent::Failed(UploadError::Transfer {
                        status: e.status().map(|s| s.as_u16()),
                        message: e.to_string(),
                    });
                }
            }
        })
    }
}

/// Wraps the file in a streaming body that reports progress as chunks are
/// pulled by the connection. The last chunk is not reported: 100 is only
/// announced once storage has accepted the object.
fn progress_body(
    bytes: Bytes,
    chunk_size: usize,
    progress: mpsc::UnboundedSender<f64>,
) -> reqwest::Body {
    let total = bytes.len();
    let chunks: Vec<Bytes> = (0..total)
        .step_by(chunk_size)
        .map(|start| bytes.slice(start..(start + chunk_size).min(total)))
        .collect();

    let mut sent = 0usize;
    let body = futures::stream::iter(chunks).map(move |chunk| {
        sent += chunk.len();
        if sent < total {
            let _ = progress.send(sent as f64 / total as f64 * 100.0);
        }
        Ok::<Bytes, std::io::Error>(chunk)
    });

    reqwest::Body::wrap_stream(body)
}

fn failure_from_response(status: StatusCode, body: &str, url: &SignedUrl) -> UploadError {
    if status == StatusCode::FORBIDDEN && body.contains(EXPIRED_REQUEST_MARKER) {
        return UploadError::ExpiredAuthorization {
            expired_at: url.expires_at,
        };
    }

    let message = status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(200).collect());

    UploadError::Transfer {
        status: Some(status.as_u16()),
        message,
    }
}
