use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use reqwest::{multipart, Body, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use url::Url;

use crate::config::ClientConfig;
use crate::models::job::{JobHandle, JobStatus, StatusResponse, UploadResponse};
use crate::models::upload::UploadRequest;
use crate::models::wardrobe::{Wardrobe, WardrobeItem, WardrobeQuery, WardrobeSummary};

/// Receives the cumulative number of image bytes handed to the transport.
pub type UploadTap = mpsc::UnboundedSender<u64>;

const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY_CHARS: usize = 200;

/// The two calls the job poller needs from the analysis service.
#[async_trait]
pub trait JobService: Send + Sync {
    /// Upload an image once and return the handle of the created job.
    async fn submit(&self, request: &UploadRequest, tap: UploadTap)
        -> Result<JobHandle, ServiceError>;

    /// Fetch the current status of a job.
    async fn job_status(&self, handle: &JobHandle) -> Result<JobStatus, ServiceError>;
}

/// HTTP client for the FitSense outfit analysis service.
pub struct AnalysisClient {
    http: Client,
    base_url: Url,
    /// Whole-request bound for health and wardrobe reads. Upload and status
    /// calls are bounded by the poller instead.
    request_timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: String,
    pub message: Option<String>,
    pub latency_ms: u64,
}

#[derive(Deserialize)]
struct HealthBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// `{success, error}` pair every wardrobe response carries.
#[derive(Deserialize)]
struct Acknowledgement {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct WardrobeEnvelope {
    wardrobe: Wardrobe,
}

#[derive(Deserialize)]
struct SummaryEnvelope {
    summary: WardrobeSummary,
}

#[derive(Deserialize)]
struct SearchEnvelope {
    items: Vec<WardrobeItem>,
}

impl AnalysisClient {
    pub fn new(base_url: &str) -> Result<Self, ServiceError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ServiceError::InvalidBaseUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(ServiceError::InvalidBaseUrl(format!(
                "{} is not an http(s) URL",
                base_url
            )));
        }

        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ServiceError> {
        Ok(Self::new(&config.api_base_url)?
            .with_request_timeout(Duration::from_millis(config.status_timeout_ms)))
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GET /health. Manual connectivity check, not used by the poll loop.
    pub async fn health_check(&self) -> Result<HealthReport, ServiceError> {
        let start = Instant::now();
        let response = self
            .http
            .get(self.endpoint(&["health"]))
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        // Any 2xx means reachable; the body is informational.
        let bytes = response.bytes().await?;
        let body = serde_json::from_slice::<HealthBody>(&bytes).ok();

        Ok(HealthReport {
            status: body
                .as_ref()
                .and_then(|b| b.status.clone())
                .unwrap_or_else(|| "ok".to_string()),
            message: body.and_then(|b| b.message),
            latency_ms,
        })
    }

    /// GET /wardrobe/{user_id}
    pub async fn wardrobe(&self, user_id: &str) -> Result<Wardrobe, ServiceError> {
        let request = self
            .http
            .get(self.endpoint(&["wardrobe", user_id]))
            .timeout(self.request_timeout);
        let envelope: WardrobeEnvelope = fetch_envelope(request).await?;
        Ok(envelope.wardrobe)
    }

    /// GET /wardrobe/{user_id}/summary
    pub async fn wardrobe_summary(&self, user_id: &str) -> Result<WardrobeSummary, ServiceError> {
        let request = self
            .http
            .get(self.endpoint(&["wardrobe", user_id, "summary"]))
            .timeout(self.request_timeout);
        let envelope: SummaryEnvelope = fetch_envelope(request).await?;
        Ok(envelope.summary)
    }

    /// GET /wardrobe/{user_id}/search
    pub async fn search_wardrobe(
        &self,
        user_id: &str,
        query: &WardrobeQuery,
    ) -> Result<Vec<WardrobeItem>, ServiceError> {
        let request = self
            .http
            .get(self.endpoint(&["wardrobe", user_id, "search"]))
            .query(query)
            .timeout(self.request_timeout);
        let envelope: SearchEnvelope = fetch_envelope(request).await?;
        Ok(envelope.items)
    }

    /// Append percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[async_trait]
impl JobService for AnalysisClient {
    /// POST /upload-outfit with multipart `file` + `user_id`.
    async fn submit(
        &self,
        request: &UploadRequest,
        tap: UploadTap,
    ) -> Result<JobHandle, ServiceError> {
        let part = multipart::Part::stream_with_length(
            chunked_body(request.image().clone(), tap),
            request.len() as u64,
        )
        .file_name(request.file_name())
        .mime_str(request.mime_type())?;

        let form = multipart::Form::new()
            .part("file", part)
            .text("user_id", request.user_id().to_string());

        let response = self
            .http
            .post(self.endpoint(&["upload-outfit"]))
            .multipart(form)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let body: UploadResponse = decode(response).await?;

        if !body.success {
            return Err(ServiceError::Rejected(body.error.unwrap_or_else(|| {
                "upload reported failure without a message".to_string()
            })));
        }

        match body.job_id {
            Some(job_id) if !job_id.trim().is_empty() => Ok(JobHandle { job_id }),
            _ => Err(ServiceError::MissingJobId),
        }
    }

    /// GET /job/{job_id}
    async fn job_status(&self, handle: &JobHandle) -> Result<JobStatus, ServiceError> {
        let response = self
            .http
            .get(self.endpoint(&["job", &handle.job_id]))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let body: StatusResponse = decode(response).await?;
        Ok(body.into())
    }
}

/// Stream the image in fixed-size chunks, reporting progress as each chunk
/// is pulled by the transport.
fn chunked_body(image: Bytes, tap: UploadTap) -> Body {
    let total = image.len();
    let mut sent = 0u64;

    let chunks = (0..total)
        .step_by(UPLOAD_CHUNK_BYTES)
        .map(move |start| image.slice(start..(start + UPLOAD_CHUNK_BYTES).min(total)));

    let stream = stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        // Receiver may already be gone; progress is best-effort.
        let _ = tap.send(sent);
        Ok::<_, std::io::Error>(chunk)
    });

    Body::wrap_stream(stream)
}

async fn ensure_success(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Status {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Prefer the service's `error` field; fall back to the (truncated) body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<Acknowledgement>(body) {
        Ok(Acknowledgement {
            error: Some(error), ..
        }) => error,
        _ => body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect(),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn fetch_envelope<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ServiceError> {
    let response = ensure_success(request.send().await?).await?;
    let bytes = response.bytes().await?;

    let ack: Acknowledgement = serde_json::from_slice(&bytes)?;
    if !ack.success {
        return Err(ServiceError::Rejected(
            ack.error
                .unwrap_or_else(|| "request reported failure without a message".to_string()),
        ));
    }

    Ok(serde_json::from_slice(&bytes)?)
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Service rejected the request: {0}")]
    Rejected(String),

    #[error("Upload response did not include a job id")]
    MissingJobId,

    #[error("Failed to parse service response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid service base URL: {0}")]
    InvalidBaseUrl(String),
}
