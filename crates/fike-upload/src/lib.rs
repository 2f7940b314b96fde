#![warn(missing_docs)]
//! # fike-upload
//!
//! ## Purpose
//! Submits a finished recording to the remote analysis endpoint.
//!
//! ## Responsibilities
//! - Resolve and validate the `POST /analyze-video/` endpoint.
//! - Build the multipart request (`user_id` text part, `video` file part).
//! - Own the HTTP timeout and retry policy.
//! - Report body upload progress while the request is in flight.
//! - Classify failures into retriable and permanent categories.
//!
//! ## Data flow
//! Upload worker -> [`UploadClient::upload`] -> [`UploadTransport::send`]
//! (real: [`HttpTransport`]) -> [`RawResponse`] handed to the normalizer.
//!
//! ## Ownership and lifetimes
//! The artifact is streamed from disk by the transport; the client only keeps
//! its path and length. Progress callbacks are shared through [`ProgressSink`]
//! because the blocking HTTP stack requires `'static` body readers.
//!
//! ## Error model
//! Every failure is an [`UploadError`]. [`classify_upload_error`] drives the
//! retry loop and [`UploadError::kind`] maps onto the shared taxonomy
//! (`UploadTimeout` / `UploadServerError`).
//!
//! ## Security and privacy notes
//! Media bytes are never logged. The idempotency key is a content digest and
//! reveals nothing beyond artifact equality.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use fike_core::FailureKind;
use rand::Rng;
use reqwest::blocking::multipart::{Form, Part};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

/// Endpoint path, relative to the configured analysis base URL.
pub const ANALYZE_VIDEO_PATH: &str = "analyze-video/";
/// Content type of the uploaded recording.
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";
/// Header carrying the artifact digest.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";
/// Multipart field carrying the user identity.
pub const USER_ID_FIELD: &str = "user_id";
/// Multipart field carrying the recording.
pub const VIDEO_FIELD: &str = "video";

/// HTTP time budgets for one upload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadTimeouts {
    /// TCP/TLS connect budget.
    pub connect: Duration,
    /// Budget for sending the request body.
    pub write: Duration,
    /// Budget for receiving the analysis response.
    pub read: Duration,
}

impl UploadTimeouts {
    /// Total budget applied to one request after the connection is up.
    pub fn request_budget(&self) -> Duration {
        self.write.saturating_add(self.read)
    }
}

impl Default for UploadTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            write: Duration::from_secs(120),
            read: Duration::from_secs(120),
        }
    }
}

/// Retry policy for retriable upload failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (`0` means a single network call).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Upper bound for the exponential delay.
    pub max_delay_ms: u64,
    /// Maximum random jitter added to each delay.
    pub jitter_ms: u64,
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn single_attempt() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
            jitter_ms: 250,
        }
    }

    /// Returns the sleep before retry number `retry` (zero-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(1_u64 << retry.min(16))
            .min(self.max_delay_ms);
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=self.jitter_ms)
        };
        Duration::from_millis(exponential.saturating_add(jitter))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::single_attempt()
    }
}

/// Body upload progress of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    /// Bytes handed to the HTTP stack so far.
    pub sent_bytes: u64,
    /// Total artifact size.
    pub total_bytes: u64,
}

impl UploadProgress {
    /// Progress as an integer percentage in `[0, 100]`.
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 100;
        }
        (self.sent_bytes.min(self.total_bytes) * 100 / self.total_bytes) as u8
    }
}

/// Shared progress callback.
pub type ProgressSink = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// Returns a progress sink that ignores every update.
pub fn discard_progress() -> ProgressSink {
    Arc::new(|_| {})
}

/// Everything a transport needs to perform one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadEnvelope {
    /// Fully resolved analysis endpoint.
    pub endpoint: Url,
    /// Value of the `user_id` multipart field.
    pub user_id: String,
    /// Artifact on disk.
    pub artifact_path: PathBuf,
    /// File name reported in the multipart part.
    pub file_name: String,
    /// Artifact size in bytes.
    pub content_length: u64,
    /// SHA-256 hex digest of the artifact.
    pub idempotency_key: String,
    /// One-based attempt number.
    pub attempt: u32,
}

/// Unparsed HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body text.
    pub body: String,
}

/// Transport abstraction so the client can be exercised without a network.
pub trait UploadTransport: Send + Sync {
    /// Performs one upload attempt and returns the raw response, whatever its
    /// status. Only transport-level failures are errors.
    fn send(
        &self,
        envelope: &UploadEnvelope,
        progress: ProgressSink,
    ) -> Result<RawResponse, UploadError>;
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    /// Attempts used, including the successful one.
    pub attempts: u32,
    /// Successful (2xx) response.
    pub response: RawResponse,
    /// Artifact size in bytes.
    pub bytes_sent: u64,
}

/// Upload client bound to one endpoint and user identity.
#[derive(Clone)]
pub struct UploadClient {
    endpoint: Url,
    user_id: String,
    retry: RetryPolicy,
    transport: Arc<dyn UploadTransport>,
}

impl UploadClient {
    /// Creates a client for `<base_url>/analyze-video/`.
    ///
    /// # Errors
    /// Returns [`UploadError::InvalidEndpoint`] when the base URL does not
    /// parse or is not HTTP(S), and [`UploadError::InvalidRequest`] for a blank
    /// user id.
    pub fn new(
        base_url: &str,
        user_id: impl Into<String>,
        retry: RetryPolicy,
        transport: Arc<dyn UploadTransport>,
    ) -> Result<Self, UploadError> {
        let endpoint = analysis_endpoint(base_url)?;
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(UploadError::InvalidRequest("user id is empty".to_string()));
        }
        if endpoint.scheme() != "https" {
            warn!(endpoint = %endpoint, "analysis endpoint is not using https");
        }

        Ok(Self {
            endpoint,
            user_id,
            retry,
            transport,
        })
    }

    /// Returns the resolved analysis endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Returns the configured retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Uploads `artifact` and returns the first 2xx response.
    ///
    /// Blocks the calling thread for the whole exchange; callers run it off
    /// the session context.
    ///
    /// # Errors
    /// - [`UploadError::Artifact`] when the file is missing or empty.
    /// - The last attempt's error once retries are exhausted, or the first
    ///   permanent error.
    pub fn upload(
        &self,
        artifact: &Path,
        progress: ProgressSink,
    ) -> Result<UploadReport, UploadError> {
        let metadata = fs::metadata(artifact).map_err(|error| {
            UploadError::Artifact(format!("cannot stat '{}': {error}", artifact.display()))
        })?;
        if metadata.len() == 0 {
            return Err(UploadError::Artifact(format!(
                "'{}' is empty",
                artifact.display()
            )));
        }

        let file_name = artifact
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recording.mp4".to_string());
        let idempotency_key = idempotency_key_for_artifact(artifact)?;

        let mut attempt = 0_u32;
        loop {
            attempt += 1;
            let envelope = UploadEnvelope {
                endpoint: self.endpoint.clone(),
                user_id: self.user_id.clone(),
                artifact_path: artifact.to_path_buf(),
                file_name: file_name.clone(),
                content_length: metadata.len(),
                idempotency_key: idempotency_key.clone(),
                attempt,
            };

            debug!(attempt, bytes = metadata.len(), endpoint = %self.endpoint, "upload attempt");
            let outcome = self
                .transport
                .send(&envelope, Arc::clone(&progress))
                .and_then(check_status);

            let error = match outcome {
                Ok(response) => {
                    info!(attempt, status = response.status, "upload accepted");
                    return Ok(UploadReport {
                        attempts: attempt,
                        response,
                        bytes_sent: metadata.len(),
                    });
                }
                Err(error) => error,
            };

            let retries_used = attempt - 1;
            if classify_upload_error(&error) == FailureClass::Permanent
                || retries_used >= self.retry.max_retries
            {
                warn!(attempt, error = %error, "upload failed");
                return Err(error);
            }

            let delay = self.retry.delay_for_retry(retries_used);
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "upload attempt failed; retrying"
            );
            thread::sleep(delay);
        }
    }
}

fn check_status(response: RawResponse) -> Result<RawResponse, UploadError> {
    match response.status {
        200..=299 => Ok(response),
        400..=499 => Err(UploadError::Client(response.status)),
        status => Err(UploadError::Server(status)),
    }
}

/// Resolves `<base_url>/analyze-video/`.
///
/// # Errors
/// Returns [`UploadError::InvalidEndpoint`] for unparsable or non-HTTP(S) URLs.
pub fn analysis_endpoint(base_url: &str) -> Result<Url, UploadError> {
    let mut base = Url::parse(base_url.trim())
        .map_err(|error| UploadError::InvalidEndpoint(format!("invalid base url: {error}")))?;

    if !matches!(base.scheme(), "http" | "https") {
        return Err(UploadError::InvalidEndpoint(format!(
            "unsupported scheme '{}'",
            base.scheme()
        )));
    }

    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    base.join(ANALYZE_VIDEO_PATH)
        .map_err(|error| UploadError::InvalidEndpoint(format!("cannot join endpoint: {error}")))
}

/// Computes the SHA-256 hex digest of the artifact, streamed from disk.
///
/// # Errors
/// Returns [`UploadError::Artifact`] when the file cannot be read.
pub fn idempotency_key_for_artifact(artifact: &Path) -> Result<String, UploadError> {
    let mut file = File::open(artifact).map_err(|error| {
        UploadError::Artifact(format!("cannot open '{}': {error}", artifact.display()))
    })?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|error| {
        UploadError::Artifact(format!("cannot read '{}': {error}", artifact.display()))
    })?;
    Ok(hex::encode(hasher.finalize()))
}

/// Reader adapter that reports progress as the HTTP stack pulls the body.
pub struct ProgressReader<R> {
    inner: R,
    sent: u64,
    total: u64,
    last_percent: Option<u8>,
    sink: ProgressSink,
}

impl<R: Read> ProgressReader<R> {
    /// Wraps `inner`, whose full length is `total` bytes.
    pub fn new(inner: R, total: u64, sink: ProgressSink) -> Self {
        Self {
            inner,
            sent: 0,
            total,
            last_percent: None,
            sink,
        }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.sent = self.sent.saturating_add(read as u64);

        let progress = UploadProgress {
            sent_bytes: self.sent,
            total_bytes: self.total,
        };
        let percent = progress.percent();
        // Only forward percentage changes.
        if self.last_percent != Some(percent) {
            self.last_percent = Some(percent);
            (self.sink)(progress);
        }
        Ok(read)
    }
}

/// Real transport backed by a blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Builds a transport honoring `timeouts`.
    ///
    /// # Errors
    /// Returns [`UploadError::Transport`] when the HTTP client cannot be built.
    pub fn new(timeouts: UploadTimeouts) -> Result<Self, UploadError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.request_budget())
            .build()
            .map_err(|error| UploadError::Transport(format!("http client init failed: {error}")))?;
        Ok(Self { client })
    }
}

impl UploadTransport for HttpTransport {
    fn send(
        &self,
        envelope: &UploadEnvelope,
        progress: ProgressSink,
    ) -> Result<RawResponse, UploadError> {
        let file = File::open(&envelope.artifact_path).map_err(|error| {
            UploadError::Artifact(format!(
                "cannot open '{}': {error}",
                envelope.artifact_path.display()
            ))
        })?;

        let reader = ProgressReader::new(file, envelope.content_length, progress);
        let video = Part::reader_with_length(reader, envelope.content_length)
            .file_name(envelope.file_name.clone())
            .mime_str(VIDEO_CONTENT_TYPE)
            .map_err(map_reqwest_error)?;
        let form = Form::new()
            .text(USER_ID_FIELD, envelope.user_id.clone())
            .part(VIDEO_FIELD, video);

        let response = self
            .client
            .post(envelope.endpoint.clone())
            .header(IDEMPOTENCY_HEADER, envelope.idempotency_key.as_str())
            .multipart(form)
            .send()
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response.text().map_err(map_reqwest_error)?;
        Ok(RawResponse { status, body })
    }
}

fn map_reqwest_error(error: reqwest::Error) -> UploadError {
    if error.is_timeout() {
        UploadError::Timeout
    } else {
        UploadError::Transport(error.to_string())
    }
}

/// Retry classification of an upload failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth another attempt.
    Retriable,
    /// Retrying cannot help.
    Permanent,
}

/// Classifies an upload failure for the retry loop.
pub fn classify_upload_error(error: &UploadError) -> FailureClass {
    match error {
        UploadError::Timeout | UploadError::Server(_) | UploadError::Transport(_) => {
            FailureClass::Retriable
        }
        UploadError::Client(_)
        | UploadError::Artifact(_)
        | UploadError::InvalidEndpoint(_)
        | UploadError::InvalidRequest(_) => FailureClass::Permanent,
    }
}

/// Upload layer error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// Connect or request budget exceeded.
    #[error("upload timed out")]
    Timeout,
    /// Service answered 5xx (or another non-2xx, non-4xx status).
    #[error("analysis server error: HTTP {0}")]
    Server(u16),
    /// Service rejected the request (4xx).
    #[error("analysis request rejected: HTTP {0}")]
    Client(u16),
    /// Connection-level failure.
    #[error("upload transport failure: {0}")]
    Transport(String),
    /// Artifact missing, empty, or unreadable.
    #[error("upload artifact invalid: {0}")]
    Artifact(String),
    /// Endpoint URL rejected.
    #[error("invalid analysis endpoint: {0}")]
    InvalidEndpoint(String),
    /// Request parameters rejected before sending.
    #[error("invalid upload request: {0}")]
    InvalidRequest(String),
}

impl UploadError {
    /// Maps the error onto the shared failure taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout => FailureKind::UploadTimeout,
            _ => FailureKind::UploadServerError,
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for progress accounting and endpoint resolution.

    use std::sync::Mutex;

    use super::*;

    #[test]
    fn progress_percent_is_bounded() {
        let half = UploadProgress {
            sent_bytes: 50,
            total_bytes: 100,
        };
        assert_eq!(half.percent(), 50);

        let overshoot = UploadProgress {
            sent_bytes: 150,
            total_bytes: 100,
        };
        assert_eq!(overshoot.percent(), 100);
    }

    #[test]
    fn progress_reader_reports_each_percentage_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: ProgressSink = Arc::new(move |progress: UploadProgress| {
            sink_seen
                .lock()
                .expect("progress lock should work")
                .push(progress.percent());
        });

        let data = vec![7_u8; 10];
        let mut reader = ProgressReader::new(&data[..], 10, sink);
        let mut chunk = [0_u8; 5];
        while reader.read(&mut chunk).expect("read should work") > 0 {}

        let seen = seen.lock().expect("progress lock should work");
        assert_eq!(*seen, vec![50, 100]);
    }

    #[test]
    fn endpoint_appends_analyze_path() {
        let endpoint = analysis_endpoint("http://10.0.0.2:8000").expect("endpoint should resolve");
        assert_eq!(endpoint.as_str(), "http://10.0.0.2:8000/analyze-video/");

        let nested =
            analysis_endpoint("https://api.example.test/v1").expect("endpoint should resolve");
        assert_eq!(nested.as_str(), "https://api.example.test/v1/analyze-video/");

        assert!(analysis_endpoint("ftp://example.test").is_err());
    }

    #[test]
    fn retry_delay_is_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay_ms: 100,
            max_delay_ms: 300,
            jitter_ms: 0,
        };
        assert_eq!(policy.delay_for_retry(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_retry(4), Duration::from_millis(300));
    }
}
