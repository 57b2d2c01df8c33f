//! HTTP client for the photo upload endpoint.
//!
//! Speaks `multipart/form-data` POST with the photo bytes, a capture
//! timestamp and a fixed source tag, authenticated via the `X-API-Key`
//! header when an API key is configured.

use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::config::UploadSettings;

/// Multipart field carrying the JPEG bytes.
pub const PHOTO_FIELD: &str = "photo";
/// Value of the `source` form field on every upload.
pub const SOURCE_TAG: &str = "photobooth";
/// Authentication header name.
pub const API_KEY_HEADER: &str = "X-API-Key";

const MAX_ERROR_BODY_LEN: usize = 200;

/// Upload endpoint parameters, derived from the settings file.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub url: String,
    pub api_key: String,
    pub timeout: Duration,
    /// Retries after the first failed attempt; a job gets
    /// `retry_count + 1` attempts in total.
    pub retry_count: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
}

impl From<&UploadSettings> for UploadPolicy {
    fn from(settings: &UploadSettings) -> Self {
        Self {
            url: settings.url.clone(),
            api_key: settings.api_key.clone(),
            timeout: Duration::from_secs(settings.timeout_seconds),
            retry_count: settings.retry_count,
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
        }
    }
}

/// One queued photo waiting for upload.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub image: Bytes,
    pub filename: String,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
}

impl UploadJob {
    pub fn new(image: Bytes, filename: String) -> Self {
        Self {
            image,
            filename,
            enqueued_at: Utc::now(),
            attempts: 0,
        }
    }
}

/// Final outcome of an upload job after all attempts.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub success: bool,
    pub filename: String,
    /// Last HTTP status seen, if the server answered at all.
    pub status: Option<u16>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

/// Errors from a single upload attempt.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Server returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Request failed: {0}")]
    Request(String),
}

impl UploadError {
    fn status(&self) -> Option<u16> {
        match self {
            UploadError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Client handling the wire format and the retry schedule.
pub struct UploadClient {
    http: reqwest::Client,
    policy: UploadPolicy,
}

impl UploadClient {
    pub fn new(policy: UploadPolicy) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder()
            .timeout(policy.timeout)
            .build()
            .map_err(|e| UploadError::Request(e.to_string()))?;
        Ok(Self { http, policy })
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Perform a single upload attempt.
    ///
    /// Returns the HTTP status on any 2xx response.
    ///
    /// # Errors
    /// * `UploadError::Timeout` - the request exceeded the configured timeout
    /// * `UploadError::Connection` - the endpoint was unreachable
    /// * `UploadError::Http` - the server answered with a non-2xx status
    pub async fn upload_once(&self, image: &Bytes, filename: &str) -> Result<u16, UploadError> {
        let part = reqwest::multipart::Part::bytes(image.to_vec())
            .file_name(filename.to_string())
            .mime_str("image/jpeg")
            .map_err(|e| UploadError::Request(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part(PHOTO_FIELD, part)
            .text("timestamp", Utc::now().to_rfc3339())
            .text("source", SOURCE_TAG);

        let mut request = self.http.post(&self.policy.url).multipart(form);
        if !self.policy.api_key.is_empty() {
            request = request.header(API_KEY_HEADER, &self.policy.api_key);
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();

        if status.is_success() {
            Ok(status.as_u16())
        } else {
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_BODY_LEN)
                .collect();
            Err(UploadError::Http {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Run a job through the full retry schedule.
    ///
    /// The job gets `retry_count + 1` attempts with a fixed delay between
    /// them. Never returns an error; the terminal result is reported
    /// in-band as an `UploadOutcome`.
    pub async fn run_job(&self, job: &mut UploadJob) -> UploadOutcome {
        let started = Instant::now();
        let total_attempts = self.policy.retry_count + 1;
        let mut last_error: Option<UploadError> = None;
        let mut last_status = None;

        for attempt in 0..total_attempts {
            job.attempts = attempt + 1;
            match self.upload_once(&job.image, &job.filename).await {
                Ok(status) => {
                    log::info!(
                        "Uploaded {} (attempt {}/{}, HTTP {})",
                        job.filename,
                        job.attempts,
                        total_attempts,
                        status
                    );
                    return UploadOutcome {
                        success: true,
                        filename: job.filename.clone(),
                        status: Some(status),
                        error: None,
                        elapsed: started.elapsed(),
                    };
                }
                Err(e) => {
                    log::warn!(
                        "Upload attempt {}/{} for {} failed: {}",
                        job.attempts,
                        total_attempts,
                        job.filename,
                        e
                    );
                    last_status = e.status().or(last_status);
                    last_error = Some(e);
                    if attempt + 1 < total_attempts {
                        tokio::time::sleep(self.policy.retry_delay).await;
                    }
                }
            }
        }

        let message = match last_error {
            Some(e) => format!("Upload failed after {total_attempts} attempts: {e}"),
            None => format!("Upload failed after {total_attempts} attempts"),
        };
        log::error!("{message}");

        UploadOutcome {
            success: false,
            filename: job.filename.clone(),
            status: last_status,
            error: Some(message),
            elapsed: started.elapsed(),
        }
    }

    fn classify(&self, e: reqwest::Error) -> UploadError {
        if e.is_timeout() {
            UploadError::Timeout(self.policy.timeout)
        } else if e.is_connect() {
            UploadError::Connection(e.to_string())
        } else {
            UploadError::Request(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_settings() {
        let settings = UploadSettings {
            enabled: true,
            url: "https://example.com/upload".to_string(),
            api_key: "secret".to_string(),
            upload_on_capture: true,
            retry_count: 2,
            retry_delay_ms: 250,
            timeout_seconds: 5,
        };
        let policy = UploadPolicy::from(&settings);
        assert_eq!(policy.url, "https://example.com/upload");
        assert_eq!(policy.retry_count, 2);
        assert_eq!(policy.retry_delay, Duration::from_millis(250));
        assert_eq!(policy.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_job_starts_with_zero_attempts() {
        let job = UploadJob::new(Bytes::from_static(b"x"), "photo.jpg".to_string());
        assert_eq!(job.attempts, 0);
        assert_eq!(job.filename, "photo.jpg");
    }

    #[test]
    fn test_error_display() {
        let e = UploadError::Http {
            status: 503,
            body: "busy".to_string(),
        };
        assert_eq!(e.to_string(), "Server returned HTTP 503: busy");
        assert_eq!(e.status(), Some(503));

        let e = UploadError::Timeout(Duration::from_secs(30));
        assert!(e.to_string().contains("timed out"));
        assert_eq!(e.status(), None);
    }
}
