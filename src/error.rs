//! Error types surfaced by the request-lifecycle engine.
//!
//! Every failure a caller can observe is an [`ApiError`]. Transient network,
//! server, and quota failures are retried inside the transport first and only
//! reach the caller once the retry policy is exhausted; every other kind is
//! surfaced on first sight.

use std::time::Duration;

use thiserror::Error;

use crate::download::DownloadError;
use crate::request::ValidationError;

/// Stable, copyable tag for an [`ApiError`].
///
/// Callers branch on this instead of matching message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Credential missing, rejected, or not the owner of the job (401/403).
    Authentication,
    /// Request parameters rejected locally or by the service (400).
    InvalidRequest,
    /// Quota exhausted and still exhausted after the retry budget (429).
    RateLimited,
    /// Job or artifact id unknown to the service (404).
    NotFound,
    /// Job or artifact passed its server-side TTL (410 or `expired` status).
    Expired,
    /// The job reached a failed state, or completed without output.
    JobFailed,
    /// The polling attempt budget ran out before a terminal state.
    PollTimeout,
    /// Network or server failure that outlived the retry budget.
    Transient,
    /// The artifact could not be written to its destination.
    Download,
    /// The service answered with a body that could not be understood.
    UnexpectedResponse,
}

/// Errors returned by [`NapkinClient`](crate::NapkinClient) operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The service rejected the credential.
    #[error("authentication failed (HTTP {status}): {message}")]
    Authentication {
        /// HTTP status code (401 or 403).
        status: u16,
        /// Server-supplied message.
        message: String,
    },

    /// The request was malformed; retrying cannot succeed.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Human-readable description of what was wrong.
        message: String,
        /// Machine-readable code from the service, when provided.
        code: Option<String>,
    },

    /// Quota exhausted after all retries.
    #[error("rate limited{}", format_retry_after(.retry_after))]
    RateLimited {
        /// Suggested wait before the next call, when the service provided one.
        retry_after: Option<Duration>,
    },

    /// The referenced job or artifact does not exist.
    #[error("not found: {resource}")]
    NotFound {
        /// Path or id of the missing resource.
        resource: String,
    },

    /// The referenced job or artifact has expired on the server.
    #[error("expired: {resource}")]
    Expired {
        /// Path or id of the expired resource.
        resource: String,
    },

    /// The job failed server-side, or completed with no artifacts.
    #[error("job {job_id} failed: {reason}")]
    JobFailed {
        /// Id of the failed job.
        job_id: String,
        /// Server-reported error, or a description of the invalid terminal state.
        reason: String,
    },

    /// The job was still pending after every polling attempt.
    #[error("job {job_id} still pending after {attempts} status checks")]
    PollTimeout {
        /// Id of the job being polled.
        job_id: String,
        /// Number of status checks performed.
        attempts: u32,
    },

    /// Network or server failure that persisted through every retry.
    #[error("service unavailable: {message}")]
    Transient {
        /// Description of the last failure observed.
        message: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// Writing an artifact to its destination failed.
    #[error("download of artifact {artifact_id} failed: {source}")]
    Download {
        /// Id of the artifact being downloaded.
        artifact_id: String,
        /// Underlying cause.
        #[source]
        source: DownloadError,
    },

    /// The service returned a response that could not be decoded.
    #[error("unexpected response from {endpoint}: {detail}")]
    UnexpectedResponse {
        /// Endpoint that produced the response.
        endpoint: String,
        /// What was wrong with it.
        detail: String,
    },
}

#[allow(clippy::ref_option)]
fn format_retry_after(retry_after: &Option<Duration>) -> String {
    retry_after.map_or_else(String::new, |delay| {
        format!("; retry after {}s", delay.as_secs().max(1))
    })
}

impl ApiError {
    /// Returns the stable kind tag for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Expired { .. } => ErrorKind::Expired,
            Self::JobFailed { .. } => ErrorKind::JobFailed,
            Self::PollTimeout { .. } => ErrorKind::PollTimeout,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Download { .. } => ErrorKind::Download,
            Self::UnexpectedResponse { .. } => ErrorKind::UnexpectedResponse,
        }
    }

    /// Creates an invalid-request error without a service code.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            code: None,
        }
    }

    /// Creates a job-failed error.
    pub fn job_failed(job_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::JobFailed {
            job_id: job_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a download error for the given artifact.
    pub fn download(artifact_id: impl Into<String>, source: DownloadError) -> Self {
        Self::Download {
            artifact_id: artifact_id.into(),
            source,
        }
    }

    /// Creates an unexpected-response error.
    pub fn unexpected(endpoint: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            endpoint: endpoint.into(),
            detail: detail.into(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self::invalid_request(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_message_includes_wait_time() {
        let error = ApiError::RateLimited {
            retry_after: Some(Duration::from_secs(5)),
        };
        assert_eq!(error.to_string(), "rate limited; retry after 5s");
    }

    #[test]
    fn test_rate_limited_message_without_wait_time() {
        let error = ApiError::RateLimited { retry_after: None };
        assert_eq!(error.to_string(), "rate limited");
    }

    #[test]
    fn test_transient_message_hides_backoff_schedule() {
        let error = ApiError::Transient {
            message: "HTTP 503".to_string(),
            attempts: 3,
        };
        let msg = error.to_string();
        assert!(msg.contains("HTTP 503"));
        assert!(!msg.contains("attempt"), "no retry detail in: {msg}");
    }

    #[test]
    fn test_kind_maps_every_variant() {
        assert_eq!(
            ApiError::invalid_request("bad").kind(),
            ErrorKind::InvalidRequest
        );
        assert_eq!(ApiError::job_failed("abc", "x").kind(), ErrorKind::JobFailed);
        assert_eq!(
            ApiError::Expired {
                resource: "abc".to_string()
            }
            .kind(),
            ErrorKind::Expired
        );
        assert_eq!(
            ApiError::unexpected("/visual", "not json").kind(),
            ErrorKind::UnexpectedResponse
        );
    }

    #[test]
    fn test_validation_error_becomes_invalid_request() {
        let error: ApiError = ValidationError::EmptyContent.into();
        assert_eq!(error.kind(), ErrorKind::InvalidRequest);
        assert!(error.to_string().contains("content"));
    }
}
