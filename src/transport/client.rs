//! Authenticated HTTP transport with retry.
//!
//! [`HttpTransport::send`] performs exactly one call and classifies it into an
//! [`Outcome`]. [`HttpTransport::execute`] wraps `send` in the retry loop:
//! transient and quota failures are retried per the [`RetryPolicy`], every
//! other failure is surfaced on first sight.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::quota::{QuotaState, RateLimitTracker};
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_status};
use crate::config::{ClientConfig, ConfigError};
use crate::error::ApiError;
use crate::user_agent;

/// Longest error-body excerpt kept in a failure detail.
const MAX_DETAIL_CHARS: usize = 300;

/// Where a request is sent.
#[derive(Debug, Clone, Copy)]
pub enum RequestTarget<'a> {
    /// Path under the versioned API root, e.g. `/visual/abc123/status`.
    Path(&'a str),
    /// Absolute URL, used for direct artifact links.
    Url(&'a Url),
}

impl fmt::Display for RequestTarget<'_> {
    // Absolute URLs are shown without their query: artifact links carry
    // signatures in it.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.write_str(path),
            Self::Url(url) => {
                let mut shown = (*url).clone();
                shown.set_query(None);
                shown.set_fragment(None);
                f.write_str(shown.as_str())
            }
        }
    }
}

/// Classified result of a single call.
#[derive(Debug)]
pub enum Outcome {
    /// 2xx response; the body is still unread.
    Success {
        /// The response, ready for JSON decoding or streaming.
        response: Response,
        /// Quota reported on this response, if any.
        quota: Option<QuotaState>,
    },
    /// Failure that another attempt may fix.
    Retryable {
        /// [`FailureType::Transient`] or [`FailureType::RateLimited`].
        failure: FailureType,
        /// Server-suggested wait, which overrides the backoff schedule.
        delay: Option<Duration>,
        /// What went wrong.
        detail: String,
    },
    /// Failure that no amount of retrying will fix.
    Permanent {
        /// Classification of the failure.
        failure: FailureType,
        /// HTTP status, when the failure came from a response.
        status: Option<u16>,
        /// Message from the error body, or a description of the failure.
        detail: String,
        /// Machine-readable code from the error body.
        code: Option<String>,
    },
}

/// Error body shape used by the service.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

/// Authenticated HTTP transport shared by every lifecycle operation.
///
/// Created once per client and reused so connections are pooled. The
/// credential lives only in the reqwest client's default headers, marked
/// sensitive, and is never formatted or logged.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    api_root: String,
    retry: RetryPolicy,
    tracker: Arc<RateLimitTracker>,
}

impl HttpTransport {
    /// Builds the transport from a client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidToken`] when the credential cannot be
    /// sent as a header, or [`ConfigError::HttpClient`] when reqwest rejects
    /// the client configuration.
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let client = build_client(config)?;
        Ok(Self {
            client,
            api_root: config.api_root(),
            retry: config.retry_policy().clone(),
            tracker: Arc::new(RateLimitTracker::new()),
        })
    }

    /// Shared quota tracker.
    #[must_use]
    pub fn tracker(&self) -> &Arc<RateLimitTracker> {
        &self.tracker
    }

    /// Retry policy applied by [`execute`](Self::execute).
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Performs one call and classifies the result. Never retries.
    #[instrument(skip(self, body), fields(target = %target))]
    pub async fn send(
        &self,
        method: Method,
        target: RequestTarget<'_>,
        body: Option<&serde_json::Value>,
    ) -> Outcome {
        self.tracker.warn_if_exhausted();

        let mut request = match target {
            RequestTarget::Path(path) => self
                .client
                .request(method, format!("{}{path}", self.api_root)),
            RequestTarget::Url(url) => self.client.request(method, url.clone()),
        };
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return classify_send_error(&e),
        };

        let quota = QuotaState::from_headers(response.headers());
        if let Some(state) = &quota {
            self.tracker.record(state.clone());
        }

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "request succeeded");
            return Outcome::Success { response, quota };
        }

        let status_code = status.as_u16();
        let failure = classify_status(status_code);
        let body_text = response.text().await.unwrap_or_default();
        let error_body = parse_error_body(&body_text);
        let detail = describe_failure(status_code, &error_body, &body_text);
        debug!(status = status_code, ?failure, "request failed");

        if failure.is_retryable() {
            Outcome::Retryable {
                failure,
                delay: quota.and_then(|state| state.retry_after),
                detail,
            }
        } else {
            Outcome::Permanent {
                failure,
                status: Some(status_code),
                detail,
                code: error_body.code,
            }
        }
    }

    /// Performs a call with the retry policy applied.
    ///
    /// For quota failures the server's `Retry-After` wins over the
    /// exponential schedule for that one retry.
    ///
    /// # Errors
    ///
    /// Permanent failures map to their [`ApiError`] kind immediately.
    /// Retryable failures that outlive the policy surface as
    /// [`ApiError::RateLimited`] or [`ApiError::Transient`].
    #[instrument(skip(self, body), fields(target = %target))]
    pub async fn execute(
        &self,
        method: Method,
        target: RequestTarget<'_>,
        body: Option<&serde_json::Value>,
    ) -> Result<Response, ApiError> {
        let mut attempt: u32 = 1;

        loop {
            match self.send(method.clone(), target, body).await {
                Outcome::Success { response, .. } => return Ok(response),
                Outcome::Permanent {
                    failure,
                    status,
                    detail,
                    code,
                } => return Err(permanent_error(failure, status, detail, code, target)),
                Outcome::Retryable {
                    failure,
                    delay: suggested,
                    detail,
                } => match self.retry.should_retry(failure, attempt) {
                    RetryDecision::Retry {
                        delay: backoff,
                        attempt: next_attempt,
                    } => {
                        let delay = suggested.unwrap_or(backoff);
                        info!(
                            attempt = next_attempt,
                            max_attempts = self.retry.max_attempts(),
                            delay_ms = delay.as_millis(),
                            reason = %detail,
                            "retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt = next_attempt;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        warn!(attempts = attempt, %reason, "giving up");
                        return Err(exhausted_error(failure, suggested, detail, attempt));
                    }
                },
            }
        }
    }

    /// Performs a call with retry and reads the whole body.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute); a body that breaks off mid-read is
    /// reported as [`ApiError::Transient`].
    pub async fn execute_body(
        &self,
        method: Method,
        target: RequestTarget<'_>,
        body: Option<&serde_json::Value>,
    ) -> Result<Vec<u8>, ApiError> {
        let response = self.execute(method, target, body).await?;
        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|e| ApiError::Transient {
                message: format!("failed to read response from {target}: {e}"),
                attempts: 1,
            })
    }
}

fn build_client(config: &ClientConfig) -> Result<Client, ConfigError> {
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token().expose()))
        .map_err(|_| ConfigError::InvalidToken)?;
    auth.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, auth);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    Client::builder()
        .connect_timeout(config.connect_timeout())
        .timeout(config.request_timeout())
        .gzip(true)
        .user_agent(user_agent::default_user_agent())
        .default_headers(headers)
        .build()
        .map_err(|source| ConfigError::HttpClient { source })
}

fn classify_send_error(error: &reqwest::Error) -> Outcome {
    if error.is_builder() {
        return Outcome::Permanent {
            failure: FailureType::InvalidRequest,
            status: None,
            detail: format!("could not build request: {error}"),
            code: None,
        };
    }
    let detail = if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else {
        format!("network error: {error}")
    };
    Outcome::Retryable {
        failure: FailureType::Transient,
        delay: None,
        detail,
    }
}

fn parse_error_body(body: &str) -> ErrorBody {
    serde_json::from_str(body).unwrap_or_default()
}

fn describe_failure(status: u16, error_body: &ErrorBody, raw: &str) -> String {
    let mut message = match error_body.error.as_deref().map(str::trim) {
        Some(message) if !message.is_empty() => message.to_string(),
        _ if error_body.code.is_none() && !raw.trim().is_empty() => {
            raw.trim().chars().take(MAX_DETAIL_CHARS).collect()
        }
        _ => format!("HTTP {status}"),
    };
    match &error_body.details {
        Some(serde_json::Value::String(details)) if !details.is_empty() => {
            message = format!("{message} ({details})");
        }
        Some(details @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => {
            let rendered: String = details.to_string().chars().take(MAX_DETAIL_CHARS).collect();
            message = format!("{message} ({rendered})");
        }
        _ => {}
    }
    message
}

fn permanent_error(
    failure: FailureType,
    status: Option<u16>,
    detail: String,
    code: Option<String>,
    target: RequestTarget<'_>,
) -> ApiError {
    match failure {
        FailureType::Authentication => ApiError::Authentication {
            status: status.unwrap_or(401),
            message: detail,
        },
        FailureType::NotFound => ApiError::NotFound {
            resource: target.to_string(),
        },
        FailureType::Expired => ApiError::Expired {
            resource: target.to_string(),
        },
        FailureType::InvalidRequest => ApiError::InvalidRequest {
            message: detail,
            code,
        },
        FailureType::RateLimited => ApiError::RateLimited { retry_after: None },
        FailureType::Transient => ApiError::Transient {
            message: detail,
            attempts: 1,
        },
    }
}

fn exhausted_error(
    failure: FailureType,
    suggested: Option<Duration>,
    detail: String,
    attempts: u32,
) -> ApiError {
    match failure {
        FailureType::RateLimited => ApiError::RateLimited {
            retry_after: suggested,
        },
        _ => ApiError::Transient {
            message: detail,
            attempts,
        },
    }
}
