//! Client configuration.
//!
//! [`ClientConfig`] is built once and handed to
//! [`NapkinClient::new`](crate::NapkinClient::new); nothing in the library
//! reads the environment or any other process-wide default on its own.
//! [`ClientConfig::from_env`] is the bridge for callers that keep their
//! settings in `NAPKIN_*` variables.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::polling::{DEFAULT_MAX_POLL_ATTEMPTS, PollSchedule};
use crate::transport::{CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS, RetryPolicy};

/// Default service root.
pub const DEFAULT_BASE_URL: &str = "https://api.napkin.ai";

/// Default API version path segment.
pub const DEFAULT_API_VERSION: &str = "v1";

/// Default write buffer size for artifact downloads (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

const ENV_TOKEN: &str = "NAPKIN_API_TOKEN";
const ENV_BASE_URL: &str = "NAPKIN_API_BASE_URL";
const ENV_API_VERSION: &str = "NAPKIN_API_VERSION";
const ENV_TIMEOUT: &str = "NAPKIN_TIMEOUT_SECONDS";
const ENV_MAX_RETRIES: &str = "NAPKIN_MAX_RETRIES";
const ENV_POLL_INTERVAL: &str = "NAPKIN_POLL_INTERVAL_SECONDS";
const ENV_MAX_POLL_ATTEMPTS: &str = "NAPKIN_MAX_POLL_ATTEMPTS";
const ENV_CHUNK_SIZE: &str = "NAPKIN_DOWNLOAD_CHUNK_SIZE";
const ENV_OVERWRITE: &str = "NAPKIN_DOWNLOAD_OVERWRITE";

/// Errors raised while assembling a [`ClientConfig`] or the HTTP client behind it.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No credential was supplied.
    #[error("API token is missing; set NAPKIN_API_TOKEN")]
    MissingToken,

    /// The credential cannot be sent as an HTTP header value.
    #[error("API token contains characters that are not valid in an HTTP header")]
    InvalidToken,

    /// A setting was present but unusable.
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        /// Setting name.
        key: &'static str,
        /// Raw value as supplied.
        value: String,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    HttpClient {
        /// Underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: impl Into<String>, reason: &'static str) -> Self {
        Self::Invalid {
            key,
            value: value.into(),
            reason,
        }
    }
}

/// Bearer credential. Its `Debug` and `Display` output never show the value.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    /// Wraps a credential, rejecting blank values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingToken`] when the value is empty after trimming.
    pub fn new(value: impl Into<String>) -> Result<Self, ConfigError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::MissingToken);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(***)")
    }
}

impl fmt::Display for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Job polling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    /// Wait between consecutive status checks.
    pub schedule: PollSchedule,
    /// Status checks allowed before giving up with a poll timeout.
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            schedule: PollSchedule::default(),
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

/// Artifact download settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSettings {
    /// Write buffer size in bytes.
    pub chunk_size: usize,
    /// Replace existing files instead of choosing a suffixed name.
    pub overwrite: bool,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overwrite: false,
        }
    }
}

/// Immutable settings for a [`NapkinClient`](crate::NapkinClient).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use napkin_core::{ApiToken, ClientConfig};
///
/// # fn main() -> Result<(), napkin_core::ConfigError> {
/// let config = ClientConfig::new(ApiToken::new("sk-test")?)
///     .with_base_url("http://localhost:8080/")?
///     .with_request_timeout(Duration::from_secs(5));
/// assert_eq!(config.api_root(), "http://localhost:8080/v1");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: String,
    api_version: String,
    token: ApiToken,
    request_timeout: Duration,
    connect_timeout: Duration,
    retry: RetryPolicy,
    poll: PollSettings,
    download: DownloadSettings,
}

impl ClientConfig {
    /// Creates a configuration with default settings for the given credential.
    #[must_use]
    pub fn new(token: ApiToken) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            token,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            poll: PollSettings::default(),
            download: DownloadSettings::default(),
        }
    }

    /// Loads the configuration from `NAPKIN_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the token is missing or a value is unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration through an arbitrary key lookup.
    ///
    /// Unset and blank keys fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the token is missing or a value is unusable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let token = ApiToken::new(get(ENV_TOKEN).ok_or(ConfigError::MissingToken)?)?;
        let mut config = Self::new(token);

        if let Some(base_url) = get(ENV_BASE_URL) {
            config = config.with_base_url(&base_url)?;
        }
        if let Some(version) = get(ENV_API_VERSION) {
            config = config.with_api_version(&version)?;
        }
        if let Some(raw) = get(ENV_TIMEOUT) {
            let seconds = parse_positive_secs(ENV_TIMEOUT, &raw)?;
            config.request_timeout = seconds;
        }
        if let Some(raw) = get(ENV_MAX_RETRIES) {
            let retries: u32 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(ENV_MAX_RETRIES, &raw, "expected an integer"))?;
            config.retry = RetryPolicy::with_max_attempts(retries);
        }
        if let Some(raw) = get(ENV_POLL_INTERVAL) {
            let initial = parse_positive_secs(ENV_POLL_INTERVAL, &raw)?;
            config.poll.schedule = PollSchedule::backoff_from(initial);
        }
        if let Some(raw) = get(ENV_MAX_POLL_ATTEMPTS) {
            config.poll.max_attempts = raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|attempts| *attempts > 0)
                .ok_or_else(|| {
                    ConfigError::invalid(ENV_MAX_POLL_ATTEMPTS, &raw, "expected a positive integer")
                })?;
        }
        if let Some(raw) = get(ENV_CHUNK_SIZE) {
            config.download.chunk_size = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|size| *size > 0)
                .ok_or_else(|| {
                    ConfigError::invalid(ENV_CHUNK_SIZE, &raw, "expected a positive integer")
                })?;
        }
        if let Some(raw) = get(ENV_OVERWRITE) {
            config.download.overwrite = parse_flag(&raw);
        }

        Ok(config)
    }

    /// Replaces the service root. Must be an absolute http(s) URL; a trailing
    /// `/` is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for non-http(s) or unparseable URLs.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ConfigError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let parsed = Url::parse(trimmed)
            .map_err(|_| ConfigError::invalid(ENV_BASE_URL, base_url, "not a valid URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                ENV_BASE_URL,
                base_url,
                "scheme must be http or https",
            ));
        }
        self.base_url = trimmed.to_string();
        Ok(self)
    }

    /// Replaces the API version segment (`v1`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the segment is empty or contains `/`.
    pub fn with_api_version(mut self, version: &str) -> Result<Self, ConfigError> {
        let trimmed = version.trim().trim_matches('/');
        if trimmed.is_empty() || trimmed.contains('/') {
            return Err(ConfigError::invalid(
                ENV_API_VERSION,
                version,
                "expected a single path segment",
            ));
        }
        self.api_version = trimmed.to_string();
        Ok(self)
    }

    /// Replaces the whole-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Replaces the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Replaces the per-call retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the polling settings.
    #[must_use]
    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Replaces the download settings.
    #[must_use]
    pub fn with_download_settings(mut self, download: DownloadSettings) -> Self {
        self.download = download;
        self
    }

    /// Service root without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Versioned API root, e.g. `https://api.napkin.ai/v1`.
    #[must_use]
    pub fn api_root(&self) -> String {
        format!("{}/{}", self.base_url, self.api_version)
    }

    /// The credential.
    #[must_use]
    pub fn token(&self) -> &ApiToken {
        &self.token
    }

    /// Whole-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Per-call retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Polling settings.
    #[must_use]
    pub fn poll_settings(&self) -> &PollSettings {
        &self.poll
    }

    /// Download settings.
    #[must_use]
    pub fn download_settings(&self) -> DownloadSettings {
        self.download
    }
}

fn parse_positive_secs(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| ConfigError::invalid(key, raw, "expected a positive number of seconds"))
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
