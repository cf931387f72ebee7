//! Retry policy with exponential backoff for transient API failures.
//!
//! This module provides the [`RetryPolicy`] and [`FailureType`] types for
//! classifying API responses and determining retry behavior.
//!
//! # Overview
//!
//! Every failed call is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - 5xx, timeouts, connection failures; retried
//! - [`FailureType::RateLimited`] - HTTP 429; retried, honoring `Retry-After`
//! - everything else - surfaced immediately, retrying cannot change the outcome
//!
//! The [`RetryPolicy`] then decides whether another attempt is allowed and how
//! long to wait, using exponential backoff with jitter.
//!
//! # Example
//!
//! ```
//! use napkin_core::transport::{FailureType, RetryDecision, RetryPolicy, classify_status};
//!
//! let policy = RetryPolicy::default();
//! let failure_type = classify_status(503);
//!
//! match policy.should_retry(failure_type, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

/// Default maximum attempts per call (including the first).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff (2 seconds).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Default maximum delay cap (10 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Default maximum jitter added to delays (500ms).
const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(500);

/// Classification of a failed API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureType {
    /// Server-side or network failure that may succeed on retry.
    Transient,
    /// Quota exhausted (HTTP 429); retried after the suggested delay.
    RateLimited,
    /// Credential rejected or wrong owner (401/403).
    Authentication,
    /// Malformed request (400 and unlisted 4xx).
    InvalidRequest,
    /// Unknown job or artifact (404).
    NotFound,
    /// Job or artifact past its TTL (410).
    Expired,
}

impl FailureType {
    /// Whether this failure type is eligible for retry at all.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::RateLimited)
    }
}

/// Decision on whether to retry a failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the call after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry the call.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `base_delay`: 2 seconds
/// - `max_delay`: 10 seconds
/// - `backoff_multiplier`: 2.0
/// - `max_jitter`: 500 milliseconds
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * multiplier^(attempt - 1), max_delay) + jitter
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum attempts including initial (must be >= 1)
    /// * `base_delay` - Base delay for first retry
    /// * `max_delay` - Maximum delay cap
    /// * `backoff_multiplier` - Multiplier for exponential increase
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Replaces the jitter ceiling. Zero disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Determines whether to retry a failed call.
    ///
    /// # Arguments
    ///
    /// * `failure_type` - Classification of the failure
    /// * `attempt` - The attempt number that just failed (1-indexed)
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if !failure_type.is_retryable() {
            return RetryDecision::DoNotRetry {
                reason: format!("{failure_type:?} failure - retry would not help"),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Calculates the delay for a retry attempt with exponential backoff and jitter.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);

        // attempt 1 = multiplier^0 = 1x base
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * multiplier.powf(exponent);

        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + self.calculate_jitter()
    }

    /// Generates random jitter between 0 and the configured ceiling.
    #[allow(clippy::cast_possible_truncation)]
    fn calculate_jitter(&self) -> Duration {
        let ceiling_ms = self.max_jitter.as_millis() as u64;
        if ceiling_ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(0..=ceiling_ms))
    }
}

/// Classifies an HTTP error status into a failure type.
///
/// | Status | Type |
/// |--------|------|
/// | 400 | InvalidRequest |
/// | 401 | Authentication |
/// | 403 | Authentication (wrong owner) |
/// | 404 | NotFound |
/// | 408 | Transient |
/// | 410 | Expired |
/// | 429 | RateLimited |
/// | other 4xx | InvalidRequest |
/// | 5xx | Transient |
#[allow(clippy::match_same_arms)]
#[must_use]
pub fn classify_status(status: u16) -> FailureType {
    match status {
        400 => FailureType::InvalidRequest,
        401 => FailureType::Authentication,
        403 => FailureType::Authentication,
        404 => FailureType::NotFound,
        408 => FailureType::Transient,
        410 => FailureType::Expired,
        429 => FailureType::RateLimited,

        status if (400..500).contains(&status) => FailureType::InvalidRequest,
        status if (500..600).contains(&status) => FailureType::Transient,

        // 1xx/3xx reaching here means redirects were exhausted or the
        // service misbehaved; neither improves on retry.
        _ => FailureType::InvalidRequest,
    }
}
