//! Quota tracking from response headers.
//!
//! The service reports its view of the credential's request budget on every
//! response. [`RateLimitTracker`] keeps only the most recent report: each
//! update replaces the whole [`QuotaState`], so concurrent writers can never
//! leave a mix of fields from two responses.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use napkin_core::transport::parse_retry_after;
//!
//! assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
//! assert_eq!(parse_retry_after("invalid"), None);
//! ```

use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::{HeaderMap, RETRY_AFTER};
use tracing::{debug, instrument, warn};

use super::constants::{
    DEFAULT_QUOTA_LIMIT, MAX_RETRY_AFTER, RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET,
};

/// The service's most recent report of the request budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaState {
    /// Requests allowed per window.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// When the window resets, if known.
    pub reset: Option<SystemTime>,
    /// Server-suggested wait before the next call.
    pub retry_after: Option<Duration>,
}

impl QuotaState {
    /// Builds a quota state from response headers.
    ///
    /// Returns `None` unless the response carries `X-RateLimit-Limit` or
    /// `Retry-After`. Missing limit defaults to 60 and missing remaining to 0.
    /// When the reset header is absent or unparseable, a `Retry-After` value
    /// is used to approximate it.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let retry_after_raw = header_str(headers, RETRY_AFTER.as_str());
        if header_str(headers, RATE_LIMIT_LIMIT).is_none() && retry_after_raw.is_none() {
            return None;
        }

        let limit = header_str(headers, RATE_LIMIT_LIMIT)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_QUOTA_LIMIT);
        let remaining = header_str(headers, RATE_LIMIT_REMAINING)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        let retry_after = retry_after_raw.and_then(parse_retry_after);

        let reset = header_str(headers, RATE_LIMIT_RESET)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .and_then(|epoch| UNIX_EPOCH.checked_add(Duration::from_secs(epoch)))
            .or_else(|| retry_after.and_then(|delay| SystemTime::now().checked_add(delay)));

        Some(Self {
            limit,
            remaining,
            reset,
            retry_after,
        })
    }

    /// Whether the budget is spent and the window has not reset yet.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0 && self.reset.is_none_or(|reset| reset > SystemTime::now())
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Holder for the latest [`QuotaState`], shared by every in-flight call.
#[derive(Debug, Default)]
pub struct RateLimitTracker {
    state: RwLock<Option<QuotaState>>,
}

impl RateLimitTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored state wholesale.
    pub fn record(&self, state: QuotaState) {
        debug!(
            limit = state.limit,
            remaining = state.remaining,
            retry_after_secs = state.retry_after.map(|d| d.as_secs()),
            "quota updated"
        );
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Some(state);
    }

    /// Returns a copy of the latest state, if any response has reported one.
    #[must_use]
    pub fn snapshot(&self) -> Option<QuotaState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Logs a warning when the last observed quota is exhausted. Advisory only.
    pub fn warn_if_exhausted(&self) {
        if let Some(state) = self.snapshot()
            && state.is_exhausted()
        {
            let reset_in_secs = state
                .reset
                .and_then(|reset| reset.duration_since(SystemTime::now()).ok())
                .map(|d| d.as_secs());
            warn!(
                limit = state.limit,
                reset_in_secs, "request quota exhausted; call may be rate limited"
            );
        }
    }
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports two formats as per RFC 7231:
/// - Integer seconds: `Retry-After: 120`
/// - HTTP-date: `Retry-After: Wed, 21 Oct 2025 07:28:00 GMT`
///
/// Returns `None` if the value cannot be parsed. Caps excessive values at 1 hour.
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);

        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }

        return Some(duration);
    }

    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        if let Ok(duration) = datetime.duration_since(SystemTime::now()) {
            if duration > MAX_RETRY_AFTER {
                warn!(
                    delay_secs = duration.as_secs(),
                    max_secs = MAX_RETRY_AFTER.as_secs(),
                    "Retry-After date exceeds maximum, capping at 1 hour"
                );
                return Some(MAX_RETRY_AFTER);
            }
            Some(duration)
        } else {
            debug!(header_value, "Retry-After date is in the past, returning zero");
            Some(Duration::ZERO)
        }
    } else {
        debug!(header_value, "unparseable Retry-After value");
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use reqwest::header::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    // ==================== QuotaState Tests ====================

    #[test]
    fn test_quota_absent_without_quota_headers() {
        let map = headers(&[("content-type", "application/json")]);
        assert_eq!(QuotaState::from_headers(&map), None);
    }

    #[test]
    fn test_quota_parses_all_headers() {
        let map = headers(&[
            ("x-ratelimit-limit", "100"),
            ("x-ratelimit-remaining", "7"),
            ("x-ratelimit-reset", "1700000000"),
        ]);
        let state = QuotaState::from_headers(&map).unwrap();
        assert_eq!(state.limit, 100);
        assert_eq!(state.remaining, 7);
        assert_eq!(
            state.reset,
            Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
        );
        assert_eq!(state.retry_after, None);
    }

    #[test]
    fn test_quota_from_retry_after_only_uses_defaults() {
        let map = headers(&[("retry-after", "5")]);
        let state = QuotaState::from_headers(&map).unwrap();
        assert_eq!(state.limit, 60);
        assert_eq!(state.remaining, 0);
        assert_eq!(state.retry_after, Some(Duration::from_secs(5)));
        let reset = state.reset.unwrap();
        assert!(reset > SystemTime::now());
        assert!(state.is_exhausted());
    }

    #[test]
    fn test_quota_tolerates_garbage_values() {
        let map = headers(&[
            ("x-ratelimit-limit", "lots"),
            ("x-ratelimit-remaining", "-1"),
            ("x-ratelimit-reset", "soon"),
        ]);
        let state = QuotaState::from_headers(&map).unwrap();
        assert_eq!(state.limit, 60);
        assert_eq!(state.remaining, 0);
        assert_eq!(state.reset, None);
    }

    #[test]
    fn test_quota_overflowing_reset_is_ignored() {
        let map = headers(&[
            ("x-ratelimit-limit", "60"),
            ("x-ratelimit-reset", "18446744073709551615"),
        ]);
        let state = QuotaState::from_headers(&map).unwrap();
        assert_eq!(state.limit, 60);
        assert_eq!(state.reset, None);

        let map = headers(&[
            ("x-ratelimit-limit", "60"),
            ("x-ratelimit-reset", "18446744073709551615"),
            ("retry-after", "5"),
        ]);
        let state = QuotaState::from_headers(&map).unwrap();
        let reset = state.reset.unwrap();
        assert!(reset > SystemTime::now(), "falls back to Retry-After");
    }

    #[test]
    fn test_quota_with_past_reset_is_not_exhausted() {
        let state = QuotaState {
            limit: 60,
            remaining: 0,
            reset: Some(UNIX_EPOCH + Duration::from_secs(1)),
            retry_after: None,
        };
        assert!(!state.is_exhausted());
    }

    // ==================== RateLimitTracker Tests ====================

    #[test]
    fn test_tracker_starts_empty() {
        let tracker = RateLimitTracker::new();
        assert_eq!(tracker.snapshot(), None);
    }

    #[test]
    fn test_tracker_replaces_state_wholesale() {
        let tracker = RateLimitTracker::new();
        tracker.record(QuotaState {
            limit: 60,
            remaining: 0,
            reset: None,
            retry_after: Some(Duration::from_secs(5)),
        });
        tracker.record(QuotaState {
            limit: 100,
            remaining: 99,
            reset: None,
            retry_after: None,
        });
        let state = tracker.snapshot().unwrap();
        assert_eq!(state.limit, 100);
        assert_eq!(state.retry_after, None, "no field survives from older state");
    }

    #[tokio::test]
    async fn test_tracker_concurrent_updates_never_mix_fields() {
        let tracker = Arc::new(RateLimitTracker::new());
        let mut handles = Vec::new();
        for i in 0..32u32 {
            let tracker = Arc::clone(&tracker);
            handles.push(tokio::spawn(async move {
                tracker.record(QuotaState {
                    limit: i,
                    remaining: i,
                    reset: None,
                    retry_after: Some(Duration::from_secs(u64::from(i))),
                });
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let state = tracker.snapshot().unwrap();
        assert_eq!(state.limit, state.remaining);
        assert_eq!(
            state.retry_after,
            Some(Duration::from_secs(u64::from(state.limit)))
        );
    }

    // ==================== parse_retry_after Tests ====================

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after("  2  "), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_rejects_negative_and_garbage() {
        assert_eq!(parse_retry_after("-5"), None);
        assert_eq!(parse_retry_after("invalid"), None);
        assert_eq!(parse_retry_after(""), None);
    }

    #[test]
    fn test_parse_retry_after_caps_at_one_hour() {
        assert_eq!(parse_retry_after("86400"), Some(MAX_RETRY_AFTER));
    }

    #[test]
    fn test_parse_retry_after_past_http_date_is_zero() {
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_parse_retry_after_future_http_date() {
        let future = SystemTime::now() + Duration::from_secs(120);
        let value = httpdate::fmt_http_date(future);
        let delay = parse_retry_after(&value).unwrap();
        assert!(delay <= Duration::from_secs(120));
        assert!(delay >= Duration::from_secs(110));
    }
}
