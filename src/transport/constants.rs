//! Constants for the transport module (timeouts, quota headers).

use std::time::Duration;

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default whole-request timeout (30 seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum Retry-After header value (1 hour) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Limit assumed when a response carries `Retry-After` but no limit header.
pub const DEFAULT_QUOTA_LIMIT: u32 = 60;

/// Requests allowed per window.
pub const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";

/// Requests left in the current window.
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Window reset time as Unix epoch seconds.
pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";
