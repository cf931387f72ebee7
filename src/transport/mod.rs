//! Authenticated transport to the generation service.
//!
//! # Features
//!
//! - One reqwest client per [`HttpTransport`] (connection pooling)
//! - Bearer credential in sensitive default headers, never logged
//! - Outcome classification: success, retryable, permanent
//! - Exponential backoff with jitter; `Retry-After` honored on 429
//! - Quota headers tracked in a shared [`RateLimitTracker`]

mod client;
mod constants;
mod quota;
mod retry;

pub use client::{HttpTransport, Outcome, RequestTarget};
pub use constants::{CONNECT_TIMEOUT_SECS, MAX_RETRY_AFTER, REQUEST_TIMEOUT_SECS};
pub use quota::{QuotaState, RateLimitTracker, parse_retry_after};
pub use retry::{DEFAULT_MAX_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, classify_status};
