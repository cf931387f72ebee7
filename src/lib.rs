//! Napkin Core Library
//!
//! Request-lifecycle engine for the Napkin visual generation service: submit a
//! generation request, poll the job to a terminal state, and download the
//! generated files.
//!
//! # Architecture
//!
//! The library is organized into the following modules, leaf-first:
//! - [`request`] - Validated generation requests and their wire shape
//! - [`job`] - Job records and artifact references, normalized from responses
//! - [`transport`] - Authenticated HTTP calls, retry policy, quota tracking
//! - [`polling`] - Pending-to-terminal state machine
//! - [`download`] - Streaming artifact downloads with filename resolution
//! - [`lifecycle`] - [`NapkinClient`], composing all of the above
//! - [`config`] - Immutable client configuration
//! - [`error`] - Error taxonomy surfaced to callers

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod error;
pub mod job;
pub mod lifecycle;
pub mod polling;
pub mod request;
pub mod transport;
mod user_agent;

// Re-export commonly used types
pub use config::{ApiToken, ClientConfig, ConfigError, DownloadSettings, PollSettings};
pub use download::{DownloadError, Downloader, ResolvedFile};
pub use error::{ApiError, ErrorKind};
pub use job::{ArtifactRef, JobRecord, JobStatus};
pub use lifecycle::{Generation, NapkinClient};
pub use polling::{PollSchedule, StatusSource, await_completion};
pub use request::{GenerationRequest, GenerationRequestBuilder, OutputFormat, Selection, ValidationError};
pub use transport::{QuotaState, RateLimitTracker, RetryPolicy};
