//! Artifact downloads: streaming to disk with filename resolution.
//!
//! # Features
//!
//! - Streaming writes through a configurable buffer (memory-flat for large files)
//! - Filename from `Content-Disposition` (RFC 5987 aware), declared name, or
//!   `{job_id}_{artifact_id}.{ext}`
//! - Content type from the response, or from the declared format
//! - Atomic finalize: `.part` file renamed into place, removed on failure
//! - Duplicate filename handling (numeric suffix) unless overwrite is enabled

mod client;
mod error;
mod filename;

pub use client::{Downloader, ResolvedFile};
pub use error::DownloadError;
