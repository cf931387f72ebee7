//! Error types for artifact downloads.
//!
//! These cover failures after the service has answered successfully: the body
//! breaking off mid-stream, or the destination refusing the bytes. Failures
//! to reach the artifact at all are [`ApiError`](crate::ApiError)s from the
//! transport.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while writing an artifact to disk.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The response body failed mid-stream.
    #[error("stream interrupted downloading {target}: {source}")]
    Stream {
        /// Where the body was being read from (query stripped).
        target: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// File system error (create, write, flush, rename).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The destination exists but is not a directory.
    #[error("destination {path} is not a directory")]
    NotADirectory {
        /// The offending destination.
        path: PathBuf,
    },
}

impl DownloadError {
    /// Creates a mid-stream error from a reqwest error.
    pub fn stream(target: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Stream {
            target: target.into(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a not-a-directory error.
    pub fn not_a_directory(path: impl Into<PathBuf>) -> Self {
        Self::NotADirectory { path: path.into() }
    }
}

// No `From<reqwest::Error>` or `From<std::io::Error>`: every variant needs the
// target or path that the source error lacks.
