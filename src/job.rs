//! Job records and artifact references.
//!
//! The service has answered with several envelope shapes over time
//! (`generated_files`, legacy `files`, legacy `urls`). [`JobRecord::from_envelope`]
//! is the one place those shapes are reconciled; everything downstream sees
//! a single [`JobRecord`] with a list of [`ArtifactRef`]s.

use std::fmt;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::request::OutputFormat;

/// Server-side status of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Queued or rendering. `processing` is accepted as the same state.
    #[serde(alias = "processing")]
    Pending,
    /// Finished with output.
    Completed,
    /// Finished without output.
    Failed,
    /// Passed the server-side TTL.
    Expired,
}

impl JobStatus {
    /// Whether no further transition is expected from this status.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether the service may legitimately move a job from `self` to `next`.
    ///
    /// Transitions are one-way: `pending` moves to `completed` or `failed`,
    /// and `expired` can follow `pending` or `completed`. Repeating a status is
    /// always allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Self::Pending, Self::Completed | Self::Failed | Self::Expired)
                | (Self::Completed, Self::Expired)
        )
    }

    /// Wire name of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to one generated file of a job. Immutable once observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    /// Id of the job that produced this artifact.
    pub job_id: String,
    /// Artifact id, unique within the job.
    pub id: String,
    /// Time-limited direct URL, when the service provided one.
    pub url: Option<Url>,
    /// Declared output format.
    pub format: OutputFormat,
    /// Declared filename, used when the download response carries none.
    pub filename: Option<String>,
    /// Declared size in bytes.
    pub size_bytes: Option<u64>,
}

/// Snapshot of a job as last reported by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    /// Opaque job id.
    pub id: String,
    /// Current status.
    pub status: JobStatus,
    /// Echo of the request as the service recorded it.
    pub request: Option<serde_json::Value>,
    /// Generated files; only populated once the job has completed.
    pub artifacts: Vec<ArtifactRef>,
    /// Progress percentage (0..=100) while pending.
    pub progress: Option<f64>,
    /// Status message from the service.
    pub message: Option<String>,
    /// Error text reported for failed jobs.
    pub error: Option<String>,
}

/// Raw response envelope shared by the create and status endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct JobEnvelope {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
    status: JobStatus,
    #[serde(default)]
    request: Option<serde_json::Value>,
    #[serde(default)]
    generated_files: Option<Vec<RawArtifact>>,
    #[serde(default)]
    files: Option<Vec<RawArtifact>>,
    #[serde(default)]
    urls: Option<Vec<String>>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawArtifact {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default, alias = "size")]
    size_bytes: Option<u64>,
}

impl JobRecord {
    /// Normalizes a raw envelope into a record.
    ///
    /// `fallback_id` is used when the envelope carries neither `id` nor
    /// `request_id` (the status endpoint may omit it).
    pub(crate) fn from_envelope(envelope: JobEnvelope, fallback_id: Option<&str>) -> Option<Self> {
        let id = envelope
            .id
            .or(envelope.request_id)
            .or_else(|| fallback_id.map(str::to_string))
            .filter(|id| !id.is_empty())?;

        let requested_format = envelope
            .request
            .as_ref()
            .and_then(|request| request.get("format"))
            .and_then(serde_json::Value::as_str)
            .and_then(|format| format.parse::<OutputFormat>().ok());

        let raw_artifacts = match (envelope.generated_files, envelope.files, envelope.urls) {
            (Some(generated), _, _) => generated,
            (None, Some(files), _) => {
                debug!(job_id = %id, "using legacy `files` key");
                files
            }
            (None, None, Some(urls)) => {
                debug!(job_id = %id, "using legacy `urls` key");
                urls.into_iter()
                    .map(|url| RawArtifact {
                        url: Some(url),
                        ..RawArtifact::default()
                    })
                    .collect()
            }
            (None, None, None) => Vec::new(),
        };

        let artifacts = raw_artifacts
            .into_iter()
            .enumerate()
            .map(|(index, raw)| normalize_artifact(&id, index, raw, requested_format))
            .collect();

        Some(Self {
            id,
            status: envelope.status,
            request: envelope.request,
            artifacts,
            progress: envelope.progress,
            message: envelope.message,
            error: envelope.error,
        })
    }

    /// Parses a JSON body into a record.
    pub(crate) fn from_json(body: &[u8], fallback_id: Option<&str>) -> Result<Self, String> {
        let envelope: JobEnvelope =
            serde_json::from_slice(body).map_err(|e| format!("malformed job envelope: {e}"))?;
        Self::from_envelope(envelope, fallback_id).ok_or_else(|| "job envelope has no id".into())
    }
}

fn normalize_artifact(
    job_id: &str,
    index: usize,
    raw: RawArtifact,
    requested_format: Option<OutputFormat>,
) -> ArtifactRef {
    let url = raw.url.as_deref().and_then(|value| match Url::parse(value) {
        Ok(url) => Some(url),
        Err(e) => {
            debug!(job_id, url = value, error = %e, "ignoring unparseable artifact URL");
            None
        }
    });

    let format = raw
        .format
        .as_deref()
        .and_then(|format| format.parse::<OutputFormat>().ok())
        .or_else(|| url.as_ref().and_then(format_from_url))
        .or(requested_format)
        .unwrap_or_default();

    ArtifactRef {
        job_id: job_id.to_string(),
        id: raw
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("file_{}", index + 1)),
        url,
        format,
        filename: raw.filename.filter(|name| !name.trim().is_empty()),
        size_bytes: raw.size_bytes,
    }
}

fn format_from_url(url: &Url) -> Option<OutputFormat> {
    let path = url.path().to_ascii_lowercase();
    if path.ends_with(".svg") {
        Some(OutputFormat::Vector)
    } else if path.ends_with(".png") {
        Some(OutputFormat::Raster)
    } else {
        None
    }
}
