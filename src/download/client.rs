//! Artifact downloader.
//!
//! Streams an artifact into a hidden `.part` file beside its destination and
//! publishes it only after the last byte is flushed, so a file under the final
//! name is always complete. Without overwrite, publishing never replaces an
//! existing file, even one created by a concurrent download. The part file is
//! removed on every path, including the caller dropping the future
//! mid-transfer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap};
use reqwest::{Method, Response};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use super::error::DownloadError;
use super::filename::{resolve_content_type, resolve_filename, resolve_unique_path};
use crate::config::DownloadSettings;
use crate::error::ApiError;
use crate::job::ArtifactRef;
use crate::transport::{HttpTransport, RequestTarget};

/// Result of a successful artifact download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Filename chosen by the precedence rules, before any collision suffix.
    pub filename: String,
    /// Where the bytes were written.
    pub path: PathBuf,
    /// Resolved MIME type.
    pub content_type: String,
    /// Number of bytes written.
    pub bytes_written: u64,
}

/// Streams artifacts to disk through the shared authenticated transport.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use napkin_core::{ApiToken, ClientConfig, NapkinClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = NapkinClient::new(ClientConfig::new(ApiToken::new("sk-...")?))?;
/// let job = client.await_completion("abc123").await?;
/// let file = client.download(&job.artifacts[0], Path::new("./visuals")).await?;
/// println!("{} ({})", file.path.display(), file.content_type);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Downloader {
    transport: Arc<HttpTransport>,
    settings: DownloadSettings,
}

impl Downloader {
    /// Creates a downloader on top of an existing transport.
    #[must_use]
    pub fn new(transport: Arc<HttpTransport>, settings: DownloadSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// Downloads one artifact into `dest_dir`, creating the directory if needed.
    ///
    /// Artifacts without a direct URL are fetched by id through
    /// `/visual/{job_id}/file/{artifact_id}`.
    ///
    /// # Errors
    ///
    /// Transport failures (not found, expired, authentication, exhausted
    /// retries) surface with their own kind; failures while writing surface as
    /// [`ApiError::Download`].
    #[instrument(skip(self, artifact, dest_dir), fields(job_id = %artifact.job_id, artifact_id = %artifact.id))]
    pub async fn download(
        &self,
        artifact: &ArtifactRef,
        dest_dir: &Path,
    ) -> Result<ResolvedFile, ApiError> {
        let fallback_path = artifact_path(&artifact.job_id, &artifact.id);
        let target = match &artifact.url {
            Some(url) => RequestTarget::Url(url),
            None => {
                debug!("artifact has no direct URL; fetching by id");
                RequestTarget::Path(&fallback_path)
            }
        };
        let target_label = target.to_string();

        let response = self.transport.execute(Method::GET, target, None).await?;
        let filename = resolve_filename(
            header_str(response.headers(), CONTENT_DISPOSITION.as_str()),
            artifact,
        );
        let content_type = resolve_content_type(
            header_str(response.headers(), CONTENT_TYPE.as_str()),
            artifact.format,
        );
        debug!(%filename, %content_type, "resolved artifact metadata");

        let (path, bytes_written) = self
            .write_atomically(response, dest_dir, &filename, &target_label)
            .await
            .map_err(|e| ApiError::download(artifact.id.clone(), e))?;

        if let Some(declared) = artifact.size_bytes
            && declared != bytes_written
        {
            warn!(
                declared,
                actual = bytes_written,
                "artifact size differs from declared size"
            );
        }

        info!(path = %path.display(), bytes = bytes_written, "artifact downloaded");

        Ok(ResolvedFile {
            filename,
            path,
            content_type,
            bytes_written,
        })
    }

    async fn write_atomically(
        &self,
        response: Response,
        dest_dir: &Path,
        filename: &str,
        target: &str,
    ) -> Result<(PathBuf, u64), DownloadError> {
        ensure_directory(dest_dir).await?;

        let part = PartFile::new(dest_dir, filename);
        let file = File::create(part.path())
            .await
            .map_err(|e| DownloadError::io(part.path(), e))?;
        let bytes_written = stream_to_file(
            file,
            response,
            self.settings.chunk_size,
            target,
            part.path(),
        )
        .await?;

        if self.settings.overwrite {
            let final_path = dest_dir.join(filename);
            tokio::fs::rename(part.path(), &final_path)
                .await
                .map_err(|e| DownloadError::io(final_path.clone(), e))?;
            part.keep();
            return Ok((final_path, bytes_written));
        }

        // The part file is removed when `part` drops; the link keeps the bytes.
        let final_path = link_unique(part.path(), dest_dir, filename).await?;
        Ok((final_path, bytes_written))
    }
}

/// Attempts at claiming a free name before giving up.
const MAX_CLAIM_ATTEMPTS: usize = 16;

/// Publishes `source` under a name in `dir` that no other file holds.
///
/// Hard-linking fails instead of replacing an existing entry, so a name taken
/// between the lookup and the link is skipped rather than overwritten.
async fn link_unique(
    source: &Path,
    dir: &Path,
    filename: &str,
) -> Result<PathBuf, DownloadError> {
    let mut candidate = resolve_unique_path(dir, filename);
    for attempt in 1..=MAX_CLAIM_ATTEMPTS {
        match tokio::fs::hard_link(source, &candidate).await {
            Ok(()) => return Ok(candidate),
            Err(e)
                if e.kind() == std::io::ErrorKind::AlreadyExists
                    && attempt < MAX_CLAIM_ATTEMPTS =>
            {
                debug!(path = %candidate.display(), "name taken concurrently; picking another");
                candidate = resolve_unique_path(dir, filename);
            }
            Err(e) => return Err(DownloadError::io(candidate, e)),
        }
    }
    Err(DownloadError::io(
        candidate,
        std::io::Error::from(std::io::ErrorKind::AlreadyExists),
    ))
}

/// By-id artifact path under the API root.
pub(crate) fn artifact_path(job_id: &str, artifact_id: &str) -> String {
    format!(
        "/visual/{}/file/{}",
        urlencoding::encode(job_id),
        urlencoding::encode(artifact_id)
    )
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn ensure_directory(dir: &Path) -> Result<(), DownloadError> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(DownloadError::not_a_directory(dir)),
        Err(_) => tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| DownloadError::io(dir, e)),
    }
}

/// Temporary file that is deleted on drop unless [`keep`](Self::keep) is called.
struct PartFile {
    path: PathBuf,
    armed: bool,
}

impl PartFile {
    fn new(dir: &Path, filename: &str) -> Self {
        let tag: u32 = rand::random();
        Self {
            path: dir.join(format!(".{filename}.{tag:08x}.part")),
            armed: true,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.armed {
            debug!(path = %self.path.display(), "removing partial download");
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Streams response body to file, returning bytes written.
async fn stream_to_file(
    file: File,
    response: Response,
    buffer_size: usize,
    target: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::with_capacity(buffer_size.max(1), file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::stream(target, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    // Ensure all data is on disk before the rename makes it visible
    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;
    writer
        .into_inner()
        .sync_all()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}
