//! Lifecycle client: create, await, download.
//!
//! [`NapkinClient`] composes the transport, the polling engine and the
//! downloader. Its only state is the shared quota tracker inside the
//! transport; every other value flows through the call that needs it, so one
//! client can drive many jobs concurrently.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use reqwest::Method;
use tracing::{debug, info, instrument};

use crate::config::{ClientConfig, ConfigError, PollSettings};
use crate::download::{Downloader, ResolvedFile};
use crate::error::ApiError;
use crate::job::{ArtifactRef, JobRecord, JobStatus};
use crate::polling::{self, PollSchedule, StatusSource};
use crate::request::GenerationRequest;
use crate::transport::{HttpTransport, QuotaState, RequestTarget};

const CREATE_PATH: &str = "/visual";

/// A finished generation: the completed job and the files written for it.
#[derive(Debug, Clone)]
pub struct Generation {
    /// The job as last reported by the service.
    pub job: JobRecord,
    /// One entry per artifact, in the job's artifact order.
    pub files: Vec<ResolvedFile>,
}

/// Client for the visual generation service.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use napkin_core::{ClientConfig, GenerationRequest, NapkinClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = NapkinClient::new(ClientConfig::from_env()?)?;
/// let request = GenerationRequest::builder("Pipeline: ingest, transform, publish").build()?;
///
/// let job = client.create(&request).await?;
/// let job = client.await_completion(&job.id).await?;
/// for artifact in &job.artifacts {
///     let file = client.download(artifact, Path::new("./visuals")).await?;
///     println!("{}", file.path.display());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct NapkinClient {
    transport: Arc<HttpTransport>,
    downloader: Downloader,
    poll: PollSettings,
}

impl NapkinClient {
    /// Builds a client from an immutable configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the HTTP client cannot be built from the
    /// configuration.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        let downloader = Downloader::new(Arc::clone(&transport), config.download_settings());
        Ok(Self {
            transport,
            downloader,
            poll: config.poll_settings().clone(),
        })
    }

    /// Submits a generation request.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidRequest`] for rejected parameters,
    /// [`ApiError::Authentication`] for a rejected credential, and
    /// [`ApiError::RateLimited`] or [`ApiError::Transient`] once retries run out.
    #[instrument(skip(self, request), fields(content_chars = request.content_len(), format = %request.format()))]
    pub async fn create(&self, request: &GenerationRequest) -> Result<JobRecord, ApiError> {
        let body = serde_json::to_value(request)
            .map_err(|e| ApiError::invalid_request(format!("request not serializable: {e}")))?;
        let bytes = self
            .transport
            .execute_body(Method::POST, RequestTarget::Path(CREATE_PATH), Some(&body))
            .await?;
        let job = JobRecord::from_json(&bytes, None)
            .map_err(|detail| ApiError::unexpected(CREATE_PATH, detail))?;
        info!(job_id = %job.id, status = %job.status, "generation request accepted");
        Ok(job)
    }

    /// Performs one status check.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] for unknown ids, [`ApiError::Expired`]
    /// for jobs past their TTL, and [`ApiError::Authentication`] for jobs owned
    /// by another credential.
    #[instrument(skip(self))]
    pub async fn status(&self, job_id: &str) -> Result<JobRecord, ApiError> {
        let job_id = require_job_id(job_id)?;
        let path = status_path(job_id);
        let bytes = self
            .transport
            .execute_body(Method::GET, RequestTarget::Path(&path), None)
            .await?;
        let job = JobRecord::from_json(&bytes, Some(job_id))
            .map_err(|detail| ApiError::unexpected(path.as_str(), detail))?;
        debug!(status = %job.status, progress = job.progress, "status checked");
        Ok(job)
    }

    /// Polls until the job is terminal, using the configured schedule.
    ///
    /// # Errors
    ///
    /// See [`polling::await_completion`].
    pub async fn await_completion(&self, job_id: &str) -> Result<JobRecord, ApiError> {
        self.await_completion_with(job_id, &self.poll.schedule, self.poll.max_attempts)
            .await
    }

    /// Polls until the job is terminal, using a caller-supplied schedule.
    ///
    /// # Errors
    ///
    /// See [`polling::await_completion`].
    pub async fn await_completion_with(
        &self,
        job_id: &str,
        schedule: &PollSchedule,
        max_attempts: u32,
    ) -> Result<JobRecord, ApiError> {
        let job_id = require_job_id(job_id)?;
        polling::await_completion(self, job_id, schedule, max_attempts).await
    }

    /// Downloads one artifact into `dest_dir`.
    ///
    /// # Errors
    ///
    /// See [`Downloader::download`].
    pub async fn download(
        &self,
        artifact: &ArtifactRef,
        dest_dir: &Path,
    ) -> Result<ResolvedFile, ApiError> {
        self.downloader.download(artifact, dest_dir).await
    }

    /// Downloads every artifact of a completed job, in order.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::JobFailed`] when the job is not completed or has no
    /// artifacts, otherwise the first download error.
    #[instrument(skip(self, job, dest_dir), fields(job_id = %job.id))]
    pub async fn download_all(
        &self,
        job: &JobRecord,
        dest_dir: &Path,
    ) -> Result<Vec<ResolvedFile>, ApiError> {
        if job.status != JobStatus::Completed {
            return Err(ApiError::job_failed(
                job.id.clone(),
                format!("cannot download from a job that is {}", job.status),
            ));
        }
        if job.artifacts.is_empty() {
            return Err(ApiError::job_failed(
                job.id.clone(),
                "job completed without any generated files",
            ));
        }

        let mut files = Vec::with_capacity(job.artifacts.len());
        for artifact in &job.artifacts {
            files.push(self.download(artifact, dest_dir).await?);
        }
        Ok(files)
    }

    /// Creates a job, waits for it, and downloads its artifacts.
    ///
    /// # Errors
    ///
    /// Any error from [`create`](Self::create),
    /// [`await_completion`](Self::await_completion) or
    /// [`download_all`](Self::download_all).
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        dest_dir: &Path,
    ) -> Result<Generation, ApiError> {
        let created = self.create(request).await?;
        let job = self.await_completion(&created.id).await?;
        let files = self.download_all(&job, dest_dir).await?;
        Ok(Generation { job, files })
    }

    /// Runs [`generate`](Self::generate) for many requests with at most
    /// `concurrency` in flight.
    ///
    /// Request `i` (0-based) writes into `dest_dir/batch_{i+1:03}`. Results come
    /// back in input order, one per request; a failure in one does not stop
    /// the others.
    #[instrument(skip(self, requests, dest_dir), fields(requests = requests.len()))]
    pub async fn generate_batch(
        &self,
        requests: &[GenerationRequest],
        dest_dir: &Path,
        concurrency: usize,
    ) -> Vec<Result<Generation, ApiError>> {
        let results: Vec<Result<Generation, ApiError>> =
            stream::iter(requests.iter().enumerate())
                .map(|(index, request)| {
                    let batch_dir = dest_dir.join(format!("batch_{:03}", index + 1));
                    async move { self.generate(request, &batch_dir).await }
                })
                .buffered(concurrency.max(1))
                .collect()
                .await;

        let failed = results.iter().filter(|result| result.is_err()).count();
        info!(
            succeeded = results.len() - failed,
            failed, "batch generation finished"
        );
        results
    }

    /// Latest quota reported by the service, if any call has seen one.
    #[must_use]
    pub fn quota(&self) -> Option<QuotaState> {
        self.transport.tracker().snapshot()
    }
}

#[async_trait]
impl StatusSource for NapkinClient {
    async fn check_status(&self, job_id: &str) -> Result<JobRecord, ApiError> {
        self.status(job_id).await
    }
}

fn require_job_id(job_id: &str) -> Result<&str, ApiError> {
    let trimmed = job_id.trim();
    if trimmed.is_empty() {
        return Err(ApiError::invalid_request("job id must not be empty"));
    }
    Ok(trimmed)
}

fn status_path(job_id: &str) -> String {
    format!("/visual/{}/status", urlencoding::encode(job_id))
}
