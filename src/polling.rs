//! Job polling state machine.
//!
//! [`await_completion`] drives a job from `pending` to a terminal state by
//! repeated status checks. The attempt budget here counts *status checks*;
//! each check goes through the transport's own retry policy for transient
//! failures, and the two counters never share a budget.
//!
//! The overall wait is bounded by the schedule and the attempt count, not by
//! wall-clock time: a process that is suspended resumes its remaining checks.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::error::ApiError;
use crate::job::{JobRecord, JobStatus};

/// Default number of status checks before giving up.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 30;

const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_BACKOFF_FACTOR: f64 = 1.2;
const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(30);

/// Wait between consecutive status checks.
#[derive(Debug, Clone, PartialEq)]
pub enum PollSchedule {
    /// The same interval after every check.
    Fixed(Duration),
    /// Interval starting at `initial`, multiplied by `factor` after each
    /// check and capped at `max`.
    Backoff {
        /// Wait after the first check.
        initial: Duration,
        /// Growth per check; values below 1.0 are treated as 1.0.
        factor: f64,
        /// Upper bound for any single wait.
        max: Duration,
    },
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::backoff_from(DEFAULT_INITIAL_INTERVAL)
    }
}

impl PollSchedule {
    /// Default backoff curve starting at `initial`.
    #[must_use]
    pub fn backoff_from(initial: Duration) -> Self {
        Self::Backoff {
            initial,
            factor: DEFAULT_BACKOFF_FACTOR,
            max: DEFAULT_MAX_INTERVAL.max(initial),
        }
    }

    /// Wait after status check number `attempt` (1-indexed).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(interval) => *interval,
            Self::Backoff {
                initial,
                factor,
                max,
            } => {
                let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
                let scaled = initial.as_secs_f64() * factor.max(1.0).powi(exponent);
                Duration::try_from_secs_f64(scaled).map_or(*max, |delay| delay.min(*max))
            }
        }
    }
}

/// Anything that can report the current state of a job.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Performs one status check.
    async fn check_status(&self, job_id: &str) -> Result<JobRecord, ApiError>;
}

/// Polls `job_id` until it reaches a terminal state.
///
/// # Errors
///
/// - [`ApiError::JobFailed`] when the job fails, or completes without artifacts
/// - [`ApiError::Expired`] when the job is reported expired (status or HTTP 410)
/// - [`ApiError::PollTimeout`] when `max_attempts` checks all saw `pending`
/// - any error from the status check itself, surfaced without further polling
#[instrument(skip(source, schedule))]
pub async fn await_completion<S>(
    source: &S,
    job_id: &str,
    schedule: &PollSchedule,
    max_attempts: u32,
) -> Result<JobRecord, ApiError>
where
    S: StatusSource + ?Sized,
{
    let max_attempts = max_attempts.max(1);
    let mut last_status: Option<JobStatus> = None;

    for attempt in 1..=max_attempts {
        let job = source.check_status(job_id).await?;

        if let Some(previous) = last_status
            && !previous.can_transition_to(job.status)
        {
            warn!(
                job_id,
                from = %previous,
                to = %job.status,
                "service reported an out-of-order status transition"
            );
        }
        last_status = Some(job.status);

        match job.status {
            JobStatus::Completed => {
                if job.artifacts.is_empty() {
                    return Err(ApiError::job_failed(
                        job.id,
                        "job completed without any generated files",
                    ));
                }
                info!(
                    job_id,
                    attempt,
                    artifacts = job.artifacts.len(),
                    "job completed"
                );
                return Ok(job);
            }
            JobStatus::Failed => {
                let reason = job
                    .error
                    .or(job.message)
                    .unwrap_or_else(|| "no error reported".to_string());
                return Err(ApiError::job_failed(job.id, reason));
            }
            JobStatus::Expired => {
                return Err(ApiError::Expired { resource: job.id });
            }
            JobStatus::Pending => {
                debug!(job_id, attempt, progress = job.progress, "job still pending");
                if attempt < max_attempts {
                    tokio::time::sleep(schedule.delay_for(attempt)).await;
                }
            }
        }
    }

    Err(ApiError::PollTimeout {
        job_id: job_id.to_string(),
        attempts: max_attempts,
    })
}
