//! Submit an outfit image once and drive the resulting job to a terminal
//! state by bounded polling.
//!
//! ```text
//! submit_and_await()
//!   ├─ upload()                       // exactly once, never retried
//!   │    select (biased):
//!   │      cancel      → Cancelled
//!   │      stall timer → UploadFailed  // also covers the wait for the job id
//!   │      deadline    → UploadFailed
//!   │      progress    → reset stall timer, emit Uploading
//!   │      response    → JobHandle | UploadFailed
//!   └─ poll(handle)
//!        for attempt in 1..=max_attempts:
//!          sleep(poll_interval)        // cancellable
//!          job_status() with timeout   // cancellable
//!            completed   → Ok(outcome)
//!            error       → ProcessingFailed
//!            processing  → continue
//!            failure     → inconclusive, continue
//!        → PollTimeout
//! ```

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::models::job::{AnalysisOutcome, JobHandle, JobStatus};
use crate::models::upload::UploadRequest;
use crate::services::analysis::JobService;
use crate::services::stall::StallTimer;

/// Channel for progress events emitted while a job is submitted and polled.
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Wait before each status check.
    pub poll_interval: Duration,
    /// Upper bound on status checks.
    pub max_attempts: u32,
    /// Abort the upload if the service hasn't answered by then.
    pub upload_timeout: Duration,
    /// Timeout for one status check.
    pub status_timeout: Duration,
    /// Abort the upload if no bytes move for this long.
    pub stall_timeout: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1_000),
            max_attempts: 300,
            upload_timeout: Duration::from_millis(120_000),
            status_timeout: Duration::from_millis(10_000),
            stall_timeout: Some(Duration::from_millis(30_000)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Cumulative image bytes handed to the transport.
    Uploading { bytes_sent: u64, total_bytes: u64 },
    /// The service accepted the upload.
    Submitted { job_id: String },
    /// One status check finished.
    Polled { attempt: u32, observation: Observation },
}

/// What a single status check saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Processing,
    /// The check failed or timed out; counted as still processing.
    Inconclusive(String),
    Completed,
    Error,
}

/// Drives analysis jobs through a [`JobService`].
///
/// Holds no per-call state, so one poller can serve any number of
/// concurrent `submit_and_await` calls.
pub struct JobPoller<S> {
    service: S,
}

impl<S: JobService> JobPoller<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    /// Upload `request` once, then poll its job until it completes, fails,
    /// runs out of attempts, or `cancel` fires.
    pub async fn submit_and_await(
        &self,
        request: &UploadRequest,
        config: &PollConfig,
        cancel: &CancellationToken,
        progress: Option<ProgressSender>,
    ) -> Result<AnalysisOutcome, PollError> {
        let span = tracing::info_span!(
            "submit_and_await",
            call_id = %Uuid::new_v4(),
            user_id = %request.user_id()
        );

        async move {
            let reporter = Reporter(progress);
            metrics::counter!("analysis_jobs_submitted_total").increment(1);

            let result = match self.upload(request, config, cancel, &reporter).await {
                Ok(handle) => self.poll(handle, config, cancel, &reporter).await,
                Err(e) => Err(e),
            };

            record_outcome(&result);
            result
        }
        .instrument(span)
        .await
    }

    async fn upload(
        &self,
        request: &UploadRequest,
        config: &PollConfig,
        cancel: &CancellationToken,
        reporter: &Reporter,
    ) -> Result<JobHandle, PollError> {
        let total_bytes = request.len() as u64;
        let (tap, mut sent_rx) = mpsc::unbounded_channel();

        let submit = self.service.submit(request, tap);
        tokio::pin!(submit);
        let deadline = sleep(config.upload_timeout);
        tokio::pin!(deadline);
        let mut stall = StallTimer::new(config.stall_timeout);

        tracing::info!(
            bytes = total_bytes,
            format = ?request.format(),
            "Uploading outfit image"
        );

        // Precedence when several branches are ready together:
        // cancel, stall, total timeout, response.
        let submitted = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Upload cancelled");
                    return Err(PollError::Cancelled { job_id: None, attempts: 0 });
                }
                _ = stall.expired() => {
                    let stall_ms = stall.bound().unwrap_or_default().as_millis();
                    tracing::warn!(stall_ms = stall_ms as u64, "Upload stalled, aborting");
                    return Err(PollError::UploadFailed {
                        message: format!("upload stalled: no progress for {} ms", stall_ms),
                    });
                }
                _ = &mut deadline => {
                    let timeout_ms = config.upload_timeout.as_millis();
                    tracing::warn!(timeout_ms = timeout_ms as u64, "Upload timed out, aborting");
                    return Err(PollError::UploadFailed {
                        message: format!("upload timed out after {} ms", timeout_ms),
                    });
                }
                // The wait for the job id after the last byte counts as no progress too.
                Some(bytes_sent) = sent_rx.recv() => {
                    stall.reset();
                    reporter.emit(ProgressEvent::Uploading { bytes_sent, total_bytes });
                }
                result = &mut submit => break result,
            }
        };

        // Ticks sent in the same poll that produced the response.
        while let Ok(bytes_sent) = sent_rx.try_recv() {
            reporter.emit(ProgressEvent::Uploading { bytes_sent, total_bytes });
        }

        let handle = submitted.map_err(|e| {
            tracing::warn!(error = %e, "Upload failed");
            PollError::UploadFailed {
                message: e.to_string(),
            }
        })?;

        tracing::info!(job_id = %handle.job_id, "Upload accepted, polling job");
        reporter.emit(ProgressEvent::Submitted {
            job_id: handle.job_id.clone(),
        });

        Ok(handle)
    }

    async fn poll(
        &self,
        handle: JobHandle,
        config: &PollConfig,
        cancel: &CancellationToken,
        reporter: &Reporter,
    ) -> Result<AnalysisOutcome, PollError> {
        let mut last_status: Option<String> = None;

        for attempt in 1..=config.max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(job_id = %handle.job_id, attempts = attempt - 1, "Polling cancelled");
                    return Err(PollError::Cancelled {
                        job_id: Some(handle.job_id),
                        attempts: attempt - 1,
                    });
                }
                _ = sleep(config.poll_interval) => {}
            }

            // Dropping the status future on cancel aborts the request.
            let checked = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(job_id = %handle.job_id, attempts = attempt, "Polling cancelled");
                    return Err(PollError::Cancelled {
                        job_id: Some(handle.job_id),
                        attempts: attempt,
                    });
                }
                checked = timeout(config.status_timeout, self.service.job_status(&handle)) => checked,
            };

            let observation = match checked {
                Ok(Ok(JobStatus::Completed(results))) => {
                    tracing::info!(job_id = %handle.job_id, attempts = attempt, "Job completed");
                    reporter.emit(ProgressEvent::Polled {
                        attempt,
                        observation: Observation::Completed,
                    });
                    return Ok(AnalysisOutcome {
                        job_id: handle.job_id,
                        results,
                        attempts: attempt,
                    });
                }
                Ok(Ok(JobStatus::Error(message))) => {
                    tracing::warn!(
                        job_id = %handle.job_id,
                        attempts = attempt,
                        error = %message,
                        "Job failed on the service"
                    );
                    reporter.emit(ProgressEvent::Polled {
                        attempt,
                        observation: Observation::Error,
                    });
                    return Err(PollError::ProcessingFailed {
                        job_id: handle.job_id,
                        message,
                        attempts: attempt,
                    });
                }
                Ok(Ok(JobStatus::Processing)) => {
                    if attempt % 10 == 0 {
                        tracing::info!(
                            job_id = %handle.job_id,
                            attempt,
                            max_attempts = config.max_attempts,
                            "Still processing"
                        );
                    } else {
                        tracing::debug!(job_id = %handle.job_id, attempt, "Still processing");
                    }
                    Observation::Processing
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        job_id = %handle.job_id,
                        attempt,
                        error = %e,
                        "Status check failed, treating as inconclusive"
                    );
                    Observation::Inconclusive(e.to_string())
                }
                Err(_) => {
                    let reason = format!(
                        "status check timed out after {} ms",
                        config.status_timeout.as_millis()
                    );
                    tracing::warn!(job_id = %handle.job_id, attempt, "{}", reason);
                    Observation::Inconclusive(reason)
                }
            };

            last_status = Some(match &observation {
                Observation::Inconclusive(reason) => reason.clone(),
                _ => JobStatus::Processing.as_str().to_string(),
            });
            reporter.emit(ProgressEvent::Polled {
                attempt,
                observation,
            });
        }

        tracing::warn!(
            job_id = %handle.job_id,
            attempts = config.max_attempts,
            last_status = last_status.as_deref().unwrap_or("none"),
            "Job did not reach a terminal state"
        );

        Err(PollError::PollTimeout {
            job_id: handle.job_id,
            attempts: config.max_attempts,
            last_status,
        })
    }
}

struct Reporter(Option<ProgressSender>);

impl Reporter {
    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.0 {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(event);
        }
    }
}

fn record_outcome(result: &Result<AnalysisOutcome, PollError>) {
    match result {
        Ok(outcome) => {
            metrics::counter!("analysis_jobs_completed_total").increment(1);
            metrics::histogram!("analysis_poll_attempts").record(outcome.attempts as f64);
        }
        Err(e) => {
            metrics::counter!("analysis_jobs_failed_total", "reason" => e.kind()).increment(1);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    /// Submission failed; no job exists and nothing was polled.
    #[error("Upload failed: {message}")]
    UploadFailed { message: String },

    /// The service reported `error` for the job.
    #[error("Job {job_id} failed after {attempts} status checks: {message}")]
    ProcessingFailed {
        job_id: String,
        message: String,
        attempts: u32,
    },

    /// No terminal state within the attempt budget. Resubmit as a new job.
    #[error("Job {job_id} did not finish within {attempts} status checks")]
    PollTimeout {
        job_id: String,
        attempts: u32,
        last_status: Option<String>,
    },

    #[error("Cancelled after {attempts} status checks")]
    Cancelled {
        job_id: Option<String>,
        attempts: u32,
    },
}

impl PollError {
    pub fn kind(&self) -> &'static str {
        match self {
            PollError::UploadFailed { .. } => "upload_failed",
            PollError::ProcessingFailed { .. } => "processing_failed",
            PollError::PollTimeout { .. } => "poll_timeout",
            PollError::Cancelled { .. } => "cancelled",
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            PollError::UploadFailed { .. } => None,
            PollError::ProcessingFailed { job_id, .. } | PollError::PollTimeout { job_id, .. } => {
                Some(job_id)
            }
            PollError::Cancelled { job_id, .. } => job_id.as_deref(),
        }
    }

    /// Last status text known when the error was raised, if any.
    pub fn last_status(&self) -> Option<&str> {
        match self {
            PollError::UploadFailed { message } | PollError::ProcessingFailed { message, .. } => {
                Some(message)
            }
            PollError::PollTimeout { last_status, .. } => last_status.as_deref(),
            PollError::Cancelled { .. } => None,
        }
    }
}
