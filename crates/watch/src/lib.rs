//! Client-side job polling.
//!
//! [`watch`] polls a [`StatusSource`] at a per-job-type cadence until the
//! job reaches a terminal state or the watcher is cancelled, invoking an
//! observer on every observable change. Transient fetch failures are
//! reported to the observer and polling continues; a missing job is
//! fatal.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use parrot_core::job::{JobSnapshot, JobType};
use parrot_core::types::JobId;

/// Where job snapshots come from. In production an HTTP client against
/// the status endpoint; in tests a scripted fake.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch(&self, job_id: JobId) -> Result<JobSnapshot, WatchError>;
}

/// Errors surfaced while watching a job.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The job does not exist on the server. Fatal: polling stops.
    #[error("job {0} not found")]
    NotFound(JobId),

    /// The server could not be reached or answered abnormally.
    /// Transient: the watcher keeps polling.
    #[error("status fetch failed: {0}")]
    Unavailable(String),
}

/// What the watcher reports to its observer.
#[derive(Debug)]
pub enum WatchEvent {
    /// A snapshot whose status, stage, or progress differs from the
    /// previous one.
    Update(JobSnapshot),
    /// A transient fetch failure. The next tick proceeds as scheduled.
    FetchFailed(String),
}

/// Poll cadence per job type.
///
/// Synthesis jobs finish in seconds to minutes and poll faster; training
/// and cover jobs run for minutes to hours.
pub fn poll_interval(job_type: JobType) -> Duration {
    match job_type {
        JobType::Tts => Duration::from_secs(2),
        JobType::EnrollSpeaking | JobType::EnrollSinging | JobType::Cover => {
            Duration::from_secs(3)
        }
    }
}

/// Whether two snapshots differ in anything an observer cares about.
fn changed(previous: Option<&JobSnapshot>, current: &JobSnapshot) -> bool {
    match previous {
        None => true,
        Some(previous) => {
            previous.status != current.status
                || previous.current_stage != current.current_stage
                || previous.progress_percent != current.progress_percent
        }
    }
}

/// Poll `source` for `job_id` every `interval` until the job is terminal
/// or `cancel` fires.
///
/// `observer` receives a [`WatchEvent::Update`] for every snapshot whose
/// status, stage, or progress differs from the previous one, including
/// the terminal snapshot, and a [`WatchEvent::FetchFailed`] for every
/// transient fetch failure. Returns `Ok(Some(snapshot))` on a terminal
/// state and `Ok(None)` on cancellation.
pub async fn watch<F>(
    source: &dyn StatusSource,
    job_id: JobId,
    interval: Duration,
    cancel: CancellationToken,
    mut observer: F,
) -> Result<Option<JobSnapshot>, WatchError>
where
    F: FnMut(WatchEvent),
{
    let mut ticker = tokio::time::interval(interval);
    let mut last: Option<JobSnapshot> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(job_id = %job_id, "Watch cancelled");
                return Ok(None);
            }
            _ = ticker.tick() => {
                match source.fetch(job_id).await {
                    Ok(snapshot) => {
                        if changed(last.as_ref(), &snapshot) {
                            observer(WatchEvent::Update(snapshot.clone()));
                        }
                        if snapshot.is_terminal() {
                            return Ok(Some(snapshot));
                        }
                        last = Some(snapshot);
                    }
                    Err(WatchError::NotFound(id)) => {
                        return Err(WatchError::NotFound(id));
                    }
                    Err(WatchError::Unavailable(message)) => {
                        tracing::warn!(
                            job_id = %job_id,
                            error = %message,
                            "Status fetch failed, will retry",
                        );
                        observer(WatchEvent::FetchFailed(message));
                    }
                }
            }
        }
    }
}
