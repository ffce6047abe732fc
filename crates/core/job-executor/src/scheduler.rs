//! The batch scheduler adapter.
//!
//! The engine hands compiled job specs to a scheduler and polls them to
//! completion. Retry policy lives on the adapter side: the engine itself
//! never resubmits a failed job.

use std::time::Duration;

use async_trait::async_trait;

use crate::compile::JobSpec;

/// An opaque scheduler-side job identifier.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Scheduler-side lifecycle of a submitted job.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerJobStatus {
    Queued,
    Running,
    Succeeded,
    Failed { message: String },
}

impl SchedulerJobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SchedulerJobStatus::Succeeded | SchedulerJobStatus::Failed { .. }
        )
    }
}

/// Adapter-side retry policy.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Times a failed job command is re-run before the job is reported
    /// failed.
    pub max_retries: usize,
    /// Initial backoff between retry attempts.
    pub retry_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Errors raised by scheduler operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("unknown job handle '{0}'")]
    UnknownHandle(JobHandle),

    #[error("scheduler backend error")]
    Backend(#[source] study_common::BoxError),
}

/// Dispatches compiled jobs to a batch execution backend.
#[async_trait]
pub trait SchedulerAdapter: Send + Sync {
    /// Submits a job for execution, returning immediately.
    async fn submit(&self, spec: JobSpec) -> Result<JobHandle, SchedulerError>;

    /// Reports the current status of a submitted job.
    async fn poll(&self, handle: &JobHandle) -> Result<SchedulerJobStatus, SchedulerError>;

    /// Cancels a submitted job. Cancelling a finished job is a no-op.
    async fn cancel(&self, handle: &JobHandle) -> Result<(), SchedulerError>;
}
