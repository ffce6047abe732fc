//! Execution error types.

use provenance_cache::CacheError;
use study_common::{ItemName, PipelineName, ScopeKey};

use crate::{compile::CompileError, repository::RepositoryError, scheduler::SchedulerError};

/// One job that failed during a run.
#[derive(Debug, Clone)]
pub struct FailedJob {
    pub pipeline: PipelineName,
    pub scope: ScopeKey,
}

impl std::fmt::Display for FailedJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.pipeline, self.scope)
    }
}

/// A run in which at least one job failed.
///
/// Enumerates the failed jobs and every item left unresolved, including
/// those of downstream jobs skipped because of the failures.
#[derive(Debug, thiserror::Error)]
#[error(
    "execution failed: {} job(s) failed ({}); unresolved items: {}",
    failed.len(),
    failed.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
    unresolved.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
)]
pub struct PipelineExecutionError {
    pub failed: Vec<FailedJob>,
    pub unresolved: Vec<ItemName>,
}

/// Errors raised while driving a job graph to completion.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Execution(#[from] PipelineExecutionError),

    /// A succeeded job's requested output never appeared in the cache.
    #[error("no cached result for requested item '{item}'")]
    MissingResult { item: ItemName },

    #[error("failed to read staged output at {context}")]
    StagedOutput {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("run cancelled")]
    Cancelled,
}
