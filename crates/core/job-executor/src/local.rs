//! A scheduler that runs jobs as local processes.
//!
//! Useful for small studies and tests; the same engine drives a cluster
//! scheduler through the identical [`SchedulerAdapter`] surface.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable as _};
use tokio::sync::RwLock;

use crate::{
    compile::JobSpec,
    scheduler::{JobHandle, SchedulerAdapter, SchedulerConfig, SchedulerError, SchedulerJobStatus},
};

#[derive(Debug)]
struct LocalJob {
    status: SchedulerJobStatus,
    task: Option<tokio::task::AbortHandle>,
}

/// Runs each submitted job's steps sequentially as local child processes,
/// retrying failed jobs per the configured policy.
pub struct LocalScheduler {
    config: SchedulerConfig,
    next_id: AtomicU64,
    jobs: Arc<RwLock<BTreeMap<JobHandle, LocalJob>>>,
}

impl LocalScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(0),
            jobs: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for LocalScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

#[async_trait]
impl SchedulerAdapter for LocalScheduler {
    #[tracing::instrument(skip(self, spec), fields(job = %spec.name), err)]
    async fn submit(&self, spec: JobSpec) -> Result<JobHandle, SchedulerError> {
        let handle = JobHandle::new(format!(
            "local-{}",
            self.next_id.fetch_add(1, Ordering::Relaxed)
        ));

        let jobs = Arc::clone(&self.jobs);
        let config = self.config.clone();
        let task_handle = handle.clone();
        let task = tokio::spawn(async move {
            set_status(&jobs, &task_handle, SchedulerJobStatus::Running).await;

            let attempt = || async { run_steps(&spec).await };
            let backoff = ExponentialBuilder::default()
                .with_min_delay(config.retry_backoff)
                .with_max_times(config.max_retries);
            let status = match attempt.retry(backoff).await {
                Ok(()) => SchedulerJobStatus::Succeeded,
                Err(message) => SchedulerJobStatus::Failed { message },
            };
            set_status(&jobs, &task_handle, status).await;
        });

        self.jobs.write().await.insert(
            handle.clone(),
            LocalJob {
                status: SchedulerJobStatus::Queued,
                task: Some(task.abort_handle()),
            },
        );
        Ok(handle)
    }

    async fn poll(&self, handle: &JobHandle) -> Result<SchedulerJobStatus, SchedulerError> {
        self.jobs
            .read()
            .await
            .get(handle)
            .map(|j| j.status.clone())
            .ok_or_else(|| SchedulerError::UnknownHandle(handle.clone()))
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(handle)
            .ok_or_else(|| SchedulerError::UnknownHandle(handle.clone()))?;
        if !job.status.is_terminal() {
            if let Some(task) = job.task.take() {
                task.abort();
            }
            job.status = SchedulerJobStatus::Failed {
                message: "cancelled".to_string(),
            };
        }
        Ok(())
    }
}

async fn set_status(
    jobs: &RwLock<BTreeMap<JobHandle, LocalJob>>,
    handle: &JobHandle,
    status: SchedulerJobStatus,
) {
    let mut jobs = jobs.write().await;
    match jobs.get_mut(handle) {
        // Cancellation wins over a racing completion
        Some(job) if !job.status.is_terminal() => job.status = status,
        Some(_) => {}
        None => {
            jobs.insert(
                handle.clone(),
                LocalJob {
                    status,
                    task: None,
                },
            );
        }
    }
}

/// Runs every step of a job, enforcing each step's wall-time ceiling.
async fn run_steps(spec: &JobSpec) -> Result<(), String> {
    for step in &spec.steps {
        let Some((program, args)) = step.argv.split_first() else {
            return Err(format!("step '{}' has an empty command", step.node));
        };
        let mut command = tokio::process::Command::new(program);
        command.args(args);
        // Aborted tasks must not leave orphan children behind
        command.kill_on_drop(true);
        if !step.software.is_empty() {
            command.env("DERIVATA_MODULES", step.software.join(":"));
        }

        let ceiling = Duration::from_secs(u64::from(step.wall_time_mins) * 60);
        let status = tokio::time::timeout(ceiling, async {
            command
                .status()
                .await
                .map_err(|e| format!("step '{}' failed to spawn: {e}", step.node))
        })
        .await
        .map_err(|_| format!("step '{}' exceeded its wall-time ceiling", step.node))??;

        if !status.success() {
            return Err(format!("step '{}' exited with {status}", step.node));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::LocalScheduler;
    use crate::{
        compile::{CompiledStep, JobSpec},
        scheduler::{SchedulerAdapter, SchedulerConfig, SchedulerJobStatus},
    };

    fn spec(argv: &[&str]) -> JobSpec {
        JobSpec {
            name: "test-job".to_string(),
            steps: vec![CompiledStep {
                node: "node1".into(),
                argv: argv.iter().map(|s| s.to_string()).collect(),
                wall_time_mins: 1,
                software: Vec::new(),
            }],
            wall_time_mins: 1,
        }
    }

    async fn poll_to_terminal(
        scheduler: &LocalScheduler,
        handle: &crate::scheduler::JobHandle,
    ) -> SchedulerJobStatus {
        for _ in 0..500 {
            let status = scheduler.poll(handle).await.expect("poll succeeds");
            if status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job did not reach a terminal status");
    }

    #[tokio::test]
    async fn successful_command_reports_succeeded() {
        //* Given
        let scheduler = LocalScheduler::default();

        //* When
        let handle = scheduler
            .submit(spec(&["true"]))
            .await
            .expect("submit succeeds");

        //* Then
        assert_eq!(
            poll_to_terminal(&scheduler, &handle).await,
            SchedulerJobStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn failing_command_reports_failed_after_retries() {
        //* Given
        let scheduler = LocalScheduler::new(SchedulerConfig {
            max_retries: 2,
            retry_backoff: Duration::from_millis(1),
        });

        //* When
        let handle = scheduler
            .submit(spec(&["false"]))
            .await
            .expect("submit succeeds");

        //* Then
        assert!(matches!(
            poll_to_terminal(&scheduler, &handle).await,
            SchedulerJobStatus::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn cancel_aborts_a_running_job() {
        //* Given
        let scheduler = LocalScheduler::default();
        let handle = scheduler
            .submit(spec(&["sleep", "600"]))
            .await
            .expect("submit succeeds");

        //* When
        scheduler.cancel(&handle).await.expect("cancel succeeds");

        //* Then
        assert!(matches!(
            scheduler.poll(&handle).await.expect("poll succeeds"),
            SchedulerJobStatus::Failed { .. }
        ));
    }
}
