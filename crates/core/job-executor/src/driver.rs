//! The execution driver.
//!
//! Dispatches a resolved job graph: jobs are submitted once every producer
//! is satisfied, independent jobs run concurrently under a semaphore
//! ceiling, results are committed to the cache and written back through the
//! repository, and failures skip the affected downstream subgraph while the
//! rest of the run continues. Drivers sharing one cache coordinate through
//! per-output claims, so a given (pipeline, scope, fingerprint) job is
//! submitted at most once across concurrent runs.

use std::{sync::Arc, time::Duration};

use dep_resolver::{JobGraph, JobId, JobStatus, SkipReason};
use provenance_cache::{CacheStore, StoredResult};
use study_common::ParamValue;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::{
    compile::{CompiledOutput, JobCompiler, StagedValue},
    error::{ExecuteError, FailedJob, PipelineExecutionError},
    repository::RepositoryAdapter,
    scheduler::{JobHandle, SchedulerAdapter, SchedulerJobStatus},
};

struct InFlight {
    job: JobId,
    handle: JobHandle,
    outputs: Vec<CompiledOutput>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

/// Drives a [`JobGraph`] to completion against a scheduler.
pub struct ExecutionDriver<'a> {
    scheduler: &'a dyn SchedulerAdapter,
    repository: &'a dyn RepositoryAdapter,
    cache: &'a dyn CacheStore,
    compiler: JobCompiler<'a>,
    concurrency: Arc<Semaphore>,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl<'a> ExecutionDriver<'a> {
    pub fn new(
        scheduler: &'a dyn SchedulerAdapter,
        repository: &'a dyn RepositoryAdapter,
        cache: &'a dyn CacheStore,
        compiler: JobCompiler<'a>,
    ) -> Self {
        Self {
            scheduler,
            repository,
            cache,
            compiler,
            concurrency: Arc::new(Semaphore::new(4)),
            poll_interval: Duration::from_millis(50),
            cancel: CancellationToken::new(),
        }
    }

    /// Caps how many jobs are in flight at once, independent of any limit
    /// the scheduler itself enforces.
    pub fn with_concurrency(mut self, permits: usize) -> Self {
        self.concurrency = Arc::new(Semaphore::new(permits));
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Runs the graph and materializes the requested results.
    ///
    /// On failure, committed cache entries from succeeded jobs remain
    /// valid; only the requested items downstream of failures stay
    /// unresolved.
    #[tracing::instrument(skip_all, fields(jobs = graph.len()), err)]
    pub async fn run(&self, graph: &mut JobGraph) -> Result<Vec<StoredResult>, ExecuteError> {
        let mut in_flight: Vec<InFlight> = Vec::new();

        loop {
            let ready: Vec<JobId> = graph
                .pending()
                .filter(|job| {
                    job.dependencies()
                        .all(|dep| graph.job(dep).status().satisfies_dependents())
                })
                .map(|job| job.id())
                .collect();
            let mut blocked_on_claim = false;
            for id in ready {
                // Another executor sharing the cache may have produced this
                // job's outputs since resolution; re-check before submitting.
                if self.outputs_cached(graph, id).await? {
                    graph.set_status(id, JobStatus::Skipped(SkipReason::Cached));
                    tracing::debug!(job = %id, "outputs already cached");
                    continue;
                }
                let Ok(permit) = Arc::clone(&self.concurrency).try_acquire_owned() else {
                    break;
                };
                if !self.claim_outputs(graph, id).await? {
                    // A concurrent executor holds the claim; its commit will
                    // surface in the cache on a later pass.
                    blocked_on_claim = true;
                    continue;
                }
                let compiled = match self.compiler.compile(graph.job(id)).await {
                    Ok(compiled) => compiled,
                    Err(source) => {
                        self.release_outputs(graph, id).await?;
                        return Err(source.into());
                    }
                };
                let handle = match self.scheduler.submit(compiled.spec).await {
                    Ok(handle) => handle,
                    Err(source) => {
                        self.release_outputs(graph, id).await?;
                        return Err(source.into());
                    }
                };
                graph.set_status(id, JobStatus::Queued);
                tracing::debug!(job = %id, handle = %handle, "submitted");
                in_flight.push(InFlight {
                    job: id,
                    handle,
                    outputs: compiled.outputs,
                    _permit: permit,
                });
            }

            if in_flight.is_empty() && !blocked_on_claim {
                // Nothing running and nothing dispatchable: either the
                // graph is done, or what remains is blocked by failures.
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    for flight in &in_flight {
                        self.scheduler.cancel(&flight.handle).await?;
                        graph.set_status(flight.job, JobStatus::Cancelled);
                        self.release_outputs(graph, flight.job).await?;
                    }
                    return Err(ExecuteError::Cancelled);
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            let mut still_running = Vec::with_capacity(in_flight.len());
            for flight in in_flight {
                match self.scheduler.poll(&flight.handle).await? {
                    SchedulerJobStatus::Queued => still_running.push(flight),
                    SchedulerJobStatus::Running => {
                        graph.set_status(flight.job, JobStatus::Running);
                        still_running.push(flight);
                    }
                    SchedulerJobStatus::Succeeded => {
                        // commit clears the claim on each output
                        self.commit_outputs(&flight.outputs).await?;
                        graph.set_status(flight.job, JobStatus::Succeeded);
                        tracing::debug!(job = %flight.job, "succeeded");
                    }
                    SchedulerJobStatus::Failed { message } => {
                        tracing::warn!(job = %flight.job, message, "job failed");
                        graph.set_status(flight.job, JobStatus::Failed);
                        self.release_outputs(graph, flight.job).await?;
                        skip_dependents(graph, flight.job);
                    }
                }
            }
            in_flight = still_running;
        }

        // Anything still pending was transitively blocked by a failure
        let blocked: Vec<JobId> = graph.pending().map(|job| job.id()).collect();
        for id in blocked {
            graph.set_status(id, JobStatus::Skipped(SkipReason::FailedDependency));
        }

        let failed: Vec<FailedJob> = graph
            .jobs()
            .iter()
            .filter(|job| job.status() == JobStatus::Failed)
            .map(|job| FailedJob {
                pipeline: job.pipeline().clone(),
                scope: job.scope().clone(),
            })
            .collect();
        if !failed.is_empty() {
            let mut unresolved: Vec<_> = graph
                .jobs()
                .iter()
                .filter(|job| {
                    matches!(
                        job.status(),
                        JobStatus::Failed | JobStatus::Skipped(SkipReason::FailedDependency)
                    )
                })
                .flat_map(|job| job.outputs().iter().map(|o| o.item.clone()))
                .collect();
            unresolved.sort();
            unresolved.dedup();
            return Err(PipelineExecutionError { failed, unresolved }.into());
        }

        let mut results = Vec::with_capacity(graph.requested().len());
        for requested in graph.requested() {
            let result = match requested.job {
                Some(_) => self
                    .cache
                    .lookup(&requested.item, &requested.scope, &requested.fingerprint)
                    .await?
                    .ok_or_else(|| ExecuteError::MissingResult {
                        item: requested.item.clone(),
                    })?,
                None => {
                    self.repository
                        .fetch(&requested.item, &requested.scope)
                        .await?
                }
            };
            results.push(result);
        }
        Ok(results)
    }

    /// Whether every output of a job is already committed under its
    /// fingerprint.
    async fn outputs_cached(&self, graph: &JobGraph, id: JobId) -> Result<bool, ExecuteError> {
        let job = graph.job(id);
        for output in job.outputs() {
            let cached = self
                .cache
                .lookup(&output.item, &output.scope, job.fingerprint())
                .await?;
            if cached.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Claims every output of a job, rolling back on a denied claim so a
    /// partially claimed job leaves nothing held.
    async fn claim_outputs(&self, graph: &JobGraph, id: JobId) -> Result<bool, ExecuteError> {
        let job = graph.job(id);
        for (index, output) in job.outputs().iter().enumerate() {
            let acquired = self
                .cache
                .claim(&output.item, &output.scope, job.fingerprint())
                .await?;
            if !acquired {
                for prior in &job.outputs()[..index] {
                    self.cache
                        .release(&prior.item, &prior.scope, job.fingerprint())
                        .await?;
                }
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Releases a job's output claims after a failure or cancellation.
    async fn release_outputs(&self, graph: &JobGraph, id: JobId) -> Result<(), ExecuteError> {
        let job = graph.job(id);
        for output in job.outputs() {
            self.cache
                .release(&output.item, &output.scope, job.fingerprint())
                .await?;
        }
        Ok(())
    }

    /// Commits a succeeded job's outputs to the cache and writes them back
    /// through the repository.
    async fn commit_outputs(&self, outputs: &[CompiledOutput]) -> Result<(), ExecuteError> {
        for output in outputs {
            let result = match &output.staged {
                StagedValue::Fileset { path, format } => {
                    StoredResult::fileset(path.clone(), format.clone())
                }
                StagedValue::Field { path } => {
                    let text = tokio::fs::read_to_string(path).await.map_err(|source| {
                        ExecuteError::StagedOutput {
                            context: path.display().to_string(),
                            source,
                        }
                    })?;
                    StoredResult::field(parse_field(&text))
                }
            };
            self.cache
                .commit(&output.item, &output.scope, &output.fingerprint, result.clone())
                .await?;
            self.repository
                .store(&output.item, &output.scope, &result)
                .await?;
        }
        Ok(())
    }
}

/// Transitively skips every pending job downstream of a failure.
fn skip_dependents(graph: &mut JobGraph, failed: JobId) {
    let mut stack = vec![failed];
    while let Some(id) = stack.pop() {
        let downstream: Vec<JobId> = graph
            .dependents_of(id)
            .filter(|job| job.status() == JobStatus::Pending)
            .map(|job| job.id())
            .collect();
        for dep in downstream {
            graph.set_status(dep, JobStatus::Skipped(SkipReason::FailedDependency));
            stack.push(dep);
        }
    }
}

fn parse_field(text: &str) -> ParamValue {
    let trimmed = text.trim();
    if let Ok(value) = trimmed.parse::<bool>() {
        return value.into();
    }
    if let Ok(value) = trimmed.parse::<i64>() {
        return value.into();
    }
    if let Ok(value) = trimmed.parse::<f64>() {
        return value.into();
    }
    ParamValue::Str(trimmed.to_string())
}
