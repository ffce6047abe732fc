//! Jobs and the resolved job graph.

use std::collections::{BTreeMap, BTreeSet};

use pipeline_graph::{NodeGraph, Requirements};
use study_common::{Fingerprint, ItemName, ParamName, ParamValue, PipelineName, ScopeKey};

/// Index of a job within its [`JobGraph`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct JobId(pub(crate) usize);

impl JobId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a job was skipped rather than dispatched.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SkipReason {
    /// Every consumer's demand was satisfied by an existing cache entry.
    Cached,
    /// An upstream job failed, so this job can never run.
    FailedDependency,
}

/// Lifecycle of one job.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum JobStatus {
    Pending,
    Queued,
    Running,
    Succeeded,
    Failed,
    /// Withdrawn from the scheduler before completion; distinct from
    /// [`JobStatus::Failed`] so a cancelled run is not reported as broken.
    Cancelled,
    Skipped(SkipReason),
}

impl JobStatus {
    /// Whether this status satisfies a downstream dependency edge.
    pub fn satisfies_dependents(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Skipped(SkipReason::Cached)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Skipped(_)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Skipped(SkipReason::Cached) => "skipped (cached)",
            JobStatus::Skipped(SkipReason::FailedDependency) => "skipped (failed dependency)",
        };
        f.write_str(s)
    }
}

/// One resolved input of a job.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub item: ItemName,
    pub scope: ScopeKey,
    pub fingerprint: Fingerprint,
    /// Acquired inputs are fetched from the repository; derived inputs
    /// come out of the cache.
    pub acquired: bool,
}

/// One item a job materializes, at its own frequency scope.
#[derive(Debug, Clone)]
pub struct JobOutput {
    pub item: ItemName,
    pub scope: ScopeKey,
}

/// One unit of work: a pipeline invocation at a concrete scope, identified
/// by (pipeline, scope key, fingerprint).
#[derive(Debug, Clone)]
pub struct Job {
    pub(crate) id: JobId,
    pub(crate) pipeline: PipelineName,
    pub(crate) scope: ScopeKey,
    pub(crate) fingerprint: Fingerprint,
    pub(crate) graph: NodeGraph,
    /// Parameter values the pipeline build read, for command rendering.
    pub(crate) params: BTreeMap<ParamName, ParamValue>,
    pub(crate) default_requirements: Requirements,
    pub(crate) outputs: Vec<JobOutput>,
    pub(crate) inputs: Vec<ResolvedInput>,
    pub(crate) dependencies: BTreeSet<JobId>,
    pub(crate) status: JobStatus,
}

impl Job {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn pipeline(&self) -> &PipelineName {
        &self.pipeline
    }

    pub fn scope(&self) -> &ScopeKey {
        &self.scope
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// The node graph the producing pipeline built for this invocation.
    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    pub fn params(&self) -> &BTreeMap<ParamName, ParamValue> {
        &self.params
    }

    /// Pipeline-level requirements, applied to nodes without an override.
    pub fn default_requirements(&self) -> &Requirements {
        &self.default_requirements
    }

    pub fn outputs(&self) -> &[JobOutput] {
        &self.outputs
    }

    pub fn inputs(&self) -> &[ResolvedInput] {
        &self.inputs
    }

    /// Jobs that must be satisfied before this one can run.
    pub fn dependencies(&self) -> impl Iterator<Item = JobId> + '_ {
        self.dependencies.iter().copied()
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }
}

/// The final output a caller demanded, with the fingerprint under which its
/// value is (or will be) cached.
#[derive(Debug, Clone)]
pub struct RequestedOutput {
    pub item: ItemName,
    pub scope: ScopeKey,
    pub fingerprint: Fingerprint,
    /// The producing job, absent for acquired items.
    pub job: Option<JobId>,
}

/// A pruned DAG of jobs in deterministic topological order.
///
/// Producers always precede consumers; topological ties are broken by the
/// registry declaration index of the jobs' output items, so the same demand
/// always yields the same ordering.
#[derive(Debug, Clone)]
pub struct JobGraph {
    jobs: Vec<Job>,
    requested: Vec<RequestedOutput>,
}

impl JobGraph {
    pub(crate) fn new(jobs: Vec<Job>, requested: Vec<RequestedOutput>) -> Self {
        Self { jobs, requested }
    }

    /// Jobs in topological order.
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn job(&self, id: JobId) -> &Job {
        &self.jobs[id.0]
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// The demanded items this graph materializes.
    pub fn requested(&self) -> &[RequestedOutput] {
        &self.requested
    }

    /// Jobs awaiting dispatch.
    pub fn pending(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter().filter(|j| j.status == JobStatus::Pending)
    }

    /// Jobs with a dependency edge on `id`.
    pub fn dependents_of(&self, id: JobId) -> impl Iterator<Item = &Job> {
        self.jobs
            .iter()
            .filter(move |j| j.dependencies.contains(&id))
    }

    pub fn set_status(&mut self, id: JobId, status: JobStatus) {
        self.jobs[id.0].status = status;
    }
}
