//! The demand-driven resolver.
//!
//! Resolution starts from demanded items and walks backwards through the
//! producing pipelines declared in the registry. Along the walk it computes
//! transitive fingerprints bottom-up, consults the cache to prune work that
//! already exists, and deduplicates pipeline invocations by
//! (pipeline, scope key, fingerprint). The output is a [`JobGraph`]: only
//! the jobs that actually need to run (plus cached producers, marked
//! skipped), in deterministic topological order.

use std::collections::{BTreeMap, BTreeSet};

use futures::{FutureExt as _, future::BoxFuture};
use pipeline_graph::{NodeGraph, Pipeline, PipelineBuild, PipelineSet};
use provenance_cache::CacheStore;
use study_common::{
    Fingerprint, FingerprintBuilder, ItemName, ParamName, ParamValue, PipelineName, ScopeKey,
    SubjectId, SwitchName, SwitchValue, VisitId,
};
use study_spec::{DataKind, Registry, ValueKind};

use crate::{
    error::{CycleError, FrequencyMismatchError, OverrideError, ResolveError},
    job::{Job, JobGraph, JobId, JobOutput, JobStatus, RequestedOutput, ResolvedInput, SkipReason},
};

/// Parameter and switch overrides applied on top of registry defaults.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub params: BTreeMap<ParamName, ParamValue>,
    pub switches: BTreeMap<SwitchName, SwitchValue>,
}

/// One demanded item at a concrete session.
#[derive(Debug, Clone)]
pub struct Demand {
    pub item: ItemName,
    pub subject: SubjectId,
    pub visit: VisitId,
}

impl Demand {
    pub fn new(item: ItemName, subject: SubjectId, visit: VisitId) -> Self {
        Self {
            item,
            subject,
            visit,
        }
    }
}

/// Resolves demanded items into job graphs against a fixed binding of
/// parameters and switches.
pub struct Resolver<'a> {
    registry: &'a Registry,
    pipelines: &'a PipelineSet,
    cache: &'a dyn CacheStore,
    params: BTreeMap<ParamName, ParamValue>,
    switches: BTreeMap<SwitchName, SwitchValue>,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver bound to the registry's declared defaults.
    pub fn new(
        registry: &'a Registry,
        pipelines: &'a PipelineSet,
        cache: &'a dyn CacheStore,
    ) -> Self {
        let params = registry
            .param_specs()
            .map(|s| (s.name().clone(), s.default().clone()))
            .collect();
        let switches = registry
            .switch_specs()
            .map(|s| (s.name().clone(), s.default().clone()))
            .collect();
        Self {
            registry,
            pipelines,
            cache,
            params,
            switches,
        }
    }

    /// Applies overrides on top of the defaults, validating each one
    /// against the registry.
    pub fn with_overrides(mut self, overrides: Overrides) -> Result<Self, OverrideError> {
        for (name, value) in overrides.params {
            if self.registry.param_spec(&name).is_none() {
                return Err(OverrideError::UnknownParam(name));
            }
            self.params.insert(name, value);
        }
        for (name, value) in overrides.switches {
            let Some(spec) = self.registry.switch_spec(&name) else {
                return Err(OverrideError::UnknownSwitch(name));
            };
            spec.check(&value)?;
            self.switches.insert(name, value);
        }
        Ok(self)
    }

    /// The effective value of a parameter under the current bindings.
    pub fn parameter(&self, name: &ParamName) -> Option<&ParamValue> {
        self.params.get(name)
    }

    /// Resolves one item for one session.
    #[tracing::instrument(skip(self), fields(%item, %subject, %visit), err)]
    pub async fn resolve(
        &self,
        item: &ItemName,
        subject: &SubjectId,
        visit: &VisitId,
    ) -> Result<JobGraph, ResolveError> {
        let demand = Demand::new(item.clone(), subject.clone(), visit.clone());
        self.resolve_many(std::slice::from_ref(&demand)).await
    }

    /// Resolves several demands into one shared graph.
    ///
    /// Common ancestry is computed once: a producer demanded through two
    /// paths, or from two sessions projecting onto the same scope key,
    /// yields a single job.
    #[tracing::instrument(skip_all, fields(demands = demands.len()), err)]
    pub async fn resolve_many(&self, demands: &[Demand]) -> Result<JobGraph, ResolveError> {
        let mut walk = Walk::new(self);
        let mut requested = Vec::with_capacity(demands.len());
        for demand in demands {
            let resolved = walk
                .resolve_item(&demand.item, &demand.subject, &demand.visit)
                .await?;
            requested.push(RequestedOutput {
                item: demand.item.clone(),
                scope: resolved.scope,
                fingerprint: resolved.fingerprint,
                job: resolved.job,
            });
        }
        Ok(walk.finish(requested))
    }
}

/// The provenance-relevant outcome of building one pipeline.
#[derive(Debug, Clone)]
struct BuildRecord {
    graph: NodeGraph,
    params_read: BTreeMap<ParamName, ParamValue>,
    switches_read: BTreeMap<SwitchName, SwitchValue>,
}

/// Where one resolved item's value will come from.
#[derive(Debug, Clone)]
struct ResolvedItem {
    scope: ScopeKey,
    fingerprint: Fingerprint,
    job: Option<JobId>,
    acquired: bool,
}

/// Mutable state of one resolution walk.
struct Walk<'r, 'a> {
    resolver: &'r Resolver<'a>,
    builds: BTreeMap<PipelineName, BuildRecord>,
    resolved: BTreeMap<(ItemName, ScopeKey), ResolvedItem>,
    jobs: Vec<Job>,
    index: BTreeMap<(PipelineName, ScopeKey, Fingerprint), JobId>,
    /// Active DFS stack, for cycle detection.
    stack: Vec<ItemName>,
}

impl<'r, 'a> Walk<'r, 'a> {
    fn new(resolver: &'r Resolver<'a>) -> Self {
        Self {
            resolver,
            builds: BTreeMap::new(),
            resolved: BTreeMap::new(),
            jobs: Vec::new(),
            index: BTreeMap::new(),
            stack: Vec::new(),
        }
    }

    fn resolve_item<'s>(
        &'s mut self,
        item: &'s ItemName,
        subject: &'s SubjectId,
        visit: &'s VisitId,
    ) -> BoxFuture<'s, Result<ResolvedItem, ResolveError>> {
        async move {
            let resolver = self.resolver;
            let spec = resolver.registry.data_spec(item)?.clone();
            let scope = spec.frequency().scope_key(subject, visit);
            if let Some(resolved) = self.resolved.get(&(item.clone(), scope.clone())) {
                return Ok(resolved.clone());
            }

            let resolved = match spec.kind() {
                DataKind::Acquired { .. } => {
                    let fingerprint = match spec.value() {
                        ValueKind::Fileset { format } => Fingerprint::for_acquired(item, format),
                        ValueKind::Field => Fingerprint::for_acquired_field(item),
                    };
                    ResolvedItem {
                        scope: scope.clone(),
                        fingerprint,
                        job: None,
                        acquired: true,
                    }
                }
                DataKind::Derived { pipeline } => {
                    let pipeline_name = pipeline.clone();
                    if let Some(pos) = self.stack.iter().position(|i| i == item) {
                        let mut path = self.stack[pos..].to_vec();
                        path.push(item.clone());
                        return Err(CycleError { path }.into());
                    }
                    let pipeline = resolver.pipelines.get(&pipeline_name).ok_or_else(|| {
                        ResolveError::UnknownPipeline {
                            item: item.clone(),
                            pipeline: pipeline_name.clone(),
                        }
                    })?;
                    if !pipeline.outputs().contains(item) {
                        return Err(ResolveError::UndeclaredOutput {
                            pipeline: pipeline_name.clone(),
                            item: item.clone(),
                        });
                    }
                    let build = self.pipeline_build(pipeline)?;
                    let declared_inputs: Vec<ItemName> = pipeline.inputs().to_vec();
                    let declared_outputs: Vec<ItemName> = pipeline.outputs().to_vec();
                    let default_requirements = pipeline.default_requirements().clone();

                    self.stack.push(item.clone());
                    let mut inputs: Vec<(ItemName, ResolvedItem)> =
                        Vec::with_capacity(declared_inputs.len());
                    for input in &declared_inputs {
                        let resolved = self.resolve_item(input, subject, visit).await?;
                        inputs.push((input.clone(), resolved));
                    }
                    self.stack.pop();

                    // Transitive fingerprint; inputs folded in name order
                    let mut fp = FingerprintBuilder::for_pipeline(&pipeline_name);
                    for (name, value) in &build.params_read {
                        fp.param(name, value);
                    }
                    for (name, value) in &build.switches_read {
                        fp.switch(name, value);
                    }
                    let mut sorted: Vec<&(ItemName, ResolvedItem)> = inputs.iter().collect();
                    sorted.sort_by(|a, b| a.0.cmp(&b.0));
                    for (name, resolved) in sorted {
                        fp.input(name, &resolved.fingerprint);
                    }
                    let fingerprint = fp.finish();

                    let deps: BTreeSet<JobId> =
                        inputs.iter().filter_map(|(_, r)| r.job).collect();
                    let cached = resolver
                        .cache
                        .lookup(item, &scope, &fingerprint)
                        .await?
                        .is_some();

                    let key = (pipeline_name.clone(), scope.clone(), fingerprint.clone());
                    let job = match self.index.get(&key).copied() {
                        Some(id) => {
                            // Same unit of work demanded again, possibly for
                            // a different output of the same invocation.
                            let job = &mut self.jobs[id.0];
                            if !cached && job.status == JobStatus::Skipped(SkipReason::Cached) {
                                job.status = JobStatus::Pending;
                            }
                            if job.status == JobStatus::Pending {
                                job.dependencies.extend(deps.iter().copied());
                            }
                            id
                        }
                        None => {
                            let id = JobId(self.jobs.len());
                            let status = if cached {
                                JobStatus::Skipped(SkipReason::Cached)
                            } else {
                                JobStatus::Pending
                            };
                            let mut outputs = Vec::with_capacity(declared_outputs.len());
                            for output in &declared_outputs {
                                let frequency =
                                    resolver.registry.data_spec(output)?.frequency();
                                outputs.push(JobOutput {
                                    item: output.clone(),
                                    scope: frequency.scope_key(subject, visit),
                                });
                            }
                            let resolved_inputs = inputs
                                .iter()
                                .map(|(name, r)| ResolvedInput {
                                    item: name.clone(),
                                    scope: r.scope.clone(),
                                    fingerprint: r.fingerprint.clone(),
                                    acquired: r.acquired,
                                })
                                .collect();
                            tracing::debug!(
                                pipeline = %pipeline_name,
                                scope = %scope,
                                fingerprint = fingerprint.short(),
                                cached,
                                "resolved job"
                            );
                            self.jobs.push(Job {
                                id,
                                pipeline: pipeline_name.clone(),
                                scope: scope.clone(),
                                fingerprint: fingerprint.clone(),
                                graph: build.graph,
                                params: build.params_read,
                                default_requirements,
                                outputs,
                                inputs: resolved_inputs,
                                dependencies: if cached { BTreeSet::new() } else { deps },
                                status,
                            });
                            self.index.insert(key, id);
                            id
                        }
                    };

                    ResolvedItem {
                        scope: scope.clone(),
                        fingerprint,
                        job: Some(job),
                        acquired: false,
                    }
                }
            };

            self.resolved
                .insert((item.clone(), scope), resolved.clone());
            Ok(resolved)
        }
        .boxed()
    }

    /// Builds a pipeline once per walk, checking frequency reconciliation.
    fn pipeline_build(&mut self, pipeline: &Pipeline) -> Result<BuildRecord, ResolveError> {
        if let Some(record) = self.builds.get(pipeline.name()) {
            return Ok(record.clone());
        }
        let resolver = self.resolver;
        let build = pipeline
            .build(resolver.registry, &resolver.params, &resolver.switches)
            .map_err(|source| ResolveError::Build {
                pipeline: pipeline.name().clone(),
                source,
            })?;
        check_frequencies(resolver.registry, pipeline, &build)?;
        let record = BuildRecord {
            graph: build.graph,
            params_read: build.params_read,
            switches_read: build.switches_read,
        };
        self.builds.insert(pipeline.name().clone(), record.clone());
        Ok(record)
    }

    /// Prunes unreachable jobs and emits the graph in deterministic
    /// topological order.
    fn finish(self, requested: Vec<RequestedOutput>) -> JobGraph {
        let registry = self.resolver.registry;
        let jobs = self.jobs;

        // Keep only jobs reachable from the demanded producers. Producers
        // resolved purely to fingerprint a cached consumer drop out here.
        let mut keep = vec![false; jobs.len()];
        let mut stack: Vec<usize> = requested
            .iter()
            .filter_map(|r| r.job.map(JobId::index))
            .collect();
        while let Some(i) = stack.pop() {
            if keep[i] {
                continue;
            }
            keep[i] = true;
            stack.extend(jobs[i].dependencies.iter().map(|d| d.0));
        }

        let decl_key = |job: &Job| {
            job.outputs
                .iter()
                .filter_map(|o| registry.declaration_index(&o.item))
                .min()
                .unwrap_or(usize::MAX)
        };

        // Kahn over kept jobs; ready set ordered by declaration index
        let mut in_degree = vec![0usize; jobs.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); jobs.len()];
        for (i, job) in jobs.iter().enumerate() {
            if !keep[i] {
                continue;
            }
            for dep in &job.dependencies {
                in_degree[i] += 1;
                dependents[dep.0].push(i);
            }
        }
        let mut ready: BTreeSet<(usize, usize)> = jobs
            .iter()
            .enumerate()
            .filter(|&(i, _)| keep[i] && in_degree[i] == 0)
            .map(|(i, job)| (decl_key(job), i))
            .collect();
        let mut order = Vec::new();
        while let Some(&(key, i)) = ready.iter().next() {
            ready.remove(&(key, i));
            order.push(i);
            for &k in &dependents[i] {
                in_degree[k] -= 1;
                if in_degree[k] == 0 {
                    ready.insert((decl_key(&jobs[k]), k));
                }
            }
        }

        // Remap ids onto final positions
        let mut new_id = vec![usize::MAX; jobs.len()];
        for (pos, &old) in order.iter().enumerate() {
            new_id[old] = pos;
        }
        let mut slots: Vec<Option<Job>> = jobs.into_iter().map(Some).collect();
        let final_jobs: Vec<Job> = order
            .iter()
            .enumerate()
            .filter_map(|(pos, &old)| {
                let mut job = slots[old].take()?;
                job.id = JobId(pos);
                job.dependencies = job
                    .dependencies
                    .iter()
                    .map(|d| JobId(new_id[d.0]))
                    .collect();
                Some(job)
            })
            .collect();
        let requested = requested
            .into_iter()
            .map(|mut r| {
                r.job = r.job.map(|j| JobId(new_id[j.0]));
                r
            })
            .collect();

        JobGraph::new(final_jobs, requested)
    }
}

/// A pipeline output coarser than (or incomparable with) one of its inputs
/// needs an explicit reduction node; broadcasting only goes the other way.
fn check_frequencies(
    registry: &Registry,
    pipeline: &Pipeline,
    build: &PipelineBuild,
) -> Result<(), ResolveError> {
    if build.graph.has_reduction() {
        return Ok(());
    }
    for output in pipeline.outputs() {
        let output_frequency = registry.data_spec(output)?.frequency();
        for input in pipeline.inputs() {
            let input_frequency = registry.data_spec(input)?.frequency();
            if !input_frequency.is_coarser_or_equal(output_frequency) {
                return Err(FrequencyMismatchError {
                    pipeline: pipeline.name().clone(),
                    output: output.clone(),
                    output_frequency,
                    input: input.clone(),
                    input_frequency,
                }
                .into());
            }
        }
    }
    Ok(())
}
