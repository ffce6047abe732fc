//! Job compilation.
//!
//! Lowers a resolved [`Job`] into a concrete [`JobSpec`]: placeholder argv
//! templates become real command lines with repository paths, cache paths,
//! work-dir output paths, and parameter values substituted; abstract
//! software requirements become concrete module references.

use std::{collections::BTreeMap, path::PathBuf};

use dep_resolver::{Job, JobId};
use pipeline_graph::{BindingSource, NodeId, command::RenderError};
use provenance_cache::{CacheError, CacheStore, StoredResult};
use regex::Regex;
use study_common::{Fingerprint, FormatName, ItemName, ScopeKey};
use study_spec::{Registry, UnknownItemError, ValueKind};

use crate::{
    environment::{EnvironmentError, EnvironmentResolver},
    repository::{RepositoryAdapter, RepositoryError},
};

/// One rendered command of a job, with its resource envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStep {
    pub node: NodeId,
    pub argv: Vec<String>,
    pub wall_time_mins: u32,
    /// Concrete environment modules the command needs on the host.
    pub software: Vec<String>,
}

/// A fully concrete job ready for scheduler submission.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub name: String,
    /// Steps in execution order.
    pub steps: Vec<CompiledStep>,
    /// Wall-time ceiling for the whole job.
    pub wall_time_mins: u32,
}

/// Where a job output will materialize once the job succeeds.
#[derive(Debug, Clone)]
pub enum StagedValue {
    Fileset { path: PathBuf, format: FormatName },
    /// The command writes the scalar value into this file.
    Field { path: PathBuf },
}

/// One output the driver commits after the job succeeds.
#[derive(Debug, Clone)]
pub struct CompiledOutput {
    pub item: ItemName,
    pub scope: ScopeKey,
    pub fingerprint: Fingerprint,
    pub staged: StagedValue,
}

/// A compiled job plus the write-back plan for its outputs.
#[derive(Debug, Clone)]
pub struct CompiledJob {
    pub job: JobId,
    pub spec: JobSpec,
    pub outputs: Vec<CompiledOutput>,
}

/// Errors raised while compiling a job.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    UnknownItem(#[from] UnknownItemError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error("failed to render command for node '{node}'")]
    Render {
        node: NodeId,
        #[source]
        source: RenderError,
    },

    /// A derived input's producer reported done but its result is absent
    /// from the cache.
    #[error("derived input '{item}' has no cache entry for its fingerprint")]
    MissingDerivedInput { item: ItemName },

    #[error("failed to create work directory {path}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Compiles resolved jobs against a repository, cache, and environment.
pub struct JobCompiler<'a> {
    registry: &'a Registry,
    repository: &'a dyn RepositoryAdapter,
    cache: &'a dyn CacheStore,
    environment: &'a dyn EnvironmentResolver,
    work_dir: PathBuf,
    /// Pattern bindings for acquired items, keyed by item name.
    selectors: BTreeMap<ItemName, Regex>,
}

impl<'a> JobCompiler<'a> {
    pub fn new(
        registry: &'a Registry,
        repository: &'a dyn RepositoryAdapter,
        cache: &'a dyn CacheStore,
        environment: &'a dyn EnvironmentResolver,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            repository,
            cache,
            environment,
            work_dir: work_dir.into(),
            selectors: BTreeMap::new(),
        }
    }

    /// Binds an acquired item to a repository entry by pattern instead of
    /// by name.
    pub fn with_selector(mut self, item: ItemName, pattern: Regex) -> Self {
        self.selectors.insert(item, pattern);
        self
    }

    #[tracing::instrument(skip_all, fields(pipeline = %job.pipeline(), scope = %job.scope()), err)]
    pub async fn compile(&self, job: &Job) -> Result<CompiledJob, CompileError> {
        let name = format!(
            "{}-{}-{}",
            job.pipeline(),
            job.scope().to_string().replace('/', "-"),
            job.fingerprint().short(),
        );
        let job_dir = self.work_dir.join(&name);

        let item_values = self.resolve_item_inputs(job).await?;
        let params: BTreeMap<String, String> = job
            .params()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let mut port_paths: BTreeMap<(NodeId, String), String> = BTreeMap::new();
        let mut steps = Vec::new();
        let mut outputs = Vec::new();

        // Nodes are already in topological order, so producer ports are
        // always assigned before a consumer references them.
        for node in job.graph().nodes() {
            let node_dir = job_dir.join(node.id().as_str());
            tokio::fs::create_dir_all(&node_dir)
                .await
                .map_err(|source| CompileError::WorkDir {
                    path: node_dir.clone(),
                    source,
                })?;

            let mut inputs = BTreeMap::new();
            for binding in node.inputs() {
                let value = match &binding.source {
                    BindingSource::Item { item } => item_values.get(item).cloned(),
                    BindingSource::NodeOutput { node: src, port } => {
                        port_paths.get(&(src.clone(), port.clone())).cloned()
                    }
                    BindingSource::Literal { value } => Some(value.to_string()),
                };
                // Optional inputs may be unbound; referencing one in the
                // command then fails at render time.
                if let Some(value) = value {
                    inputs.insert(binding.port.clone(), value);
                }
            }

            let mut outs = BTreeMap::new();
            for output in node.outputs() {
                let (file_name, staged) = match &output.item {
                    Some(item) => {
                        let spec = self.registry.data_spec(item)?;
                        match spec.value() {
                            ValueKind::Fileset { format } => (
                                format!("{}.{}", output.port, format),
                                Some(StagedValue::Fileset {
                                    path: PathBuf::new(),
                                    format: format.clone(),
                                }),
                            ),
                            ValueKind::Field => (
                                output.port.clone(),
                                Some(StagedValue::Field {
                                    path: PathBuf::new(),
                                }),
                            ),
                        }
                    }
                    None => (output.port.clone(), None),
                };
                let path = node_dir.join(file_name);
                outs.insert(output.port.clone(), path.display().to_string());
                port_paths.insert(
                    (node.id().clone(), output.port.clone()),
                    path.display().to_string(),
                );

                if let (Some(item), Some(staged)) = (&output.item, staged) {
                    let staged = match staged {
                        StagedValue::Fileset { format, .. } => StagedValue::Fileset {
                            path: path.clone(),
                            format,
                        },
                        StagedValue::Field { .. } => StagedValue::Field { path: path.clone() },
                    };
                    let scope = job
                        .outputs()
                        .iter()
                        .find(|o| &o.item == item)
                        .map(|o| o.scope.clone())
                        .unwrap_or_else(|| job.scope().clone());
                    outputs.push(CompiledOutput {
                        item: item.clone(),
                        scope,
                        fingerprint: job.fingerprint().clone(),
                        staged,
                    });
                }
            }

            let argv =
                node.command()
                    .render(&inputs, &outs, &params)
                    .map_err(|source| CompileError::Render {
                        node: node.id().clone(),
                        source,
                    })?;
            let requirements = node
                .declared_requirements()
                .unwrap_or(job.default_requirements());
            let software = requirements
                .software
                .iter()
                .map(|r| self.environment.resolve(r))
                .collect::<Result<Vec<_>, _>>()?;
            steps.push(CompiledStep {
                node: node.id().clone(),
                argv,
                wall_time_mins: requirements.wall_time_mins,
                software,
            });
        }

        let wall_time_mins = steps.iter().map(|s| s.wall_time_mins).max().unwrap_or(0);
        Ok(CompiledJob {
            job: job.id(),
            spec: JobSpec {
                name,
                steps,
                wall_time_mins,
            },
            outputs,
        })
    }

    /// Concrete values for the job's registry-item inputs: repository paths
    /// for acquired filesets, cache paths for derived inputs, rendered
    /// scalars for fields.
    async fn resolve_item_inputs(
        &self,
        job: &Job,
    ) -> Result<BTreeMap<ItemName, String>, CompileError> {
        let mut values = BTreeMap::new();
        for input in job.inputs() {
            let result = if input.acquired {
                match self.fetch_acquired(&input.item, &input.scope).await? {
                    Some(result) => result,
                    None => continue,
                }
            } else {
                self.cache
                    .lookup(&input.item, &input.scope, &input.fingerprint)
                    .await?
                    .ok_or_else(|| CompileError::MissingDerivedInput {
                        item: input.item.clone(),
                    })?
            };
            values.insert(input.item.clone(), render_result(&result));
        }
        Ok(values)
    }

    /// Fetches one acquired item, honoring pattern selectors, declared
    /// defaults, and optionality.
    async fn fetch_acquired(
        &self,
        item: &ItemName,
        scope: &ScopeKey,
    ) -> Result<Option<StoredResult>, CompileError> {
        if let Some(pattern) = self.selectors.get(item) {
            let spec = self.registry.data_spec(item)?;
            if let Some(format) = spec.value().format() {
                return Ok(Some(
                    self.repository
                        .list_matching(scope, pattern, format)
                        .await?,
                ));
            }
        }
        match self.repository.fetch(item, scope).await {
            Ok(result) => Ok(Some(result)),
            Err(RepositoryError::NotFound { .. }) => {
                let spec = self.registry.data_spec(item)?;
                if let Some(default) = spec.default_value() {
                    Ok(Some(StoredResult::field(default.clone())))
                } else if spec.is_optional() {
                    Ok(None)
                } else {
                    Err(RepositoryError::NotFound {
                        item: item.clone(),
                        scope: scope.clone(),
                    }
                    .into())
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn render_result(result: &StoredResult) -> String {
    match result {
        StoredResult::Fileset { path, .. } => path.display().to_string(),
        StoredResult::Field { value } => value.to_string(),
    }
}
