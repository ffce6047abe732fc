//! The assembled study.

use std::path::PathBuf;

use dep_resolver::{Demand, OverrideError, Overrides, ResolveError, Resolver};
use job_executor::{
    DirectoryRepository, ExecuteError, ExecutionDriver, JobCompiler, LocalScheduler,
    StaticEnvironment,
};
use pipeline_graph::PipelineSet;
use provenance_cache::{CacheStore, FsCacheStore, StoredResult};
use regex::Regex;
use study_common::{ItemName, ParamName, ParamValue, SubjectId, VisitId};
use study_spec::Registry;

use crate::config::{ConfigError, StudyConfig};

/// Errors raised while assembling or querying a study.
#[derive(Debug, thiserror::Error)]
pub enum StudyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Override(#[from] OverrideError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Execute(#[from] ExecuteError),
}

/// A registry and pipeline set bound to one concrete deployment: a data
/// repository, a provenance cache, a scheduler, and effective
/// parameter/switch bindings.
///
/// The cache lives under `<work_dir>/cache` and job staging under
/// `<work_dir>/jobs`, so a study's whole derived state can be wiped by
/// removing the work directory.
pub struct Study {
    name: String,
    registry: Registry,
    pipelines: PipelineSet,
    repository: DirectoryRepository,
    cache: FsCacheStore,
    environment: StaticEnvironment,
    scheduler: LocalScheduler,
    jobs_dir: PathBuf,
    selectors: Vec<(ItemName, Regex)>,
    overrides: Overrides,
}

impl Study {
    /// Assembles a study, validating selectors and overrides eagerly so a
    /// misconfiguration surfaces before any demand is made.
    pub fn new(
        config: StudyConfig,
        registry: Registry,
        pipelines: PipelineSet,
    ) -> Result<Self, StudyError> {
        let mut selectors = Vec::with_capacity(config.selectors.len());
        for (item, pattern) in config.selectors {
            let pattern = Regex::new(&pattern).map_err(|source| ConfigError::Selector {
                item: item.clone(),
                source,
            })?;
            selectors.push((item, pattern));
        }

        let mut environment = StaticEnvironment::new();
        for (requirement, module) in config.environment {
            environment = environment.with_override(requirement, module);
        }

        let overrides = Overrides {
            params: config.parameters,
            switches: config.switches,
        };

        let cache = FsCacheStore::new(config.work_dir.join("cache"));
        Resolver::new(&registry, &pipelines, &cache).with_overrides(overrides.clone())?;

        Ok(Self {
            name: config.name,
            registry,
            pipelines,
            repository: DirectoryRepository::new(config.repository_root),
            cache,
            environment,
            scheduler: LocalScheduler::new(config.scheduler.into()),
            jobs_dir: config.work_dir.join("jobs"),
            selectors,
            overrides,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The effective value of a parameter: the configured override if one
    /// exists, otherwise the registry default.
    pub fn parameter(&self, name: &ParamName) -> Option<ParamValue> {
        self.overrides
            .params
            .get(name)
            .cloned()
            .or_else(|| Some(self.registry.param_spec(name)?.default().clone()))
    }

    /// Demands one item for one session, deriving it if necessary, and
    /// materializes the result.
    pub async fn data(
        &self,
        item: &ItemName,
        subject: &SubjectId,
        visit: &VisitId,
    ) -> Result<StoredResult, StudyError> {
        let demand = Demand::new(item.clone(), subject.clone(), visit.clone());
        let mut results = self.data_many(std::slice::from_ref(&demand)).await?;
        results.pop().ok_or_else(|| {
            ExecuteError::MissingResult {
                item: item.clone(),
            }
            .into()
        })
    }

    /// Demands several items at once, sharing derivation work across them.
    #[tracing::instrument(skip_all, fields(study = %self.name, demands = demands.len()), err)]
    pub async fn data_many(&self, demands: &[Demand]) -> Result<Vec<StoredResult>, StudyError> {
        let resolver = Resolver::new(&self.registry, &self.pipelines, &self.cache)
            .with_overrides(self.overrides.clone())?;
        let mut graph = resolver.resolve_many(demands).await?;
        tracing::debug!(jobs = graph.len(), "resolved");

        let mut compiler = JobCompiler::new(
            &self.registry,
            &self.repository,
            &self.cache,
            &self.environment,
            &self.jobs_dir,
        );
        for (item, pattern) in &self.selectors {
            compiler = compiler.with_selector(item.clone(), pattern.clone());
        }

        let driver = ExecutionDriver::new(&self.scheduler, &self.repository, &self.cache, compiler);
        Ok(driver.run(&mut graph).await?)
    }

    /// The provenance history of an item across all fingerprints and
    /// scopes.
    pub async fn history(
        &self,
        item: &ItemName,
    ) -> Result<Vec<provenance_cache::CacheEntry>, StudyError> {
        let entries = self.cache.history(item).await.map_err(ResolveError::from)?;
        Ok(entries)
    }
}
