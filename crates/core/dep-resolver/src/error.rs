//! Resolver error types.

use pipeline_graph::BuildError;
use provenance_cache::CacheError;
use study_common::{Frequency, ItemName, ParamName, PipelineName, SwitchName};
use study_spec::{SwitchDomainError, UnknownItemError};

/// A dependency cycle among derived items.
#[derive(Debug, thiserror::Error)]
#[error("dependency cycle: {}", path_display(path))]
pub struct CycleError {
    /// The cycle path, first item repeated at the end.
    pub path: Vec<ItemName>,
}

fn path_display(path: &[ItemName]) -> String {
    path.iter()
        .map(|i| i.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A pipeline whose output is coarser than (or incomparable with) an input
/// without declaring a reduction node.
#[derive(Debug, thiserror::Error)]
#[error(
    "pipeline '{pipeline}' produces '{output}' at {output_frequency} from \
     '{input}' at {input_frequency} without a reduction node"
)]
pub struct FrequencyMismatchError {
    pub pipeline: PipelineName,
    pub output: ItemName,
    pub output_frequency: Frequency,
    pub input: ItemName,
    pub input_frequency: Frequency,
}

/// Errors raised when applying parameter or switch overrides.
#[derive(Debug, thiserror::Error)]
pub enum OverrideError {
    #[error("override for undeclared parameter '{0}'")]
    UnknownParam(ParamName),

    #[error("override for undeclared switch '{0}'")]
    UnknownSwitch(SwitchName),

    #[error(transparent)]
    SwitchDomain(#[from] SwitchDomainError),
}

/// Errors raised during dependency resolution.
///
/// All of these are structural or cache-layer failures detected before any
/// job is submitted.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    UnknownItem(#[from] UnknownItemError),

    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error("item '{item}' names undeclared producing pipeline '{pipeline}'")]
    UnknownPipeline {
        item: ItemName,
        pipeline: PipelineName,
    },

    #[error("pipeline '{pipeline}' does not declare '{item}' as an output")]
    UndeclaredOutput {
        pipeline: PipelineName,
        item: ItemName,
    },

    #[error("pipeline '{pipeline}' failed to build")]
    Build {
        pipeline: PipelineName,
        #[source]
        source: BuildError,
    },

    #[error(transparent)]
    FrequencyMismatch(#[from] FrequencyMismatchError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}
