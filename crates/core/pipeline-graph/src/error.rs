//! Error types for pipeline graph construction.

use study_common::{ItemName, ParamName, PipelineName, SwitchName};
use study_spec::SwitchDomainError;

use crate::node::NodeId;

/// Errors raised by a pipeline build function or its validation.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The build function fell through every declared branch of a switch.
    #[error("no branch handled switch '{switch}' in pipeline build")]
    UnhandledBranch { switch: SwitchName },

    /// A branch probe referenced a switch the study does not declare.
    #[error("unknown switch '{0}'")]
    UnknownSwitch(SwitchName),

    /// A boolean probe was made against an enumerated switch.
    #[error("switch '{switch}' is not boolean; probe it with branch_is and a candidate value")]
    NotBoolean { switch: SwitchName },

    /// A switch read or probe was outside the declared domain.
    #[error(transparent)]
    SwitchDomain(#[from] SwitchDomainError),

    /// A parameter read referenced an undeclared parameter.
    #[error("unknown parameter '{0}'")]
    UnknownParam(ParamName),

    /// The emitted node graph failed validation.
    #[error("invalid node graph: {0}")]
    Graph(#[from] GraphError),
}

/// Structural problems with an emitted node graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("duplicate node id '{0}'")]
    DuplicateNodeId(NodeId),

    #[error("node '{node}' references unknown node '{referenced}'")]
    UnknownNode { node: NodeId, referenced: NodeId },

    #[error("node '{node}' has no output port '{port}'")]
    UnknownPort { node: NodeId, port: String },

    #[error("output item '{item}' produced by both '{first}' and '{second}'")]
    DuplicateOutputItem {
        item: ItemName,
        first: NodeId,
        second: NodeId,
    },

    #[error("declared output item '{0}' is not produced by any node")]
    UnboundOutputItem(ItemName),

    #[error("node graph contains a cycle through {0:?}")]
    Cycle(Vec<NodeId>),
}

/// Errors raised while assembling a pipeline set.
#[derive(Debug, thiserror::Error)]
pub enum PipelineSetError {
    #[error("duplicate pipeline '{0}'")]
    DuplicatePipeline(PipelineName),
}
