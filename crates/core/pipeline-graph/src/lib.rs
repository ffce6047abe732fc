//! Pipeline computation graphs.
//!
//! A pipeline is a named builder that, given the study's bound parameters
//! and switches, emits a validated [`NodeGraph`] of processing steps. The
//! build function runs inside a [`BuildCtx`] that records every parameter
//! and switch it reads (the provenance inputs) and mediates branch
//! selection over declared switch domains.

pub mod build_ctx;
pub mod command;
pub mod error;
pub mod graph;
pub mod node;
pub mod pipeline;
pub mod requirements;

pub use self::{
    build_ctx::{BuildCtx, PipelineBuild},
    command::CommandTemplate,
    error::{BuildError, GraphError, PipelineSetError},
    graph::NodeGraph,
    node::{BindingSource, InputBinding, Node, NodeId, OutputBinding},
    pipeline::{Pipeline, PipelineSet},
    requirements::{RequirementName, Requirements},
};
