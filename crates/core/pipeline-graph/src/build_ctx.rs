//! The pipeline build context.
//!
//! A pipeline's build function runs against a [`BuildCtx`]: it reads
//! parameters, probes switches to pick a branch, and adds nodes. The
//! context records every read so the resolver can fingerprint the build —
//! only what a build actually consumed participates in provenance.

use std::collections::BTreeMap;

use study_common::{ItemName, ParamName, ParamValue, SwitchName, SwitchValue};
use study_spec::{Registry, SwitchDomain};

use crate::{error::BuildError, graph::NodeGraph, node::Node};

/// The result of one pipeline build: the emitted graph plus the recorded
/// provenance inputs.
#[derive(Debug)]
pub struct PipelineBuild {
    pub graph: NodeGraph,
    /// Parameter values the build read, in name order.
    pub params_read: BTreeMap<ParamName, ParamValue>,
    /// Switch values the build read, in name order.
    pub switches_read: BTreeMap<SwitchName, SwitchValue>,
}

/// Mutable state handed to a pipeline build function.
pub struct BuildCtx<'a> {
    registry: &'a Registry,
    params: &'a BTreeMap<ParamName, ParamValue>,
    switches: &'a BTreeMap<SwitchName, SwitchValue>,
    params_read: BTreeMap<ParamName, ParamValue>,
    switches_read: BTreeMap<SwitchName, SwitchValue>,
    nodes: Vec<Node>,
}

impl<'a> BuildCtx<'a> {
    pub(crate) fn new(
        registry: &'a Registry,
        params: &'a BTreeMap<ParamName, ParamValue>,
        switches: &'a BTreeMap<SwitchName, SwitchValue>,
    ) -> Self {
        Self {
            registry,
            params,
            switches,
            params_read: BTreeMap::new(),
            switches_read: BTreeMap::new(),
            nodes: Vec::new(),
        }
    }

    /// Reads a bound parameter value, recording the read for provenance.
    pub fn param(&mut self, name: &str) -> Result<ParamValue, BuildError> {
        let name: ParamName = name
            .parse()
            .map_err(|_| BuildError::UnknownParam(unchecked_param(name)))?;
        let value = self
            .params
            .get(&name)
            .cloned()
            .ok_or_else(|| BuildError::UnknownParam(name.clone()))?;
        self.params_read.insert(name, value.clone());
        Ok(value)
    }

    /// Tests a boolean switch.
    ///
    /// The read is recorded for provenance. Probing a non-boolean switch
    /// is a domain error.
    pub fn branch(&mut self, switch: &str) -> Result<bool, BuildError> {
        let (name, value) = self.switch_value(switch)?;
        match &value {
            SwitchValue::Bool(v) => {
                let v = *v;
                self.switches_read.insert(name, value);
                Ok(v)
            }
            SwitchValue::Choice(_) => Err(BuildError::NotBoolean { switch: name }),
        }
    }

    /// Tests an enumerated switch against a candidate value.
    ///
    /// The candidate must be inside the switch's declared domain — probing
    /// an undeclared value is a structural error, which is what makes
    /// unhandled-branch detection reliable.
    pub fn branch_is(&mut self, switch: &str, candidate: &str) -> Result<bool, BuildError> {
        let (name, value) = self.switch_value(switch)?;
        let spec = self
            .registry
            .switch_spec(&name)
            .ok_or_else(|| BuildError::UnknownSwitch(name.clone()))?;
        spec.check(&SwitchValue::Choice(candidate.to_string()))?;

        self.switches_read.insert(name, value.clone());
        Ok(matches!(value, SwitchValue::Choice(c) if c == candidate))
    }

    /// Constructs the error a build function returns when it reaches its
    /// fallback path without having taken a declared branch.
    pub fn unhandled(&self, switch: &str) -> BuildError {
        match switch.parse::<SwitchName>() {
            Ok(name) => BuildError::UnhandledBranch { switch: name },
            Err(_) => BuildError::UnknownSwitch(unchecked_switch(switch)),
        }
    }

    /// Appends a node to the graph under construction.
    pub fn add_node(&mut self, node: Node) {
        self.nodes.push(node);
    }

    fn switch_value(&self, switch: &str) -> Result<(SwitchName, SwitchValue), BuildError> {
        let name: SwitchName = switch
            .parse()
            .map_err(|_| BuildError::UnknownSwitch(unchecked_switch(switch)))?;
        let value = self
            .switches
            .get(&name)
            .cloned()
            .ok_or_else(|| BuildError::UnknownSwitch(name.clone()))?;
        Ok((name, value))
    }

    pub(crate) fn finish(self, expected_outputs: &[ItemName]) -> Result<PipelineBuild, BuildError> {
        let graph = NodeGraph::new(self.nodes, expected_outputs)?;
        Ok(PipelineBuild {
            graph,
            params_read: self.params_read,
            switches_read: self.switches_read,
        })
    }
}

// Invalid user-supplied names still need to appear in error messages.
// Sanitize rather than validate: strip to the accepted alphabet.
fn unchecked_param(name: &str) -> ParamName {
    sanitize(name)
        .parse()
        .unwrap_or_else(|_| "_invalid".parse().expect("static name is valid"))
}

fn unchecked_switch(name: &str) -> SwitchName {
    sanitize(name)
        .parse()
        .unwrap_or_else(|_| "_invalid".parse().expect("static name is valid"))
}

fn sanitize(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}
