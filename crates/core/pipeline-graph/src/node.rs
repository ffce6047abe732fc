//! Processing-step nodes and their input/output bindings.

use study_common::{ItemName, ParamValue};

use crate::{command::CommandTemplate, requirements::Requirements};

/// A node identifier, unique within one pipeline's graph.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Where a node input's value comes from.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum BindingSource {
    /// The output port of another node in the same graph.
    NodeOutput { node: NodeId, port: String },
    /// A data item declared in the registry (acquired, or derived by
    /// another pipeline).
    Item { item: ItemName },
    /// An inline literal value.
    Literal { value: ParamValue },
}

/// One named input of a node.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct InputBinding {
    pub port: String,
    #[serde(flatten)]
    pub source: BindingSource,
}

/// One named output of a node, optionally published as a registry item.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct OutputBinding {
    pub port: String,
    /// When set, this output materializes the named derived item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<ItemName>,
}

/// An atomic unit of computation inside a pipeline.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Node {
    id: NodeId,
    inputs: Vec<InputBinding>,
    outputs: Vec<OutputBinding>,
    command: CommandTemplate,
    /// Per-node override of the pipeline's declared requirements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    requirements: Option<Requirements>,
    /// Marks this node as an explicit reduction across a finer frequency
    /// scope (required when a pipeline output is coarser than an input).
    #[serde(default)]
    reduces: bool,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, command: CommandTemplate) -> Self {
        Self {
            id: id.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            command,
            requirements: None,
            reduces: false,
        }
    }

    /// Binds an input port to a registry item.
    pub fn input_item(mut self, port: impl Into<String>, item: ItemName) -> Self {
        self.inputs.push(InputBinding {
            port: port.into(),
            source: BindingSource::Item { item },
        });
        self
    }

    /// Binds an input port to another node's output.
    pub fn input_node(
        mut self,
        port: impl Into<String>,
        node: impl Into<NodeId>,
        source_port: impl Into<String>,
    ) -> Self {
        self.inputs.push(InputBinding {
            port: port.into(),
            source: BindingSource::NodeOutput {
                node: node.into(),
                port: source_port.into(),
            },
        });
        self
    }

    /// Binds an input port to a literal value.
    pub fn input_literal(mut self, port: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.inputs.push(InputBinding {
            port: port.into(),
            source: BindingSource::Literal {
                value: value.into(),
            },
        });
        self
    }

    /// Declares an internal output port.
    pub fn output(mut self, port: impl Into<String>) -> Self {
        self.outputs.push(OutputBinding {
            port: port.into(),
            item: None,
        });
        self
    }

    /// Declares an output port that materializes a derived item.
    pub fn output_item(mut self, port: impl Into<String>, item: ItemName) -> Self {
        self.outputs.push(OutputBinding {
            port: port.into(),
            item: Some(item),
        });
        self
    }

    /// Overrides the pipeline's declared requirements for this node.
    pub fn requirements(mut self, requirements: Requirements) -> Self {
        self.requirements = Some(requirements);
        self
    }

    /// Marks this node as reducing across a finer frequency scope.
    pub fn reduction(mut self) -> Self {
        self.reduces = true;
        self
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn inputs(&self) -> &[InputBinding] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputBinding] {
        &self.outputs
    }

    pub fn command(&self) -> &CommandTemplate {
        &self.command
    }

    pub fn declared_requirements(&self) -> Option<&Requirements> {
        self.requirements.as_ref()
    }

    pub fn is_reduction(&self) -> bool {
        self.reduces
    }

    /// Registry items this node materializes.
    pub fn item_outputs(&self) -> impl Iterator<Item = &ItemName> {
        self.outputs.iter().filter_map(|b| b.item.as_ref())
    }
}
