//! Validated node graphs.

use std::collections::{BTreeMap, BTreeSet};

use study_common::ItemName;

use crate::{
    error::GraphError,
    node::{BindingSource, Node, NodeId},
};

/// A validated DAG of processing nodes emitted by one pipeline build.
///
/// Validation happens once at construction; holders of a `NodeGraph` can
/// rely on: unique node ids, every node-output binding referencing an
/// existing node and port, no intra-graph cycles, and every expected
/// output item being produced by exactly one node.
#[derive(Debug, Clone)]
pub struct NodeGraph {
    /// Nodes in a valid topological order (producers before consumers).
    nodes: Vec<Node>,
}

impl NodeGraph {
    /// Validates and finalizes a node list against the pipeline's declared
    /// output items.
    pub fn new(nodes: Vec<Node>, expected_outputs: &[ItemName]) -> Result<Self, GraphError> {
        // Unique ids
        let mut ids = BTreeSet::new();
        for node in &nodes {
            if !ids.insert(node.id().clone()) {
                return Err(GraphError::DuplicateNodeId(node.id().clone()));
            }
        }

        // Binding targets exist
        let ports: BTreeMap<&NodeId, BTreeSet<&str>> = nodes
            .iter()
            .map(|n| {
                (
                    n.id(),
                    n.outputs().iter().map(|o| o.port.as_str()).collect(),
                )
            })
            .collect();
        for node in &nodes {
            for binding in node.inputs() {
                if let BindingSource::NodeOutput { node: src, port } = &binding.source {
                    let Some(src_ports) = ports.get(src) else {
                        return Err(GraphError::UnknownNode {
                            node: node.id().clone(),
                            referenced: src.clone(),
                        });
                    };
                    if !src_ports.contains(port.as_str()) {
                        return Err(GraphError::UnknownPort {
                            node: src.clone(),
                            port: port.clone(),
                        });
                    }
                }
            }
        }

        // Each expected output produced exactly once
        let mut producers: BTreeMap<&ItemName, &NodeId> = BTreeMap::new();
        for node in &nodes {
            for item in node.item_outputs() {
                if let Some(first) = producers.insert(item, node.id()) {
                    return Err(GraphError::DuplicateOutputItem {
                        item: item.clone(),
                        first: first.clone(),
                        second: node.id().clone(),
                    });
                }
            }
        }
        for item in expected_outputs {
            if !producers.contains_key(item) {
                return Err(GraphError::UnboundOutputItem(item.clone()));
            }
        }

        // Topological order (Kahn); stable by declaration order
        let index: BTreeMap<&NodeId, usize> =
            nodes.iter().enumerate().map(|(i, n)| (n.id(), i)).collect();
        let mut in_degree = vec![0usize; nodes.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            for binding in node.inputs() {
                if let BindingSource::NodeOutput { node: src, .. } = &binding.source {
                    let j = index[src];
                    in_degree[i] += 1;
                    dependents[j].push(i);
                }
            }
        }
        // Ready set kept ascending so ties resolve by declaration order
        let mut ready: Vec<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(nodes.len());
        while !ready.is_empty() {
            let i = ready.remove(0);
            order.push(i);
            for &k in &dependents[i] {
                in_degree[k] -= 1;
                if in_degree[k] == 0 {
                    let pos = ready.partition_point(|&r| r < k);
                    ready.insert(pos, k);
                }
            }
        }
        if order.len() != nodes.len() {
            let cycle: Vec<NodeId> = nodes
                .iter()
                .enumerate()
                .filter(|&(i, _)| in_degree[i] > 0)
                .map(|(_, n)| n.id().clone())
                .collect();
            return Err(GraphError::Cycle(cycle));
        }

        let mut slots: Vec<Option<Node>> = nodes.into_iter().map(Some).collect();
        let nodes = order.into_iter().filter_map(|i| slots[i].take()).collect();

        Ok(Self { nodes })
    }

    /// Nodes in topological order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Whether any node is marked as a reduction step.
    pub fn has_reduction(&self) -> bool {
        self.nodes.iter().any(|n| n.is_reduction())
    }
}
