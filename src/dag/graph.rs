// src/dag/graph.rs

use std::collections::HashMap;

use crate::errors::{HtgError, Result};
use crate::metagraph::Metagraph;

/// Internal node structure: stores immediate parents and children.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Subgraphs that must complete before this one starts.
    deps: Vec<String>,
    /// Subgraphs waiting on this one.
    dependents: Vec<String>,
}

/// In-memory adjacency view of a metagraph's relations, keyed by subgraph
/// name.
///
/// Repeated relations between the same pair collapse into a single edge.
/// Building the graph checks that every relation endpoint names a declared
/// subgraph; acyclicity is checked by the scheduler.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: HashMap<String, DagNode>,
}

impl DagGraph {
    pub fn from_metagraph(mg: &Metagraph) -> Result<Self> {
        let mut nodes: HashMap<String, DagNode> = mg
            .subgraphs()
            .iter()
            .map(|sg| (sg.name.clone(), DagNode::default()))
            .collect();

        for rel in mg.relations() {
            for endpoint in [&rel.parent, &rel.child] {
                if !nodes.contains_key(endpoint) {
                    return Err(HtgError::UnknownSubgraphReference {
                        parent: rel.parent.clone(),
                        child: rel.child.clone(),
                        missing: endpoint.clone(),
                    });
                }
            }

            if let Some(child) = nodes.get_mut(&rel.child) {
                if child.deps.contains(&rel.parent) {
                    continue;
                }
                child.deps.push(rel.parent.clone());
            }
            if let Some(parent) = nodes.get_mut(&rel.parent) {
                parent.dependents.push(rel.child.clone());
            }
        }

        Ok(Self { nodes })
    }

    /// Return all subgraph names (unordered).
    pub fn subgraphs(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// Immediate parents of a subgraph.
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate children of a subgraph.
    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
