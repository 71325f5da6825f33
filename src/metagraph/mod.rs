// src/metagraph/mod.rs

//! Immutable description of a hierarchical task graph (HTG).
//!
//! A [`Metagraph`] holds the named subgraphs (each an independently
//! schedulable cluster job with its own resource request) and the
//! parent -> child [`Relation`]s between them. It is built once from user
//! input and is read-only afterwards.
//!
//! Construction only rejects duplicate subgraph names. Dangling relation
//! references and cycles are reported by [`crate::dag::schedule`], which is
//! the single place that interprets the relation set.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::{HtgError, Result};

/// One node of the HTG: a unit of work with its own resource request and
/// parallelism.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubGraph {
    pub name: String,
    pub cpu: f64,
    pub ram_mega_bytes: i64,
    pub disk_giga_bytes: i64,
    /// Number of worker replicas to request.
    pub instances: i64,
}

impl SubGraph {
    pub fn new(
        name: impl Into<String>,
        cpu: f64,
        ram_mega_bytes: i64,
        disk_giga_bytes: i64,
        instances: i64,
    ) -> Self {
        Self {
            name: name.into(),
            cpu,
            ram_mega_bytes,
            disk_giga_bytes,
            instances,
        }
    }
}

/// Directed edge: `parent` must complete before `child` starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub parent: String,
    pub child: String,
}

impl Relation {
    pub fn new(parent: impl Into<String>, child: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
        }
    }
}

/// Container of all subgraphs and relations for one HTG.
#[derive(Debug, Clone)]
pub struct Metagraph {
    name: String,
    /// Subgraphs in declaration order.
    subgraphs: Vec<SubGraph>,
    /// Subgraph name -> position in `subgraphs`.
    positions: HashMap<String, usize>,
    relations: Vec<Relation>,
}

impl Metagraph {
    pub fn new(
        name: impl Into<String>,
        subgraphs: Vec<SubGraph>,
        relations: Vec<Relation>,
    ) -> Result<Self> {
        let mut positions = HashMap::with_capacity(subgraphs.len());
        for (idx, sg) in subgraphs.iter().enumerate() {
            if positions.insert(sg.name.clone(), idx).is_some() {
                return Err(HtgError::DuplicateSubgraph(sg.name.clone()));
            }
        }

        Ok(Self {
            name: name.into(),
            subgraphs,
            positions,
            relations,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All subgraphs, in the order they were declared.
    pub fn subgraphs(&self) -> &[SubGraph] {
        &self.subgraphs
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn subgraph(&self, name: &str) -> Option<&SubGraph> {
        self.positions.get(name).map(|&idx| &self.subgraphs[idx])
    }

    /// Declaration index of a subgraph, used as the scheduler's tie-breaker.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Build the aggregate sent to the per-HTG master.
    pub fn to_htg_job(&self) -> HtgJob {
        HtgJob {
            job_name: self.name.clone(),
            subgraphs: self.subgraphs.clone(),
            relations: self.relations.clone(),
        }
    }
}

/// Aggregate describing the whole HTG, handed to the master once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtgJob {
    pub job_name: String,
    pub subgraphs: Vec<SubGraph>,
    pub relations: Vec<Relation>,
}

impl HtgJob {
    pub fn has_subgraph(&self, name: &str) -> bool {
        self.subgraphs.iter().any(|sg| sg.name == name)
    }
}
