#![allow(dead_code)]

use htgrun::metagraph::{Metagraph, Relation, SubGraph};

/// Builder for `Metagraph` to simplify test setup.
///
/// Subgraphs keep the order they are added in, which is also the
/// scheduler's tie-break order.
pub struct MetagraphBuilder {
    name: String,
    subgraphs: Vec<SubGraph>,
    relations: Vec<Relation>,
}

impl MetagraphBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subgraphs: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Add a subgraph with a small valid resource request.
    pub fn with_subgraph(self, name: &str) -> Self {
        self.with(SubGraphBuilder::new(name).build())
    }

    pub fn with(mut self, subgraph: SubGraph) -> Self {
        self.subgraphs.push(subgraph);
        self
    }

    pub fn with_relation(mut self, parent: &str, child: &str) -> Self {
        self.relations.push(Relation::new(parent, child));
        self
    }

    /// Build without validating beyond duplicate names.
    pub fn try_build(self) -> htgrun::errors::Result<Metagraph> {
        Metagraph::new(self.name, self.subgraphs, self.relations)
    }

    pub fn build(self) -> Metagraph {
        self.try_build().expect("Failed to build metagraph from builder")
    }
}

/// Builder for `SubGraph`.
pub struct SubGraphBuilder {
    subgraph: SubGraph,
}

impl SubGraphBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            subgraph: SubGraph::new(name, 1.0, 256, 1, 1),
        }
    }

    pub fn cpu(mut self, cpu: f64) -> Self {
        self.subgraph.cpu = cpu;
        self
    }

    pub fn ram_mb(mut self, ram: i64) -> Self {
        self.subgraph.ram_mega_bytes = ram;
        self
    }

    pub fn disk_gb(mut self, disk: i64) -> Self {
        self.subgraph.disk_giga_bytes = disk;
        self
    }

    pub fn instances(mut self, instances: i64) -> Self {
        self.subgraph.instances = instances;
        self
    }

    pub fn build(self) -> SubGraph {
        self.subgraph
    }
}

/// The two-stage HTG used across the end-to-end tests:
/// `G1 {cpu 2, 512 MB, 1 GB, 2 instances} -> G2 {cpu 1, 256 MB, 1 GB, 1 instance}`.
pub fn two_stage_htg() -> Metagraph {
    MetagraphBuilder::new("two-stage")
        .with(
            SubGraphBuilder::new("G1")
                .cpu(2.0)
                .ram_mb(512)
                .disk_gb(1)
                .instances(2)
                .build(),
        )
        .with(
            SubGraphBuilder::new("G2")
                .cpu(1.0)
                .ram_mb(256)
                .disk_gb(1)
                .instances(1)
                .build(),
        )
        .with_relation("G1", "G2")
        .build()
}
