// src/dag/mod.rs

//! Dependency graph and scheduling of HTG subgraphs.
//!
//! - [`graph`] holds the adjacency view of a metagraph's relations.
//! - [`scheduler`] derives the submission order from it.

pub mod graph;
pub mod scheduler;

pub use graph::DagGraph;
pub use scheduler::schedule;
