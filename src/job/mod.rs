// src/job/mod.rs

//! Cluster jobs: one per scheduled subgraph.
//!
//! - [`builder`] maps a subgraph's resource request plus the job-wide config
//!   into a [`ClusterJobDescriptor`].
//! - [`submit`] provides the `JobSubmitter` trait the orchestration loop
//!   submits through, and the production adapters.

pub mod builder;
pub mod submit;

pub use builder::{build_job, ClusterJobDescriptor, ComputeResource, SUBGRAPH_KEY};
pub use submit::{JobSubmitter, LoggingSubmitter, ProcessSubmitter};
