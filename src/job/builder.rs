// src/job/builder.rs

//! Conversion of one subgraph into a submittable cluster job descriptor.

use serde::Serialize;

use crate::errors::{HtgError, Result};
use crate::metagraph::SubGraph;
use crate::types::JobConfig;

/// Job-config key the builder sets to the subgraph a descriptor was built
/// for, so a worker knows which part of the HTG it runs.
pub const SUBGRAPH_KEY: &str = "htg.subgraph";

/// Compute resources requested for one cluster job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputeResource {
    pub cpu: f64,
    pub ram_mega_bytes: i64,
    pub disk_giga_bytes: i64,
    pub instances: i64,
}

/// Everything the cluster needs to launch one subgraph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterJobDescriptor {
    /// Name of the HTG this job belongs to.
    pub job_name: String,
    pub subgraph: String,
    /// Entry point instantiated on every allocated worker.
    pub worker_class: String,
    pub compute_resource: ComputeResource,
    pub config: JobConfig,
}

/// Build the descriptor for `subgraph`.
///
/// Pure: nothing is submitted here. The shared config is copied into the
/// descriptor and [`SUBGRAPH_KEY`] is set on top of it.
pub fn build_job(
    subgraph: &SubGraph,
    htg_job_name: &str,
    worker_entry_point: &str,
    shared_config: &JobConfig,
) -> Result<ClusterJobDescriptor> {
    validate_resources(subgraph)?;

    let mut config = shared_config.clone();
    config.insert(SUBGRAPH_KEY, subgraph.name.clone());

    Ok(ClusterJobDescriptor {
        job_name: htg_job_name.to_string(),
        subgraph: subgraph.name.clone(),
        worker_class: worker_entry_point.to_string(),
        compute_resource: ComputeResource {
            cpu: subgraph.cpu,
            ram_mega_bytes: subgraph.ram_mega_bytes,
            disk_giga_bytes: subgraph.disk_giga_bytes,
            instances: subgraph.instances,
        },
        config,
    })
}

/// Check that every resource value of `subgraph` is positive.
pub fn validate_resources(subgraph: &SubGraph) -> Result<()> {
    let invalid = |reason: String| HtgError::InvalidResourceSpec {
        subgraph: subgraph.name.clone(),
        reason,
    };

    if !subgraph.cpu.is_finite() || subgraph.cpu <= 0.0 {
        return Err(invalid(format!("cpu must be > 0 (got {})", subgraph.cpu)));
    }
    if subgraph.ram_mega_bytes <= 0 {
        return Err(invalid(format!(
            "ram_mb must be > 0 (got {})",
            subgraph.ram_mega_bytes
        )));
    }
    if subgraph.disk_giga_bytes <= 0 {
        return Err(invalid(format!(
            "disk_gb must be > 0 (got {})",
            subgraph.disk_giga_bytes
        )));
    }
    if subgraph.instances < 1 {
        return Err(invalid(format!(
            "instances must be >= 1 (got {})",
            subgraph.instances
        )));
    }
    Ok(())
}
