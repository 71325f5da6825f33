// src/engine/driver.rs

use std::fmt;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::client::{ClientOptions, OrchestrationClient, PacingPolicy};
use crate::dag::schedule;
use crate::errors::{HtgError, Result};
use crate::job::{build_job, ClusterJobDescriptor, JobSubmitter};
use crate::metagraph::Metagraph;
use crate::types::{ClusterConfig, JobConfig};

/// What a finished run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Subgraph names in the order they were submitted.
    pub order: Vec<String>,
    /// Id the master assigned to the client, if its welcome arrived.
    pub client_id: Option<u32>,
}

/// Drives one HTG through scheduling, submission and the master session.
pub struct HtgSubmitter<S: JobSubmitter> {
    metagraph: Metagraph,
    worker_class: String,
    job_config: JobConfig,
    cluster: ClusterConfig,
    client_options: ClientOptions,
    submitter: S,
}

impl<S: JobSubmitter> fmt::Debug for HtgSubmitter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HtgSubmitter")
            .field("htg", &self.metagraph.name())
            .field("worker_class", &self.worker_class)
            .finish_non_exhaustive()
    }
}

impl<S: JobSubmitter> HtgSubmitter<S> {
    pub fn new(metagraph: Metagraph, worker_class: impl Into<String>, submitter: S) -> Self {
        Self {
            metagraph,
            worker_class: worker_class.into(),
            job_config: JobConfig::new(),
            cluster: ClusterConfig::new(),
            client_options: ClientOptions::default(),
            submitter,
        }
    }

    pub fn with_job_config(mut self, job_config: JobConfig) -> Self {
        self.job_config = job_config;
        self
    }

    pub fn with_cluster_config(mut self, cluster: ClusterConfig) -> Self {
        self.cluster = cluster;
        self
    }

    pub fn with_client_options(mut self, options: ClientOptions) -> Self {
        self.client_options = options;
        self
    }

    pub fn metagraph(&self) -> &Metagraph {
        &self.metagraph
    }

    pub fn submitter(&self) -> &S {
        &self.submitter
    }

    /// Schedule the HTG and build every stage's descriptor, in order.
    ///
    /// Nothing leaves the process. Any graph or resource problem surfaces
    /// here, which is why [`submit_htg`](Self::submit_htg) calls it before
    /// its first submission.
    pub fn plan(&self) -> Result<Vec<ClusterJobDescriptor>> {
        let order = schedule(&self.metagraph)?;
        order
            .iter()
            .map(|name| {
                let subgraph = self.metagraph.subgraph(name).ok_or_else(|| {
                    HtgError::ConfigError(format!("scheduled unknown subgraph '{name}'"))
                })?;
                build_job(
                    subgraph,
                    self.metagraph.name(),
                    &self.worker_class,
                    &self.job_config,
                )
            })
            .collect()
    }

    /// Run the HTG against the master at `master_endpoint`.
    ///
    /// Errors raised after the first submission carry the failing stage
    /// (see [`HtgError::Stage`]). Jobs already submitted are left running.
    pub async fn submit_htg(
        &mut self,
        master_endpoint: &str,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let stages = self.plan()?;
        info!(
            htg = %self.metagraph.name(),
            stages = stages.len(),
            master = master_endpoint,
            "submitting htg"
        );

        let mut client =
            OrchestrationClient::new(self.metagraph.to_htg_job(), self.client_options.clone());

        let outcome = self
            .run_stages(&stages, &mut client, master_endpoint, cancel)
            .await;
        let client_id = client
            .client_info()
            .filter(|info| info.is_assigned())
            .map(|info| info.client_id());
        client.close().await;

        match outcome {
            Ok(()) => {
                info!(htg = %self.metagraph.name(), "all stages submitted");
                Ok(RunReport {
                    order: stages.into_iter().map(|d| d.subgraph).collect(),
                    client_id,
                })
            }
            Err(e) => {
                error!(htg = %self.metagraph.name(), error = %e, "htg run aborted");
                Err(e)
            }
        }
    }

    async fn run_stages(
        &mut self,
        stages: &[ClusterJobDescriptor],
        client: &mut OrchestrationClient,
        master_endpoint: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let last = stages.len().saturating_sub(1);

        for (stage, descriptor) in stages.iter().enumerate() {
            let name = descriptor.subgraph.as_str();
            self.run_stage(stage, stage == last, descriptor, client, master_endpoint, cancel)
                .await
                .map_err(|e| e.at_stage(stage, name))?;
        }
        Ok(())
    }

    async fn run_stage(
        &mut self,
        stage: usize,
        is_last: bool,
        descriptor: &ClusterJobDescriptor,
        client: &mut OrchestrationClient,
        master_endpoint: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let name = descriptor.subgraph.as_str();
        if cancel.is_cancelled() {
            return Err(HtgError::Cancelled);
        }

        debug!(stage, subgraph = %name, "submitting cluster job");
        tokio::select! {
            _ = cancel.cancelled() => return Err(HtgError::Cancelled),
            res = self.submitter.submit(descriptor, &self.cluster) => res?,
        }

        if stage == 0 {
            let view = client.start(master_endpoint).await?;
            debug!(endpoint = view.endpoint(), "orchestration session up");
        }

        client.send_execute_request(name).await?;
        info!(stage, subgraph = %name, "stage dispatched");

        // The last stage still waits for the master's ack, but never sleeps.
        let awaits_ack = matches!(client.options().pacing, PacingPolicy::MasterAck { .. });
        if !is_last || awaits_ack {
            client.pace(name, cancel).await?;
        }
        Ok(())
    }
}
