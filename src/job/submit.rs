// src/job/submit.rs

//! Pluggable cluster job submission.
//!
//! The orchestration loop talks to a `JobSubmitter` instead of a concrete
//! resource manager. How a job actually acquires machines is owned by the
//! cluster side; this crate ships two thin adapters:
//!
//! - `ProcessSubmitter` hands each descriptor, as JSON on stdin, to an
//!   external submit program (a wrapper around the site's resource manager).
//! - `LoggingSubmitter` only logs the descriptor; used when no submit
//!   program is configured.
//!
//! Tests provide their own implementation that records descriptors.

use std::future::Future;
use std::io::ErrorKind;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::{HtgError, Result};
use crate::job::builder::ClusterJobDescriptor;
use crate::types::ClusterConfig;

/// Trait abstracting how a built job reaches the cluster.
pub trait JobSubmitter: Send {
    /// Submit one job. Returns once the cluster has accepted it, not once it
    /// has finished.
    fn submit<'a>(
        &'a mut self,
        descriptor: &'a ClusterJobDescriptor,
        cluster: &'a ClusterConfig,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Submitter that only logs what it would submit.
#[derive(Debug, Default)]
pub struct LoggingSubmitter;

impl JobSubmitter for LoggingSubmitter {
    fn submit<'a>(
        &'a mut self,
        descriptor: &'a ClusterJobDescriptor,
        cluster: &'a ClusterConfig,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            info!(
                job = %descriptor.job_name,
                subgraph = %descriptor.subgraph,
                worker_class = %descriptor.worker_class,
                cpu = descriptor.compute_resource.cpu,
                ram_mb = descriptor.compute_resource.ram_mega_bytes,
                disk_gb = descriptor.compute_resource.disk_giga_bytes,
                instances = descriptor.compute_resource.instances,
                cluster_keys = cluster.len(),
                "no submit program configured; job logged only"
            );
            Ok(())
        })
    }
}

/// Submitter that runs an external program once per job.
///
/// The program receives the descriptor and cluster config as one JSON
/// document on stdin. Exit status zero means the cluster accepted the job;
/// anything else is a [`HtgError::Submission`] carrying the program's stderr.
#[derive(Debug, Clone)]
pub struct ProcessSubmitter {
    program: String,
    args: Vec<String>,
}

#[derive(serde::Serialize)]
struct SubmitRequest<'a> {
    job: &'a ClusterJobDescriptor,
    cluster: &'a ClusterConfig,
}

impl ProcessSubmitter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    async fn run(
        &self,
        descriptor: &ClusterJobDescriptor,
        cluster: &ClusterConfig,
    ) -> anyhow::Result<std::process::Output> {
        let payload = serde_json::to_vec(&SubmitRequest {
            job: descriptor,
            cluster,
        })
        .context("encoding job descriptor as JSON")?;

        info!(
            program = %self.program,
            subgraph = %descriptor.subgraph,
            "starting submit process"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning submit program '{}'", self.program))?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(&payload).await {
                Ok(()) => {}
                // The program may exit without reading its input; its exit
                // status still decides the outcome.
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                    debug!(
                        subgraph = %descriptor.subgraph,
                        "submit program closed stdin before reading the descriptor"
                    );
                }
                Err(e) => {
                    return Err(e).context("writing job descriptor to submit program");
                }
            }
            // Dropping stdin closes the pipe so the program sees EOF.
        }

        child
            .wait_with_output()
            .await
            .with_context(|| format!("waiting for submit program '{}'", self.program))
    }
}

impl JobSubmitter for ProcessSubmitter {
    fn submit<'a>(
        &'a mut self,
        descriptor: &'a ClusterJobDescriptor,
        cluster: &'a ClusterConfig,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let output = self.run(descriptor, cluster).await.map_err(|e| {
                HtgError::Submission {
                    subgraph: descriptor.subgraph.clone(),
                    reason: format!("{e:#}"),
                }
            })?;

            for line in String::from_utf8_lossy(&output.stdout).lines() {
                debug!(subgraph = %descriptor.subgraph, "submit stdout: {}", line);
            }

            if output.status.success() {
                info!(subgraph = %descriptor.subgraph, "cluster accepted job");
                return Ok(());
            }

            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(
                subgraph = %descriptor.subgraph,
                exit_code = code,
                stderr = %stderr,
                "submit program failed"
            );
            Err(HtgError::Submission {
                subgraph: descriptor.subgraph.clone(),
                reason: format!("submit program exited with {code}: {stderr}"),
            })
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::job::build_job;
    use crate::metagraph::SubGraph;
    use crate::types::JobConfig;

    fn descriptor() -> ClusterJobDescriptor {
        build_job(
            &SubGraph::new("G1", 2.0, 512, 1, 2),
            "htg",
            "edu.example.Worker",
            &JobConfig::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn zero_exit_is_accepted() {
        let mut submitter = ProcessSubmitter::new(
            "sh",
            vec!["-c".to_string(), "cat > /dev/null".to_string()],
        );
        submitter
            .submit(&descriptor(), &ClusterConfig::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn descriptor_is_sent_as_json() {
        let mut submitter = ProcessSubmitter::new(
            "sh",
            vec![
                "-c".to_string(),
                "grep -q '\"worker_class\":\"edu.example.Worker\"'".to_string(),
            ],
        );
        submitter
            .submit(&descriptor(), &ClusterConfig::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_submission_error() {
        let mut submitter = ProcessSubmitter::new(
            "sh",
            vec![
                "-c".to_string(),
                "cat > /dev/null; echo 'queue full' >&2; exit 3".to_string(),
            ],
        );
        match submitter.submit(&descriptor(), &ClusterConfig::new()).await {
            Err(HtgError::Submission { subgraph, reason }) => {
                assert_eq!(subgraph, "G1");
                assert!(reason.contains("queue full"), "reason: {reason}");
                assert!(reason.contains('3'), "reason: {reason}");
            }
            other => panic!("expected Submission error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn program_ignoring_stdin_is_judged_by_exit_status() {
        let mut accepting = ProcessSubmitter::new("true", vec![]);
        for _ in 0..20 {
            accepting
                .submit(&descriptor(), &ClusterConfig::new())
                .await
                .unwrap();
        }

        let mut rejecting = ProcessSubmitter::new("false", vec![]);
        for _ in 0..5 {
            match rejecting.submit(&descriptor(), &ClusterConfig::new()).await {
                Err(HtgError::Submission { reason, .. }) => {
                    assert!(reason.contains("exited with 1"), "reason: {reason}");
                }
                other => panic!("expected Submission error, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn missing_program_is_a_submission_error() {
        let mut submitter = ProcessSubmitter::new("/nonexistent/htg-submit", vec![]);
        let err = submitter
            .submit(&descriptor(), &ClusterConfig::new())
            .await
            .unwrap_err();
        assert!(matches!(err, HtgError::Submission { .. }));
    }
}
