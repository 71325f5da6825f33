// src/lib.rs

pub mod cli;
pub mod client;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod job;
pub mod logging;
pub mod master;
pub mod metagraph;
pub mod protocol;
pub mod types;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::HtgFile;
use crate::engine::HtgSubmitter;
use crate::errors::HtgError;
use crate::job::{JobSubmitter, LoggingSubmitter, ProcessSubmitter};
use crate::master::{MasterEvent, MasterServer};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and validation
/// - the orchestration loop with the configured submitter
/// - the optional in-process master (`--serve-master`)
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    if let Some(addr) = args.serve_master.as_deref() {
        return serve_master(addr).await;
    }

    let config_path = &args.config;
    let htg = load_and_validate(config_path)
        .with_context(|| format!("loading HTG description {}", config_path.display()))?;

    if args.dry_run {
        print_dry_run(&htg)?;
        return Ok(());
    }

    let master = args
        .master
        .clone()
        .or_else(|| htg.master.clone())
        .ok_or_else(|| {
            HtgError::ConfigError(
                "no master endpoint: pass --master or set [client].master".to_string(),
            )
        })?;

    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone());

    match htg.submit.clone() {
        Some(submit) => {
            let submitter = ProcessSubmitter::new(submit.program, submit.args);
            drive(htg, submitter, &master, &cancel).await
        }
        None => drive(htg, LoggingSubmitter, &master, &cancel).await,
    }
}

async fn drive<S: JobSubmitter>(
    htg: HtgFile,
    submitter: S,
    master: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut driver = HtgSubmitter::new(htg.metagraph, htg.worker_class, submitter)
        .with_job_config(htg.job_config)
        .with_cluster_config(htg.cluster)
        .with_client_options(htg.client);

    let report = driver.submit_htg(master, cancel).await?;
    info!(
        order = ?report.order,
        client_id = ?report.client_id,
        "htg run finished"
    );
    Ok(())
}

/// Fire `cancel` on Ctrl-C.
fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        info!("Ctrl+C received; cancelling");
        cancel.cancel();
    });
}

/// Run the in-process master until Ctrl-C, one HTG run after another.
async fn serve_master(addr: &str) -> Result<()> {
    let shutdown = CancellationToken::new();
    spawn_ctrl_c(shutdown.clone());

    let server = MasterServer::bind(addr)
        .await
        .with_context(|| format!("binding master on {addr}"))?;

    let (events_tx, mut events_rx) = mpsc::channel::<MasterEvent>(64);
    let logger = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            log_master_event(&event);
        }
    });

    while !shutdown.is_cancelled() {
        server.serve(events_tx.clone(), shutdown.clone()).await?;
    }

    drop(events_tx);
    let _ = logger.await;
    Ok(())
}

fn log_master_event(event: &MasterEvent) {
    match event {
        MasterEvent::ClientConnected { client, job_name } => {
            let (host, port) = client.address();
            info!(client_id = client.client_id(), host, port, job = %job_name, "client connected");
        }
        MasterEvent::ExecuteRequested { subgraph } => {
            info!(subgraph = %subgraph, "execute requested");
        }
        MasterEvent::ClientClosed { client_id } => {
            info!(client_id, "client closed its session");
        }
        MasterEvent::ClientDisconnected { client_id } => {
            warn!(client_id, "client dropped without goodbye");
        }
    }
}

/// Dry-run output: schedule and one descriptor per stage.
fn print_dry_run(htg: &HtgFile) -> Result<()> {
    let driver = HtgSubmitter::new(htg.metagraph.clone(), htg.worker_class.clone(), LoggingSubmitter)
        .with_job_config(htg.job_config.clone());
    let stages = driver.plan()?;

    println!("htgrun dry-run");
    println!("  htg = {}", htg.metagraph.name());
    println!("  worker_class = {}", htg.worker_class);
    if let Some(master) = &htg.master {
        println!("  master = {master}");
    }
    println!("  pacing = {:?}", htg.client.pacing);
    match &htg.submit {
        Some(submit) => println!("  submit = {} {:?}", submit.program, submit.args),
        None => println!("  submit = (log only)"),
    }
    println!();

    println!("schedule: {}", htg.schedule.join(" -> "));
    println!();

    println!("stages ({}):", stages.len());
    for (idx, descriptor) in stages.iter().enumerate() {
        let json = serde_json::to_string_pretty(descriptor)?;
        println!("  [{idx}] {}", descriptor.subgraph);
        for line in json.lines() {
            println!("      {line}");
        }
    }

    debug!("dry-run complete (nothing submitted)");
    Ok(())
}
