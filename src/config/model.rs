// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::client::ClientOptions;
use crate::metagraph::Metagraph;
use crate::types::{ClusterConfig, JobConfig, PacingKind};

/// HTG description as read from a TOML file, before validation.
///
/// ```toml
/// [htg]
/// name = "wordcount"
/// worker_class = "edu.example.WordCountWorker"
///
/// [[subgraph]]
/// name = "G1"
/// cpu = 2.0
/// ram_mb = 512
/// disk_gb = 1
/// instances = 2
///
/// [[relation]]
/// parent = "G1"
/// child = "G2"
/// ```
///
/// `[client]`, `[submit]`, `[cluster]` and `[job_config]` are optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawHtgFile {
    pub htg: HtgSection,

    #[serde(default)]
    pub client: ClientSection,

    #[serde(default)]
    pub submit: Option<SubmitSection>,

    /// Opaque settings for the submission layer.
    #[serde(default)]
    pub cluster: BTreeMap<String, toml::Value>,

    /// Opaque job-wide settings copied into every job descriptor.
    #[serde(default)]
    pub job_config: BTreeMap<String, toml::Value>,

    #[serde(default)]
    pub subgraph: Vec<SubgraphEntry>,

    #[serde(default)]
    pub relation: Vec<RelationEntry>,
}

/// `[htg]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HtgSection {
    pub name: String,

    /// Entry point every allocated worker instantiates.
    pub worker_class: String,
}

/// `[client]` section. Durations use the `250ms`, `5s`, `1m`, `2h` form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientSection {
    /// `host:port` of the per-HTG master; `--master` overrides it.
    #[serde(default)]
    pub master: Option<String>,

    #[serde(default)]
    pub connect_timeout: Option<String>,

    #[serde(default)]
    pub pacing: Option<PacingKind>,

    /// Upper bound of the random delay when `pacing = "random"`.
    #[serde(default)]
    pub pacing_ceiling: Option<String>,

    /// How long to wait for the master's ack when `pacing = "ack"`.
    #[serde(default)]
    pub ack_timeout: Option<String>,
}

/// `[submit]` section: external program that submits one job per call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitSection {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,
}

/// One `[[subgraph]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubgraphEntry {
    pub name: String,
    pub cpu: f64,
    pub ram_mb: i64,
    pub disk_gb: i64,
    #[serde(default = "default_instances")]
    pub instances: i64,
}

fn default_instances() -> i64 {
    1
}

/// One `[[relation]]` entry: `parent` runs before `child`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationEntry {
    pub parent: String,
    pub child: String,
}

/// Validated HTG description, ready to run.
///
/// Only obtainable through `TryFrom<RawHtgFile>` (see `validate.rs`), so a
/// value of this type always has an acyclic, fully-resolved metagraph and
/// positive resources for every subgraph.
#[derive(Debug, Clone)]
pub struct HtgFile {
    pub metagraph: Metagraph,
    pub worker_class: String,
    /// Master endpoint from `[client].master`, if any.
    pub master: Option<String>,
    pub client: ClientOptions,
    pub submit: Option<SubmitSection>,
    pub cluster: ClusterConfig,
    pub job_config: JobConfig,
    /// Stage order computed during validation.
    pub schedule: Vec<String>,
}
