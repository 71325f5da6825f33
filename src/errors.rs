// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Validation errors (`CyclicDependency`, `UnknownSubgraphReference`,
//! `InvalidResourceSpec`, ...) are raised before anything is submitted.
//! Errors raised after the first submission are wrapped in
//! [`HtgError::Stage`] so the caller can tell which step of the schedule
//! failed.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HtgError {
    #[error("Cyclic dependency between subgraphs: {}", .members.join(", "))]
    CyclicDependency { members: Vec<String> },

    #[error("Relation {parent} -> {child} references unknown subgraph '{missing}'")]
    UnknownSubgraphReference {
        parent: String,
        child: String,
        missing: String,
    },

    #[error("Subgraph '{0}' is declared more than once")]
    DuplicateSubgraph(String),

    #[error("Invalid resource spec for subgraph '{subgraph}': {reason}")]
    InvalidResourceSpec { subgraph: String, reason: String },

    #[error("Cluster rejected job for subgraph '{subgraph}': {reason}")]
    Submission { subgraph: String, reason: String },

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Execution model '{0}' is recognised but not supported yet")]
    UnsupportedModel(String),

    #[error("Invalid execution model: '{0}' (expected \"shared\" or \"dedicated\")")]
    InvalidExecutionModel(String),

    #[error("Orchestration cancelled")]
    Cancelled,

    #[error("Stage {stage} (subgraph '{subgraph}') failed: {source}")]
    Stage {
        stage: usize,
        subgraph: String,
        #[source]
        source: Box<HtgError>,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HtgError {
    /// Attach the stage index and subgraph name of the failing step.
    pub fn at_stage(self, stage: usize, subgraph: impl Into<String>) -> Self {
        HtgError::Stage {
            stage,
            subgraph: subgraph.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through any [`HtgError::Stage`] wrappers.
    pub fn root(&self) -> &HtgError {
        match self {
            HtgError::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Failures on the control channel between the orchestration client and the
/// per-HTG master.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("cannot connect to master at {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("timed out connecting to master at {endpoint} after {millis}ms")]
    ConnectTimeout { endpoint: String, millis: u64 },

    #[error("session is not connected (state: {state})")]
    NotConnected { state: String },

    #[error("write to master failed: {0}")]
    Write(String),

    #[error("session to master closed unexpectedly")]
    Closed,

    #[error("master did not acknowledge subgraph '{subgraph}' within {millis}ms")]
    AckTimeout { subgraph: String, millis: u64 },

    #[error("master rejected subgraph '{subgraph}': {reason}")]
    Rejected { subgraph: String, reason: String },
}

pub type Result<T> = std::result::Result<T, HtgError>;
