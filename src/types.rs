use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::HtgError;

/// Opaque key/value settings passed through to the cluster or the workers.
///
/// Used both for the job-wide configuration merged into every job
/// descriptor and for the cluster configuration handed to the submitter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigMap {
    entries: BTreeMap<String, String>,
}

impl ConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Copy every entry of `other` into `self`, overwriting existing keys.
    pub fn merge(&mut self, other: &ConfigMap) {
        for (k, v) in other.iter() {
            self.entries.insert(k.to_string(), v.to_string());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for ConfigMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Job-wide settings merged into every cluster job descriptor.
pub type JobConfig = ConfigMap;

/// Settings for the external cluster submission layer.
pub type ClusterConfig = ConfigMap;

/// Job-config key selecting the intra-worker execution model.
pub const EXECUTION_MODEL_KEY: &str = "executor.model";

/// Intra-worker concurrency strategy for running a subgraph's local tasks.
///
/// - `Shared`: all tasks of the plan share a bounded pool of threads.
/// - `Dedicated`: one thread per task. Recognised, but not implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionModel {
    Shared,
    Dedicated,
}

impl Default for ExecutionModel {
    fn default() -> Self {
        ExecutionModel::Shared
    }
}

impl FromStr for ExecutionModel {
    type Err = HtgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "shared" => Ok(ExecutionModel::Shared),
            "dedicated" => Ok(ExecutionModel::Dedicated),
            other => Err(HtgError::InvalidExecutionModel(other.to_string())),
        }
    }
}

impl fmt::Display for ExecutionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionModel::Shared => f.write_str("shared"),
            ExecutionModel::Dedicated => f.write_str("dedicated"),
        }
    }
}

/// How the orchestration loop paces itself between execute requests, as
/// named in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacingKind {
    /// Wait for the master to acknowledge each request.
    Ack,
    /// Sleep a random interval below a fixed ceiling.
    Random,
}

impl Default for PacingKind {
    fn default() -> Self {
        PacingKind::Ack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_model_parses_case_insensitively() {
        assert_eq!("Shared".parse::<ExecutionModel>().unwrap(), ExecutionModel::Shared);
        assert_eq!(" dedicated ".parse::<ExecutionModel>().unwrap(), ExecutionModel::Dedicated);
    }

    #[test]
    fn unknown_execution_model_is_invalid() {
        let err = "hybrid".parse::<ExecutionModel>().unwrap_err();
        assert!(matches!(err, HtgError::InvalidExecutionModel(m) if m == "hybrid"));
    }

    #[test]
    fn merge_overwrites_existing_keys() {
        let mut base = ConfigMap::new().with("a", "1").with("b", "2");
        base.merge(&ConfigMap::new().with("b", "3").with("c", "4"));
        let pairs: Vec<_> = base.iter().collect();
        assert_eq!(pairs, vec![("a", "1"), ("b", "3"), ("c", "4")]);
    }
}
