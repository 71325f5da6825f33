// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{HtgFile, RawHtgFile};
use crate::errors::Result;

/// Load an HTG description from `path` without validating it.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawHtgFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    load_from_str(&contents)
}

/// Parse an HTG description from TOML text without validating it.
pub fn load_from_str(contents: &str) -> Result<RawHtgFile> {
    let raw: RawHtgFile = toml::from_str(contents)?;
    Ok(raw)
}

/// Load an HTG description and validate it.
///
/// Validation covers everything that can be checked before submitting:
/// duplicate or dangling subgraph names, cycles, resources, durations and
/// the pacing settings.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<HtgFile> {
    let path = path.as_ref();
    let raw = load_from_path(path)?;
    let htg = HtgFile::try_from(raw)?;
    debug!(
        path = %path.display(),
        htg = %htg.metagraph.name(),
        subgraphs = htg.metagraph.subgraphs().len(),
        "loaded htg description"
    );
    Ok(htg)
}

/// `Htg.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Htg.toml")
}
