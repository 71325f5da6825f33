// src/config/mod.rs

//! HTG description files.
//!
//! - `model.rs`: TOML-backed raw model and the validated [`HtgFile`].
//! - `loader.rs`: read a file from disk.
//! - `validate.rs`: `TryFrom<RawHtgFile> for HtgFile`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{
    ClientSection, HtgFile, HtgSection, RawHtgFile, RelationEntry, SubgraphEntry, SubmitSection,
};
pub use validate::parse_duration;
