// src/engine/mod.rs

//! Orchestration loop for one HTG run.
//!
//! Ties together:
//! - the graph scheduler (stage order)
//! - the job builder and the cluster submitter
//! - the orchestration client session to the per-HTG master
//!
//! Stages are strictly sequential. For each scheduled subgraph the loop
//! submits its cluster job, connects the client on the first stage, sends
//! the execute request and paces before moving on. The client is closed
//! exactly once when the loop ends, whatever the outcome.

pub mod driver;

pub use driver::{HtgSubmitter, RunReport};
