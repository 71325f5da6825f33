// src/executor/mod.rs

//! Intra-worker execution of a running subgraph's local task graph.
//!
//! Once a subgraph's job lands on a worker, the worker receives an
//! [`ExecutionPlan`] from the task-graph planner and hands it to
//! [`selector::select`], which starts the strategy matching the plan's
//! [`ExecutionModel`]:
//!
//! - [`shared`]: every task of the plan is multiplexed over a bounded pool
//!   of threads.
//! - dedicated (one thread per task): recognised, not implemented.
//!
//! Starting is asynchronous with respect to task execution: the selector
//! returns a [`RunningExecutor`] as soon as the strategy is up.

pub mod selector;
pub mod shared;

use std::fmt;

pub use crate::types::ExecutionModel;
pub use selector::{select, select_from_config, start_plan};
pub use shared::SharedExecutor;

/// Result of one cooperative step of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskProgress {
    /// More work remains; schedule the task again.
    Continue,
    Done,
}

/// A unit of local work that advances in small, non-blocking steps.
pub trait TaskInstance: Send {
    fn name(&self) -> &str;

    /// Do a bounded amount of work.
    fn progress(&mut self) -> TaskProgress;
}

/// Local task graph of one subgraph on one worker, as built by the planner.
pub struct ExecutionPlan {
    tasks: Vec<Box<dyn TaskInstance>>,
    execution_model: ExecutionModel,
    max_threads: Option<usize>,
}

impl fmt::Debug for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.tasks.iter().map(|t| t.name()).collect();
        f.debug_struct("ExecutionPlan")
            .field("tasks", &names)
            .field("execution_model", &self.execution_model)
            .field("max_threads", &self.max_threads)
            .finish()
    }
}

impl ExecutionPlan {
    pub fn new(tasks: Vec<Box<dyn TaskInstance>>) -> Self {
        Self {
            tasks,
            execution_model: ExecutionModel::default(),
            max_threads: None,
        }
    }

    pub fn with_model(mut self, model: ExecutionModel) -> Self {
        self.execution_model = model;
        self
    }

    /// Cap the number of threads a shared pool may use for this plan.
    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = Some(max_threads.max(1));
        self
    }

    pub fn execution_model(&self) -> ExecutionModel {
        self.execution_model
    }

    pub fn max_threads(&self) -> Option<usize> {
        self.max_threads
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub(crate) fn into_tasks(self) -> Vec<Box<dyn TaskInstance>> {
        self.tasks
    }
}

/// Counters reported when an executor has wound down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub threads: usize,
    pub completed: usize,
    /// Tasks that panicked.
    pub failed: usize,
    /// Tasks still unfinished when the executor was stopped.
    pub abandoned: usize,
}

/// Handle to a started execution strategy.
pub trait RunningExecutor: Send {
    fn model(&self) -> ExecutionModel;

    /// `true` while at least one executor thread is running.
    fn is_alive(&self) -> bool;

    /// Ask the executor to stop after the steps currently in flight.
    fn stop(&self);

    /// Block until every executor thread has exited.
    fn join(self: Box<Self>) -> ExecutionSummary;
}
