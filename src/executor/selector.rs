// src/executor/selector.rs

//! Pick and start the execution strategy for a plan.

use tracing::{info, warn};

use crate::errors::{HtgError, Result};
use crate::executor::{ExecutionModel, ExecutionPlan, RunningExecutor, SharedExecutor};
use crate::types::{JobConfig, EXECUTION_MODEL_KEY};

/// Start `plan` under `model`.
///
/// Returns as soon as the strategy is running; tasks keep executing in the
/// background until they finish or the handle is stopped.
pub fn select(model: ExecutionModel, plan: ExecutionPlan) -> Result<Box<dyn RunningExecutor>> {
    match model {
        ExecutionModel::Shared => {
            info!(tasks = plan.len(), "starting plan on shared executor");
            Ok(Box::new(SharedExecutor::start(plan)?))
        }
        ExecutionModel::Dedicated => {
            warn!("dedicated execution model requested");
            Err(HtgError::UnsupportedModel(model.to_string()))
        }
    }
}

/// Start `plan` under the model it carries.
pub fn start_plan(plan: ExecutionPlan) -> Result<Box<dyn RunningExecutor>> {
    select(plan.execution_model(), plan)
}

/// Start `plan` under the model named by `executor.model` in the job
/// configuration. A missing key means `shared`.
pub fn select_from_config(
    config: &JobConfig,
    plan: ExecutionPlan,
) -> Result<Box<dyn RunningExecutor>> {
    let model = match config.get(EXECUTION_MODEL_KEY) {
        Some(raw) => raw.parse::<ExecutionModel>()?,
        None => ExecutionModel::default(),
    };
    select(model, plan.with_model(model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{TaskInstance, TaskProgress};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Countdown {
        name: String,
        steps: usize,
        total: Arc<AtomicUsize>,
    }

    impl TaskInstance for Countdown {
        fn name(&self) -> &str {
            &self.name
        }

        fn progress(&mut self) -> TaskProgress {
            self.total.fetch_add(1, Ordering::SeqCst);
            self.steps -= 1;
            if self.steps == 0 {
                TaskProgress::Done
            } else {
                TaskProgress::Continue
            }
        }
    }

    fn plan(tasks: usize, steps: usize, total: &Arc<AtomicUsize>) -> ExecutionPlan {
        let tasks = (0..tasks)
            .map(|i| {
                Box::new(Countdown {
                    name: format!("t{i}"),
                    steps,
                    total: Arc::clone(total),
                }) as Box<dyn TaskInstance>
            })
            .collect();
        ExecutionPlan::new(tasks)
    }

    #[test]
    fn shared_runs_every_task_to_completion() {
        let total = Arc::new(AtomicUsize::new(0));
        let running = select(ExecutionModel::Shared, plan(4, 3, &total)).unwrap();
        assert_eq!(running.model(), ExecutionModel::Shared);

        let summary = running.join();
        assert_eq!(summary.completed, 4);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.abandoned, 0);
        assert_eq!(total.load(Ordering::SeqCst), 12);
    }

    #[test]
    fn dedicated_is_unsupported() {
        let total = Arc::new(AtomicUsize::new(0));
        let err = select(ExecutionModel::Dedicated, plan(1, 1, &total)).err().unwrap();
        assert!(matches!(err, HtgError::UnsupportedModel(ref m) if m == "dedicated"));
        assert_eq!(total.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn start_plan_uses_the_plans_model() {
        let total = Arc::new(AtomicUsize::new(0));
        let p = plan(2, 1, &total).with_model(ExecutionModel::Dedicated);
        assert!(matches!(start_plan(p), Err(HtgError::UnsupportedModel(_))));
    }

    #[test]
    fn config_without_model_defaults_to_shared() {
        let total = Arc::new(AtomicUsize::new(0));
        let running = select_from_config(&JobConfig::new(), plan(2, 2, &total)).unwrap();
        assert_eq!(running.model(), ExecutionModel::Shared);
        assert_eq!(running.join().completed, 2);
    }

    #[test]
    fn config_model_is_case_insensitive() {
        let total = Arc::new(AtomicUsize::new(0));
        let cfg = JobConfig::new().with(EXECUTION_MODEL_KEY, "Shared");
        let running = select_from_config(&cfg, plan(1, 1, &total)).unwrap();
        assert_eq!(running.join().completed, 1);
    }

    #[test]
    fn config_with_unknown_model_is_rejected() {
        let total = Arc::new(AtomicUsize::new(0));
        let cfg = JobConfig::new().with(EXECUTION_MODEL_KEY, "fibers");
        let err = select_from_config(&cfg, plan(1, 1, &total)).err().unwrap();
        assert!(matches!(err, HtgError::InvalidExecutionModel(ref m) if m == "fibers"));
    }

    #[test]
    fn config_selecting_dedicated_is_unsupported() {
        let total = Arc::new(AtomicUsize::new(0));
        let cfg = JobConfig::new().with(EXECUTION_MODEL_KEY, "dedicated");
        assert!(matches!(
            select_from_config(&cfg, plan(1, 1, &total)),
            Err(HtgError::UnsupportedModel(_))
        ));
    }
}
