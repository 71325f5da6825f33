// src/executor/shared.rs

//! Shared-thread-pool execution strategy.
//!
//! A fixed set of threads pulls task instances from one run queue, advances
//! each by a single [`TaskInstance::progress`] step, and puts unfinished
//! instances back at the tail. No task owns a thread, so a plan with many
//! more tasks than cores still makes progress on all of them.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::errors::{HtgError, Result};
use crate::executor::{ExecutionModel, ExecutionPlan, ExecutionSummary, RunningExecutor, TaskInstance, TaskProgress};

/// How long an idle worker sleeps before re-checking for stop/finish.
const IDLE_WAIT: Duration = Duration::from_millis(50);

struct RunQueue {
    queue: Mutex<VecDeque<Box<dyn TaskInstance>>>,
    ready: Condvar,
    stop: AtomicBool,
    remaining: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl RunQueue {
    fn lock(&self) -> MutexGuard<'_, VecDeque<Box<dyn TaskInstance>>> {
        // A poisoned queue only means a worker panicked outside a task step;
        // the queue contents are still consistent.
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn finished(&self) -> bool {
        self.stop.load(Ordering::Acquire) || self.remaining.load(Ordering::Acquire) == 0
    }

    /// Next task to step, or `None` once the worker should exit.
    fn next(&self) -> Option<Box<dyn TaskInstance>> {
        let mut queue = self.lock();
        loop {
            if self.stop.load(Ordering::Acquire) {
                return None;
            }
            if let Some(task) = queue.pop_front() {
                return Some(task);
            }
            if self.finished() {
                return None;
            }
            queue = match self.ready.wait_timeout(queue, IDLE_WAIT) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn requeue(&self, task: Box<dyn TaskInstance>) {
        self.lock().push_back(task);
        self.ready.notify_one();
    }

    fn retire(&self, failed: bool) {
        if failed {
            self.failed.fetch_add(1, Ordering::AcqRel);
        } else {
            self.completed.fetch_add(1, Ordering::AcqRel);
        }
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.ready.notify_all();
        }
    }
}

/// Running shared-pool executor.
pub struct SharedExecutor {
    run: Arc<RunQueue>,
    threads: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for SharedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedExecutor")
            .field("threads", &self.threads.len())
            .field("remaining", &self.run.remaining.load(Ordering::Acquire))
            .finish()
    }
}

impl SharedExecutor {
    /// Number of threads used for `plan`: bounded by the task count, the
    /// plan's cap, and the machine's parallelism.
    pub fn pool_size(plan: &ExecutionPlan) -> usize {
        let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let cap = plan.max_threads().unwrap_or(cores);
        plan.len().min(cap).max(1)
    }

    /// Spawn the pool and return once every thread is running.
    pub fn start(plan: ExecutionPlan) -> Result<Self> {
        let threads = Self::pool_size(&plan);
        let tasks: VecDeque<_> = plan.into_tasks().into();
        let task_count = tasks.len();

        let run = Arc::new(RunQueue {
            queue: Mutex::new(tasks),
            ready: Condvar::new(),
            stop: AtomicBool::new(false),
            remaining: AtomicUsize::new(task_count),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        });

        let (started_tx, started_rx) = mpsc::channel::<()>();
        let mut handles = Vec::with_capacity(threads);

        for idx in 0..threads {
            let worker_run = Arc::clone(&run);
            let started = started_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("shared-executor-{idx}"))
                .spawn(move || {
                    let _ = started.send(());
                    worker_loop(idx, &worker_run);
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    run.stop.store(true, Ordering::Release);
                    run.ready.notify_all();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(HtgError::IoError(e));
                }
            }
        }
        drop(started_tx);

        for _ in 0..threads {
            if started_rx.recv().is_err() {
                break;
            }
        }

        info!(threads, tasks = task_count, "shared executor started");
        Ok(Self {
            run,
            threads: handles,
        })
    }

    pub fn completed(&self) -> usize {
        self.run.completed.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> usize {
        self.run.remaining.load(Ordering::Acquire)
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }
}

fn worker_loop(idx: usize, run: &RunQueue) {
    debug!(worker = idx, "shared executor worker running");

    while let Some(mut task) = run.next() {
        let step = panic::catch_unwind(AssertUnwindSafe(|| task.progress()));
        match step {
            Ok(TaskProgress::Continue) => run.requeue(task),
            Ok(TaskProgress::Done) => {
                debug!(worker = idx, task = %task.name(), "task finished");
                run.retire(false);
            }
            Err(_) => {
                error!(worker = idx, task = %task.name(), "task panicked; dropping it");
                run.retire(true);
            }
        }
    }

    debug!(worker = idx, "shared executor worker exiting");
}

impl RunningExecutor for SharedExecutor {
    fn model(&self) -> ExecutionModel {
        ExecutionModel::Shared
    }

    fn is_alive(&self) -> bool {
        self.threads.iter().any(|t| !t.is_finished())
    }

    fn stop(&self) {
        info!("stopping shared executor");
        self.run.stop.store(true, Ordering::Release);
        self.run.ready.notify_all();
    }

    fn join(self: Box<Self>) -> ExecutionSummary {
        let this = *self;
        let threads = this.threads.len();
        for handle in this.threads {
            if handle.join().is_err() {
                error!("shared executor worker thread panicked");
            }
        }
        ExecutionSummary {
            threads,
            completed: this.run.completed.load(Ordering::Acquire),
            failed: this.run.failed.load(Ordering::Acquire),
            abandoned: this.run.remaining.load(Ordering::Acquire),
        }
    }
}
