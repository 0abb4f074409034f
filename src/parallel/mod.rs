//! Generic parallel aggregation framework
//!
//! This module computes an associative reduction over a recursively
//! decomposable input. Domains describe the work through the [`Aggregation`]
//! trait; the schedulers here decide how it is spread over threads.
//!
//! # Architecture Responsibilities
//!
//! ## What This Module Does:
//! - **Resource Discovery**: Detects available CPU cores using `num_cpus::get()`
//! - **Resource Calculation**: Applies user configuration (thread percentage, max threads) to available resources
//! - **Scheduling**: Drives decomposition with one of two [`Scheduler`] implementations
//! - **Failure Policy**: Applies each strategy's own reaction to task failures
//!
//! ## What This Module Does NOT Do:
//! - **Domain Logic**: Does not know about directories, file names or number sequences
//! - **I/O**: Does not read user input, print results or time runs
//!
//! # Strategies
//!
//! ```text
//! Fork/Join (work stealing)              Batch Dispatch (work dealing)
//! ┌──────────────┐                       round 0: [root]
//! │ compute(x)   │                          │ submit all, await each (timeout)
//! │  split(x)    │                          ▼
//! │  spawn 2..N  │──▶ rayon scope         round 1: [c1, c2, c3]
//! │  recurse 1   │    (stealable)           │ leaf children folded into the
//! │  join + fold │                          ▼ shared atomic accumulator
//! └──────────────┘                       round 2: [...]  ... until empty
//! ```
//!
//! The strategies intentionally disagree on failures:
//!
//! | | Fork/Join | Batch Dispatch |
//! |---|---|---|
//! | `split`/`evaluate` error | whole run fails (first error wins) | subtree dropped, run continues |
//! | panic in user code | whole run fails | subtree dropped, run continues |
//! | slow task | waits forever | dropped after the per-task timeout |
//!
//! Dropped subtrees are never silent: each is logged with `tracing::warn!`
//! and listed in [`Outcome::dropped`].
//!
//! # Example Usage
//!
//! ```rust
//! use splitfold::parallel::{aggregation, run_batch_dispatch, run_fork_join};
//! use std::time::Duration;
//!
//! // Halve n until only ones are left, then add the ones back up
//! let halving = || {
//!     aggregation::from_fns(
//!         |n: &u64| Ok(if *n > 1 { vec![*n / 2, *n - *n / 2] } else { vec![] }),
//!         |n: &u64| Ok(*n),
//!         |a: u64, b: u64| a + b,
//!     )
//! };
//!
//! let stolen = run_fork_join(halving(), 64, 4)?;
//! let dealt = run_batch_dispatch(halving(), 64, 4, Duration::from_secs(5))?;
//! assert_eq!(stolen, 64);
//! assert_eq!(stolen, dealt);
//! # Ok::<(), splitfold::EngineError>(())
//! ```

pub mod aggregation;
pub mod batch;
pub mod fork_join;
pub mod pool;

pub use aggregation::{Accumulator, Aggregation, AtomicScalar};
pub use batch::BatchDispatchScheduler;
pub use fork_join::ForkJoinScheduler;
pub use pool::{TaskHandle, WorkerPool};

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Common contract of both scheduling strategies
pub trait Scheduler {
    /// Reduce `root` with `aggregation`
    fn run<A: Aggregation>(&self, aggregation: Arc<A>, root: A::Item) -> Result<Outcome<A::Output>>;

    /// Short human-readable strategy name
    fn name(&self) -> &'static str;

    /// Number of worker threads backing the scheduler
    fn workers(&self) -> usize;
}

/// Result of a run plus what it took to get there
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    /// Aggregate value
    pub value: T,
    /// Tasks created (fork/join: computed items, batch dispatch: submitted jobs)
    pub tasks: usize,
    /// Frontier rounds (batch dispatch only; 0 for fork/join)
    pub rounds: usize,
    /// Subtrees whose contribution is missing from `value`
    pub dropped: Vec<DroppedSubtree>,
}

impl<T> Outcome<T> {
    /// True when no subtree was dropped
    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty()
    }
}

/// A batch dispatch task whose result was discarded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedSubtree {
    /// Round in which the task was dispatched
    pub round: usize,
    /// Debug rendering of the frontier item
    pub item: String,
    /// Why the task was dropped
    #[serde(serialize_with = "serialize_reason")]
    pub reason: EngineError,
}

fn serialize_reason<S: serde::Serializer>(reason: &EngineError, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&reason.to_string())
}

/// Strategy selector used by configuration and the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Recursive fork/join over a work-stealing pool
    ForkJoin,
    /// Level-synchronous frontier rounds over a fixed pool
    BatchDispatch,
}

impl StrategyKind {
    pub fn label(&self) -> &'static str {
        match self {
            StrategyKind::ForkJoin => "Work Stealing",
            StrategyKind::BatchDispatch => "Work Dealing",
        }
    }
}

/// A scheduler chosen at runtime
pub enum ExecutionStrategy {
    ForkJoin(ForkJoinScheduler),
    BatchDispatch(BatchDispatchScheduler),
}

impl ExecutionStrategy {
    /// Build the scheduler for `kind`
    ///
    /// `per_task_timeout` and `queue_capacity` only affect batch dispatch.
    pub fn build(
        kind: StrategyKind,
        workers: usize,
        per_task_timeout: Duration,
        queue_capacity: usize,
    ) -> Result<Self> {
        match kind {
            StrategyKind::ForkJoin => Ok(ExecutionStrategy::ForkJoin(ForkJoinScheduler::new(workers)?)),
            StrategyKind::BatchDispatch => Ok(ExecutionStrategy::BatchDispatch(
                BatchDispatchScheduler::with_queue_capacity(workers, per_task_timeout, queue_capacity)?,
            )),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            ExecutionStrategy::ForkJoin(_) => StrategyKind::ForkJoin,
            ExecutionStrategy::BatchDispatch(_) => StrategyKind::BatchDispatch,
        }
    }

    /// Calculate optimal workers based on available system resources and configuration limits
    ///
    /// # Algorithm
    /// ```text
    /// 1. Detect available CPU cores: num_cpus::get()
    /// 2. Apply percentage: cores * thread_percentage / 100
    /// 3. Apply config limit: min(max_threads_config, percentage_result) if max_threads_config > 0
    /// 4. Ensure minimum: max(1, final_result)
    /// ```
    ///
    /// # Examples
    /// ```rust
    /// use splitfold::parallel::ExecutionStrategy;
    ///
    /// let workers = ExecutionStrategy::calculate_optimal_workers(0, 75);
    /// assert!(workers >= 1);
    ///
    /// let workers = ExecutionStrategy::calculate_optimal_workers(8, 75);
    /// assert!(workers <= 8);
    /// ```
    pub fn calculate_optimal_workers(max_threads_config: usize, thread_percentage: u8) -> usize {
        Self::workers_for_cores(num_cpus::get(), max_threads_config, thread_percentage)
    }

    fn workers_for_cores(available_cores: usize, max_threads_config: usize, thread_percentage: u8) -> usize {
        let workers_by_percentage =
            std::cmp::max(1, (available_cores * thread_percentage as usize) / 100);

        // 0 means use percentage calculation only
        if max_threads_config > 0 {
            std::cmp::min(max_threads_config, workers_by_percentage)
        } else {
            workers_by_percentage
        }
    }
}

impl Scheduler for ExecutionStrategy {
    fn run<A: Aggregation>(&self, aggregation: Arc<A>, root: A::Item) -> Result<Outcome<A::Output>> {
        match self {
            ExecutionStrategy::ForkJoin(s) => s.run(aggregation, root),
            ExecutionStrategy::BatchDispatch(s) => s.run(aggregation, root),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ExecutionStrategy::ForkJoin(s) => s.name(),
            ExecutionStrategy::BatchDispatch(s) => s.name(),
        }
    }

    fn workers(&self) -> usize {
        match self {
            ExecutionStrategy::ForkJoin(s) => s.workers(),
            ExecutionStrategy::BatchDispatch(s) => s.workers(),
        }
    }
}

/// Run `aggregation` from `root` with fork/join on a fresh pool of `workers` threads
pub fn run_fork_join<A: Aggregation>(aggregation: A, root: A::Item, workers: usize) -> Result<A::Output> {
    let scheduler = ForkJoinScheduler::new(workers)?;
    Ok(scheduler.run(Arc::new(aggregation), root)?.value)
}

/// Run `aggregation` from `root` with batch dispatch on a fresh pool of `workers` threads
///
/// Dropped subtrees are logged and leave the returned value short of the
/// true total; use [`BatchDispatchScheduler::run`] to inspect them.
pub fn run_batch_dispatch<A: Aggregation>(
    aggregation: A,
    root: A::Item,
    workers: usize,
    per_task_timeout: Duration,
) -> Result<A::Output> {
    let scheduler = BatchDispatchScheduler::new(workers, per_task_timeout)?;
    Ok(scheduler.run(Arc::new(aggregation), root)?.value)
}
