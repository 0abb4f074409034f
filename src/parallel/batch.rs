use super::pool::{TaskHandle, WorkerPool};
use super::{Accumulator, Aggregation, DroppedSubtree, Outcome, Scheduler};
use crate::error::{EngineError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

/// Default per-task deadline
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(5);

/// Level-synchronous frontier rounds over a fixed [`WorkerPool`]
///
/// Each round submits one task per frontier item before awaiting any of
/// them. A task splits its item once, folds the contributions of leaf
/// children into a shared [`Accumulator`] and returns the non-leaf children,
/// which form the next frontier. At most one frontier is in flight.
///
/// A task that fails, panics or misses its deadline is dropped together with
/// its whole subtree; the run keeps going and reports the drop in
/// [`Outcome::dropped`]. Only a pool rejection ends the run early.
pub struct BatchDispatchScheduler {
    pool: WorkerPool,
    per_task_timeout: Duration,
}

impl BatchDispatchScheduler {
    pub fn new(workers: usize, per_task_timeout: Duration) -> Result<Self> {
        Self::with_queue_capacity(workers, per_task_timeout, 0)
    }

    /// Like [`BatchDispatchScheduler::new`], rejecting submissions once
    /// `queue_capacity` jobs are waiting (0 = unbounded)
    pub fn with_queue_capacity(
        workers: usize,
        per_task_timeout: Duration,
        queue_capacity: usize,
    ) -> Result<Self> {
        if per_task_timeout.is_zero() {
            return Err(EngineError::InvalidInput(
                "per-task timeout must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            pool: WorkerPool::new(workers, queue_capacity)?,
            per_task_timeout,
        })
    }

    pub fn per_task_timeout(&self) -> Duration {
        self.per_task_timeout
    }
}

const PENDING: u8 = 0;
const COMMITTED: u8 = 1;
const ABANDONED: u8 = 2;

/// Decides whether a task's contribution still counts
///
/// The task commits right before publishing, the awaiting side abandons on
/// timeout; whichever transition wins first is final.
struct Latch(AtomicU8);

impl Latch {
    fn new() -> Self {
        Self(AtomicU8::new(PENDING))
    }

    fn try_commit(&self) -> bool {
        self.0
            .compare_exchange(PENDING, COMMITTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn try_abandon(&self) -> bool {
        self.0
            .compare_exchange(PENDING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_abandoned(&self) -> bool {
        self.0.load(Ordering::Acquire) == ABANDONED
    }
}

struct InFlight<I> {
    label: String,
    latch: Arc<Latch>,
    handle: TaskHandle<Vec<I>>,
}

enum DispatchState<I> {
    /// Items waiting for the next round
    Frontier(Vec<I>),
    /// Items about to be submitted
    Dispatch(Vec<I>),
    /// Submitted tasks awaiting their results
    Await(Vec<InFlight<I>>),
    /// Discovered items gathered from the round just finished
    NextFrontier(Vec<I>),
    Done,
}

/// One task's work: split once, fold leaf children, return the rest
fn expand<A: Aggregation>(aggregation: &A, item: &A::Item) -> Result<(A::Output, Vec<A::Item>)> {
    if aggregation.is_leaf(item) {
        return Ok((aggregation.evaluate(item)?, Vec::new()));
    }

    let children = aggregation.split(item)?;
    if children.is_empty() {
        return Ok((aggregation.evaluate(item)?, Vec::new()));
    }

    let mut local = aggregation.identity();
    let mut discovered = Vec::with_capacity(children.len());
    for child in children {
        if aggregation.is_leaf(&child) {
            local = aggregation.combine(local, aggregation.evaluate(&child)?);
        } else {
            discovered.push(child);
        }
    }
    Ok((local, discovered))
}

impl BatchDispatchScheduler {
    fn dispatch<A: Aggregation>(
        &self,
        aggregation: &Arc<A>,
        accumulator: &Arc<Accumulator<A::Output>>,
        items: Vec<A::Item>,
        in_flight: &mut Vec<InFlight<A::Item>>,
    ) -> Result<()> {
        for item in items {
            let label = format!("{item:?}");
            let latch = Arc::new(Latch::new());
            let aggregation = aggregation.clone();
            let accumulator = accumulator.clone();
            let task_latch = latch.clone();

            let handle = self.pool.submit(move || {
                if task_latch.is_abandoned() {
                    return Ok(Vec::new());
                }
                let (contribution, discovered) = expand(aggregation.as_ref(), &item)?;
                if task_latch.try_commit() {
                    accumulator.fold(contribution, |a, b| aggregation.combine(a, b));
                    Ok(discovered)
                } else {
                    Ok(Vec::new())
                }
            })?;

            tracing::trace!("Dispatched task for {}", label);
            in_flight.push(InFlight { label, latch, handle });
        }
        Ok(())
    }

    fn await_round<I>(
        &self,
        round: usize,
        in_flight: Vec<InFlight<I>>,
        dropped: &mut Vec<DroppedSubtree>,
    ) -> Vec<I> {
        let mut next = Vec::new();

        for flight in in_flight {
            let result = match flight.handle.wait_timeout(self.per_task_timeout) {
                Err(EngineError::Timeout(limit)) if !flight.latch.try_abandon() => {
                    // Committed just after the deadline; its result is on the way
                    tracing::trace!("Task for {} committed after {:?}", flight.label, limit);
                    flight.handle.wait()
                }
                other => other,
            };

            match result {
                Ok(items) => next.extend(items),
                Err(reason) => {
                    tracing::warn!(
                        "Dropping subtree {} in round {}: {}",
                        flight.label,
                        round,
                        reason
                    );
                    dropped.push(DroppedSubtree {
                        round,
                        item: flight.label,
                        reason,
                    });
                }
            }
        }

        next
    }
}

impl Scheduler for BatchDispatchScheduler {
    fn run<A: Aggregation>(&self, aggregation: Arc<A>, root: A::Item) -> Result<Outcome<A::Output>> {
        aggregation.validate_root(&root)?;

        let accumulator = Arc::new(Accumulator::new(aggregation.identity()));
        let mut dropped = Vec::new();
        let mut round = 0;
        let mut tasks = 0;
        let mut state = DispatchState::Frontier(vec![root]);

        loop {
            state = match state {
                DispatchState::Frontier(items) if items.is_empty() => DispatchState::Done,
                DispatchState::Frontier(items) => DispatchState::Dispatch(items),
                DispatchState::Dispatch(items) => {
                    tracing::debug!("Round {}: dispatching {} tasks", round, items.len());
                    let mut in_flight = Vec::with_capacity(items.len());
                    if let Err(e) = self.dispatch(&aggregation, &accumulator, items, &mut in_flight) {
                        // Submitted tasks that have not started yet skip their work
                        for flight in &in_flight {
                            flight.latch.try_abandon();
                        }
                        tracing::warn!("Round {} aborted: {}", round, e);
                        return Err(e);
                    }
                    tasks += in_flight.len();
                    DispatchState::Await(in_flight)
                }
                DispatchState::Await(in_flight) => {
                    DispatchState::NextFrontier(self.await_round(round, in_flight, &mut dropped))
                }
                DispatchState::NextFrontier(items) => {
                    round += 1;
                    DispatchState::Frontier(items)
                }
                DispatchState::Done => break,
            };
        }

        let value = accumulator.value();
        if dropped.is_empty() {
            tracing::info!(
                "Batch dispatch finished: value={:?}, rounds={}, tasks={}",
                value,
                round,
                tasks
            );
        } else {
            tracing::warn!(
                "Batch dispatch finished incomplete: value={:?}, rounds={}, tasks={}, dropped={}",
                value,
                round,
                tasks,
                dropped.len()
            );
        }

        Ok(Outcome {
            value,
            tasks,
            rounds: round,
            dropped,
        })
    }

    fn name(&self) -> &'static str {
        "batch-dispatch"
    }

    fn workers(&self) -> usize {
        self.pool.workers()
    }
}
