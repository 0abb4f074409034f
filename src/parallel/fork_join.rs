use super::{Aggregation, Outcome, Scheduler};
use crate::error::{EngineError, Result};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Recursive fork/join over a rayon work-stealing pool
///
/// For every non-leaf item the children 2..N are spawned into a scope bound
/// to the current call frame, child 1 is computed on the current worker, and
/// the frame blocks on its own scope only. Idle workers steal spawned
/// children, so blocking is limited to the local subtree.
///
/// Failures are fail-fast: the first error raises an abort flag, subtrees
/// that have not started yet return immediately, and the caller receives
/// that first error.
pub struct ForkJoinScheduler {
    pool: rayon::ThreadPool,
}

impl ForkJoinScheduler {
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(EngineError::InvalidInput(
                "fork/join pool needs at least one worker".to_string(),
            ));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("splitfold-fj-{index}"))
            .build()
            .map_err(|e| EngineError::Rejected(format!("failed to build fork/join pool: {e}")))?;

        Ok(Self { pool })
    }
}

/// Per-run state shared by every frame of the recursion
struct ForkJoinRun<'a, A: Aggregation> {
    aggregation: &'a A,
    aborted: AtomicBool,
    first_failure: OnceLock<EngineError>,
    tasks: AtomicUsize,
}

impl<'a, A: Aggregation> ForkJoinRun<'a, A> {
    fn new(aggregation: &'a A) -> Self {
        Self {
            aggregation,
            aborted: AtomicBool::new(false),
            first_failure: OnceLock::new(),
            tasks: AtomicUsize::new(0),
        }
    }

    fn compute(&self, item: &A::Item) -> Result<A::Output> {
        if self.aborted.load(Ordering::Acquire) {
            return Err(EngineError::Aborted);
        }
        self.tasks.fetch_add(1, Ordering::Relaxed);

        let aggregation = self.aggregation;
        if aggregation.is_leaf(item) {
            return self.guard(aggregation.evaluate(item));
        }

        let children = self.guard(aggregation.split(item))?;
        let Some((first, rest)) = children.split_first() else {
            return self.guard(aggregation.evaluate(item));
        };

        let mut slots: Vec<Option<Result<A::Output>>> = rest.iter().map(|_| None).collect();
        let head = rayon::scope(|s| {
            for (child, slot) in rest.iter().zip(slots.iter_mut()) {
                s.spawn(move |_| *slot = Some(self.compute(child)));
            }
            // Continuation: the first child stays on this worker
            self.compute(first)
        });

        let mut total = head?;
        for slot in slots {
            let value = slot.unwrap_or(Err(EngineError::Aborted))?;
            total = aggregation.combine(total, value);
        }
        Ok(total)
    }

    /// Record the first real failure and stop scheduling new work
    fn guard<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result
            && *e != EngineError::Aborted
        {
            let _ = self.first_failure.set(e.clone());
            self.aborted.store(true, Ordering::Release);
        }
        result
    }
}

impl Scheduler for ForkJoinScheduler {
    fn run<A: Aggregation>(&self, aggregation: Arc<A>, root: A::Item) -> Result<Outcome<A::Output>> {
        aggregation.validate_root(&root)?;

        let run = ForkJoinRun::new(aggregation.as_ref());
        let result = self
            .pool
            .install(|| catch_unwind(AssertUnwindSafe(|| run.compute(&root))));

        let value = match result {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                let failure = run.first_failure.into_inner().unwrap_or(e);
                tracing::debug!("Fork/join run failed: {}", failure);
                return Err(failure);
            }
            Err(payload) => {
                let failure = EngineError::from_panic(payload);
                tracing::debug!("Fork/join run panicked: {}", failure);
                return Err(failure);
            }
        };

        let tasks = run.tasks.into_inner();
        tracing::info!(
            "Fork/join finished: value={:?}, tasks={}, workers={}",
            value,
            tasks,
            self.workers()
        );

        Ok(Outcome {
            value,
            tasks,
            rounds: 0,
            dropped: Vec::new(),
        })
    }

    fn name(&self) -> &'static str {
        "fork-join"
    }

    fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::aggregation::from_fns;
    use std::sync::atomic::AtomicUsize;

    fn ranges(threshold: u64) -> impl Aggregation<Item = (u64, u64), Output = u64> {
        from_fns(
            move |&(lo, hi): &(u64, u64)| {
                if hi - lo <= threshold {
                    Ok(vec![])
                } else {
                    let mid = lo + (hi - lo) / 2;
                    Ok(vec![(lo, mid), (mid, hi)])
                }
            },
            |&(lo, hi): &(u64, u64)| Ok((lo..hi).sum()),
            |a: u64, b: u64| a + b,
        )
    }

    #[test]
    fn test_sum_of_range() {
        let scheduler = ForkJoinScheduler::new(4).unwrap();
        let outcome = scheduler.run(Arc::new(ranges(8)), (0, 1000)).unwrap();
        assert_eq!(outcome.value, 499_500);
        assert!(outcome.is_complete());
        assert!(outcome.tasks > 1);
    }

    #[test]
    fn test_single_worker_matches_many() {
        let one = ForkJoinScheduler::new(1).unwrap();
        let many = ForkJoinScheduler::new(8).unwrap();
        let a = one.run(Arc::new(ranges(3)), (0, 777)).unwrap();
        let b = many.run(Arc::new(ranges(3)), (0, 777)).unwrap();
        assert_eq!(a.value, b.value);
    }

    #[test]
    fn test_failure_propagates_to_caller() {
        let agg = from_fns(
            |n: &u32| Ok(if *n < 6 { vec![n + 1, n + 1] } else { vec![] }),
            |n: &u32| {
                if *n == 6 {
                    Err(EngineError::evaluation(n, "leaf refused"))
                } else {
                    Ok(1u64)
                }
            },
            |a: u64, b: u64| a + b,
        );

        let scheduler = ForkJoinScheduler::new(4).unwrap();
        let err = scheduler.run(Arc::new(agg), 0).unwrap_err();
        assert_eq!(err, EngineError::evaluation(6u32, "leaf refused"));
    }

    #[test]
    fn test_failure_stops_unstarted_work() {
        static EVALUATED: AtomicUsize = AtomicUsize::new(0);

        // One failing leaf followed by a wide fan of healthy ones
        let agg = from_fns(
            |n: &u32| Ok(if *n == 0 { (1..=2000).collect() } else { vec![] }),
            |n: &u32| {
                if *n == 1 {
                    Err(EngineError::evaluation(n, "first child fails"))
                } else {
                    EVALUATED.fetch_add(1, Ordering::Relaxed);
                    Ok(1u64)
                }
            },
            |a: u64, b: u64| a + b,
        );

        let scheduler = ForkJoinScheduler::new(1).unwrap();
        assert!(scheduler.run(Arc::new(agg), 0).is_err());
        // With one worker the continuation runs first, so no sibling starts
        assert_eq!(EVALUATED.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_panic_becomes_error() {
        let agg = from_fns(
            |n: &u8| Ok(if *n == 0 { vec![1, 2] } else { vec![] }),
            |n: &u8| -> Result<u64> {
                if *n == 2 {
                    panic!("evaluate panicked");
                }
                Ok(1)
            },
            |a: u64, b: u64| a + b,
        );

        let scheduler = ForkJoinScheduler::new(2).unwrap();
        let err = scheduler.run(Arc::new(agg), 0).unwrap_err();
        assert_eq!(err, EngineError::Panicked("evaluate panicked".to_string()));
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            ForkJoinScheduler::new(0),
            Err(EngineError::InvalidInput(_))
        ));
    }
}
