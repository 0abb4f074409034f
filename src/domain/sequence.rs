//! Sequence aggregation: sum of adjacent pairs
//!
//! For `seq = [x0, x1, ..., xn]` the result is `Σ (x[i] + x[i+1])`. Ranges
//! longer than the threshold are halved; the halves share their midpoint
//! element so the pair straddling the cut is counted exactly once and the
//! total does not depend on the threshold.

use crate::error::{EngineError, Result};
use crate::parallel::{Aggregation, Outcome, Scheduler};
use std::fmt::Debug;
use std::sync::Arc;

/// Ranges at most this long are summed directly
pub const DEFAULT_THRESHOLD: usize = 10;

/// Half-open index range `[start, end)`
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub start: usize,
    pub end: usize,
}

impl IndexRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Debug for IndexRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// [`Aggregation`] summing adjacent pairs of a shared sequence
#[derive(Debug, Clone)]
pub struct PairSum {
    numbers: Arc<[i64]>,
    threshold: usize,
}

impl PairSum {
    /// `threshold` must be at least 2: a two-element range cannot shrink further
    pub fn new(numbers: impl Into<Arc<[i64]>>, threshold: usize) -> Result<Self> {
        if threshold < 2 {
            return Err(EngineError::InvalidInput(format!(
                "threshold must be at least 2, got {threshold}"
            )));
        }
        Ok(Self {
            numbers: numbers.into(),
            threshold,
        })
    }

    /// Range covering the whole sequence
    pub fn full_range(&self) -> IndexRange {
        IndexRange::new(0, self.numbers.len())
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

impl Aggregation for PairSum {
    type Item = IndexRange;
    type Output = i64;

    fn split(&self, range: &IndexRange) -> Result<Vec<IndexRange>> {
        if self.is_leaf(range) {
            return Ok(Vec::new());
        }
        let mid = range.start + range.len() / 2;
        Ok(vec![
            IndexRange::new(range.start, mid + 1),
            IndexRange::new(mid, range.end),
        ])
    }

    fn evaluate(&self, range: &IndexRange) -> Result<i64> {
        let slice = self
            .numbers
            .get(range.start..range.end)
            .ok_or_else(|| EngineError::evaluation(range, "range outside the sequence"))?;
        slice
            .windows(2)
            .try_fold(0i64, |total, pair| {
                pair[0].checked_add(pair[1])?.checked_add(total)
            })
            .ok_or_else(|| EngineError::evaluation(range, "pair sum overflows i64"))
    }

    /// Cannot overflow once `validate_root` accepted the root
    fn combine(&self, a: i64, b: i64) -> i64 {
        a + b
    }

    fn is_leaf(&self, range: &IndexRange) -> bool {
        range.len() <= self.threshold
    }

    fn validate_root(&self, root: &IndexRange) -> Result<()> {
        if root.start > root.end || root.end > self.numbers.len() {
            return Err(EngineError::InvalidInput(format!(
                "range {:?} does not fit a sequence of length {}",
                root,
                self.numbers.len()
            )));
        }

        // Bounding the absolute pair sums bounds every partial result too
        let magnitude: i128 = self.numbers[root.start..root.end]
            .windows(2)
            .map(|pair| (i128::from(pair[0]) + i128::from(pair[1])).abs())
            .sum();
        if magnitude > i128::from(i64::MAX) {
            return Err(EngineError::InvalidInput(format!(
                "pair sums over {root:?} overflow i64"
            )));
        }
        Ok(())
    }
}

/// Sum adjacent pairs of `numbers`, splitting ranges longer than `threshold`
pub fn pair_sum<S: Scheduler>(
    scheduler: &S,
    numbers: impl Into<Arc<[i64]>>,
    threshold: usize,
) -> Result<Outcome<i64>> {
    let aggregation = PairSum::new(numbers, threshold)?;
    let root = aggregation.full_range();
    scheduler.run(Arc::new(aggregation), root)
}
