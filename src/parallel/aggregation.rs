use crate::error::Result;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

/// A recursively decomposable reduction
///
/// Implementors describe *what* to compute; the schedulers in this module
/// decide *how* the work is spread over threads. `combine` must be
/// associative and commutative with `identity` as its neutral element,
/// otherwise the two strategies are free to disagree.
pub trait Aggregation: Send + Sync + 'static {
    /// An input fragment: a tree node, an index range, ...
    type Item: Send + Sync + Debug + 'static;
    /// Scalar partial result
    type Output: AtomicScalar;

    /// Decompose an item into sub-items. An empty vector marks a base case.
    fn split(&self, item: &Self::Item) -> Result<Vec<Self::Item>>;

    /// Compute the contribution of a base-case item
    fn evaluate(&self, item: &Self::Item) -> Result<Self::Output>;

    /// Merge two partial results
    fn combine(&self, a: Self::Output, b: Self::Output) -> Self::Output;

    /// Neutral element of [`Aggregation::combine`]
    fn identity(&self) -> Self::Output {
        Self::Output::default()
    }

    /// Cheap check for items that must be evaluated without splitting
    ///
    /// Batch dispatch uses this to fold leaf children into the accumulator
    /// inline instead of spending a task on each of them.
    fn is_leaf(&self, _item: &Self::Item) -> bool {
        false
    }

    /// Reject an unusable root before any task is created
    fn validate_root(&self, _root: &Self::Item) -> Result<()> {
        Ok(())
    }
}

/// Scalars that can live in a lock-free [`Accumulator`]
pub trait AtomicScalar: Copy + Default + Send + Sync + Debug + PartialEq + 'static {
    type Atomic: Send + Sync;

    fn new_atomic(value: Self) -> Self::Atomic;
    fn load(atomic: &Self::Atomic) -> Self;
    /// Apply `f(current, value)` as one atomic read-modify-write
    fn fetch_combine<F: Fn(Self, Self) -> Self>(atomic: &Self::Atomic, value: Self, f: F);
}

macro_rules! impl_atomic_scalar {
    ($($ty:ty => $atomic:ty),* $(,)?) => {
        $(
            impl AtomicScalar for $ty {
                type Atomic = $atomic;

                fn new_atomic(value: Self) -> Self::Atomic {
                    <$atomic>::new(value)
                }

                fn load(atomic: &Self::Atomic) -> Self {
                    atomic.load(Ordering::Acquire)
                }

                fn fetch_combine<F: Fn(Self, Self) -> Self>(atomic: &Self::Atomic, value: Self, f: F) {
                    // The closure always returns Some, so fetch_update cannot fail.
                    let _ = atomic.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                        Some(f(current, value))
                    });
                }
            }
        )*
    };
}

impl_atomic_scalar!(u64 => AtomicU64, i64 => AtomicI64, usize => AtomicUsize);

/// Shared result cell for strategies without a natural join point
pub struct Accumulator<T: AtomicScalar> {
    cell: T::Atomic,
}

impl<T: AtomicScalar> Accumulator<T> {
    pub fn new(initial: T) -> Self {
        Self {
            cell: T::new_atomic(initial),
        }
    }

    /// Fold a contribution into the accumulator
    pub fn fold<F: Fn(T, T) -> T>(&self, value: T, combine: F) {
        T::fetch_combine(&self.cell, value, combine);
    }

    pub fn value(&self) -> T {
        T::load(&self.cell)
    }
}

impl<T: AtomicScalar> Debug for Accumulator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accumulator").field("value", &self.value()).finish()
    }
}

/// [`Aggregation`] assembled from three closures
///
/// Every item is split until `split` returns an empty vector, so there is
/// no cheap leaf test and batch dispatch spends one task per item.
pub struct FnAggregation<I, O, S, E, C> {
    split: S,
    evaluate: E,
    combine: C,
    _marker: PhantomData<fn(I) -> O>,
}

/// Build an aggregation from `split`, `evaluate` and an associative `combine`
pub fn from_fns<I, O, S, E, C>(split: S, evaluate: E, combine: C) -> FnAggregation<I, O, S, E, C>
where
    I: Send + Sync + Debug + 'static,
    O: AtomicScalar,
    S: Fn(&I) -> Result<Vec<I>> + Send + Sync + 'static,
    E: Fn(&I) -> Result<O> + Send + Sync + 'static,
    C: Fn(O, O) -> O + Send + Sync + 'static,
{
    FnAggregation {
        split,
        evaluate,
        combine,
        _marker: PhantomData,
    }
}

impl<I, O, S, E, C> Aggregation for FnAggregation<I, O, S, E, C>
where
    I: Send + Sync + Debug + 'static,
    O: AtomicScalar,
    S: Fn(&I) -> Result<Vec<I>> + Send + Sync + 'static,
    E: Fn(&I) -> Result<O> + Send + Sync + 'static,
    C: Fn(O, O) -> O + Send + Sync + 'static,
{
    type Item = I;
    type Output = O;

    fn split(&self, item: &I) -> Result<Vec<I>> {
        (self.split)(item)
    }

    fn evaluate(&self, item: &I) -> Result<O> {
        (self.evaluate)(item)
    }

    fn combine(&self, a: O, b: O) -> O {
        (self.combine)(a, b)
    }
}
