//! # splitfold - parallel aggregation with two scheduling strategies
//!
//! splitfold reduces a recursively decomposable input (a directory tree, a
//! number sequence, or anything implementing [`parallel::Aggregation`]) with
//! either of two interchangeable strategies:
//!
//! - **Fork/Join** (work stealing): recursive tasks on a rayon pool, results
//!   joined bottom-up, fail-fast on errors
//! - **Batch Dispatch** (work dealing): one frontier of tasks per round on a
//!   fixed pool, a lock-free shared accumulator, per-task timeouts and
//!   best-effort results when tasks fail
//!
//! Without failures both strategies return the same value for the same input,
//! whatever the number of workers.
//!
//! ## Library Usage
//!
//! ```rust
//! use splitfold::domain::{Matcher, MemoryTree, count_matching, pair_sum};
//! use splitfold::parallel::{BatchDispatchScheduler, ForkJoinScheduler};
//! use std::time::Duration;
//!
//! let fork_join = ForkJoinScheduler::new(4)?;
//! let batch = BatchDispatchScheduler::new(4, Duration::from_secs(5))?;
//!
//! let tree = MemoryTree::from_paths("root", &["a.txt", "b.pdf", "sub/c.pdf"]);
//! let root = tree.root();
//! let outcome = count_matching(&batch, tree, root, Matcher::suffix(".pdf"))?;
//! assert_eq!(outcome.value, 2);
//!
//! let outcome = pair_sum(&fork_join, vec![5i64, 1, 9, 2, 7], 10)?;
//! assert_eq!(outcome.value, 36);
//! # Ok::<(), splitfold::EngineError>(())
//! ```
//!
//! ## Command Line
//!
//! ```bash
//! # Count PDF files with both strategies and compare timings
//! splitfold count ~/Documents --ext .pdf
//!
//! # Pairwise sum of 1,000,000 random numbers in [1, 100]
//! splitfold pairsum --size 1000000 --lower 1 --upper 100
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod parallel;

pub use config::SplitfoldConfig;
pub use error::{EngineError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
