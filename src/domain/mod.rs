//! Domain adapters binding concrete inputs to the [`crate::parallel`] engine
//!
//! Each adapter is written once and runs under either scheduler:
//!
//! - [`tree`]: count leaves of a tree (directory listing) whose name matches
//! - [`sequence`]: sum adjacent pairs of a number sequence

pub mod sequence;
pub mod tree;

pub use sequence::{IndexRange, PairSum, pair_sum};
pub use tree::{FsTree, Matcher, MemoryTree, TreeCount, TreeSource, count_matching};
