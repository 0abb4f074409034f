//! Configuration management for splitfold
//!
//! Settings are layered with figment (see [`core`]) and extracted into the
//! typed [`SplitfoldConfig`]. Every key has a default, so an empty or
//! missing config file is valid.

pub mod core;

use crate::error::EngineError;
use crate::parallel::{ExecutionStrategy, Scheduler, StrategyKind};
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SplitfoldConfig {
    /// Worker pools and scheduling
    pub engine: EngineSettings,

    /// Directory counting
    pub tree: TreeSettings,

    /// Pairwise sums
    pub sequence: SequenceSettings,
}

/// Worker pool and scheduling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Fixed pool size (0 = derive from CPU cores)
    pub workers: usize,

    /// Maximum number of worker threads (0 = no limit)
    pub max_threads: usize,

    /// Percentage of CPU cores to use (1-100)
    pub thread_percentage: u8,

    /// Per-task deadline for batch dispatch (milliseconds)
    pub batch_timeout_ms: u64,

    /// Maximum queued batch dispatch tasks (0 = unbounded)
    pub queue_capacity: usize,
}

/// Directory counting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeSettings {
    /// File name suffix to count
    pub extension: String,

    /// Descend into symbolic links to directories
    pub follow_symlinks: bool,
}

/// Pairwise sum configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceSettings {
    /// Ranges at most this long are summed without splitting
    pub threshold: usize,

    /// Length of the generated sequence
    pub size: usize,

    /// Smallest generated value (inclusive)
    pub lower_bound: i64,

    /// Largest generated value (inclusive)
    pub upper_bound: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            workers: 0,
            max_threads: 0,
            thread_percentage: 100,
            batch_timeout_ms: 5000,
            queue_capacity: 0,
        }
    }
}

impl Default for TreeSettings {
    fn default() -> Self {
        Self {
            extension: ".pdf".to_string(),
            follow_symlinks: false,
        }
    }
}

impl Default for SequenceSettings {
    fn default() -> Self {
        Self {
            threshold: crate::domain::sequence::DEFAULT_THRESHOLD,
            size: 100,
            lower_bound: 1,
            upper_bound: 100,
        }
    }
}

impl EngineSettings {
    /// Pool size: the fixed `workers` setting, or one derived from available
    /// cores and the configured limits
    pub fn pool_size(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            ExecutionStrategy::calculate_optimal_workers(self.max_threads, self.thread_percentage)
        }
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// Build the scheduler for `kind` from these settings
    pub fn scheduler(&self, kind: StrategyKind) -> std::result::Result<ExecutionStrategy, EngineError> {
        ExecutionStrategy::build(kind, self.pool_size(), self.batch_timeout(), self.queue_capacity)
    }
}

impl SplitfoldConfig {
    /// Reject settings no run could use
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.engine.thread_percentage) {
            bail!(
                "engine.thread_percentage must be between 1 and 100, got {}",
                self.engine.thread_percentage
            );
        }
        if self.engine.batch_timeout_ms == 0 {
            bail!("engine.batch_timeout_ms must be greater than zero");
        }
        if self.sequence.threshold < 2 {
            bail!(
                "sequence.threshold must be at least 2, got {}",
                self.sequence.threshold
            );
        }
        if self.sequence.lower_bound > self.sequence.upper_bound {
            bail!(
                "sequence.lower_bound ({}) is greater than sequence.upper_bound ({})",
                self.sequence.lower_bound,
                self.sequence.upper_bound
            );
        }
        Ok(())
    }
}
