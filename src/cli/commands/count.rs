//! Count command implementation
//!
//! Counts files under a directory whose names match a suffix or glob, once
//! per selected strategy.

use super::{check_agreement, print_reports, run_strategies};
use crate::cli::{Output, OutputFormat, StrategyChoice};
use crate::config::SplitfoldConfig;
use crate::domain::{FsTree, Matcher, count_matching};
use anyhow::Result;
use serde_json::json;

/// Execute the count command
pub fn execute(
    config: &SplitfoldConfig,
    dir: &str,
    globs: &[String],
    strategy: StrategyChoice,
    format: OutputFormat,
    output: &Output,
) -> Result<()> {
    let tree = FsTree::new(config.tree.follow_symlinks);
    let root = tree.root(dir)?;

    let matcher = if globs.is_empty() {
        Matcher::suffix(config.tree.extension.as_str())
    } else {
        Matcher::glob(globs)?
    };
    let pattern = if globs.is_empty() {
        config.tree.extension.clone()
    } else {
        globs.join(", ")
    };

    output.header(&format!("Counting '{}' files in {}", pattern, dir));

    let reports = run_strategies(&config.engine, strategy, |scheduler| {
        count_matching(scheduler, tree.clone(), root.clone(), matcher.clone())
    })?;

    print_reports(
        "count",
        &reports,
        Some(json!({ "directory": dir, "pattern": pattern })),
        format,
        output,
    )?;
    check_agreement(&reports)
}
