//! Pairsum command implementation
//!
//! Sums adjacent pairs of an explicit or randomly generated sequence, once
//! per selected strategy.

use super::{check_agreement, print_reports, run_strategies};
use crate::cli::{Output, OutputFormat, StrategyChoice};
use crate::config::{SequenceSettings, SplitfoldConfig};
use crate::domain::pair_sum;
use anyhow::Result;
use rand::Rng;
use serde_json::json;
use std::sync::Arc;

/// Execute the pairsum command
pub fn execute(
    config: &SplitfoldConfig,
    numbers: Option<&[i64]>,
    show_input: bool,
    strategy: StrategyChoice,
    format: OutputFormat,
    output: &Output,
) -> Result<()> {
    let settings = &config.sequence;
    let input: Arc<[i64]> = match numbers {
        Some(numbers) => numbers.into(),
        None => random_sequence(settings).into(),
    };

    output.header(&format!(
        "Summing adjacent pairs of {} numbers (threshold {})",
        input.len(),
        settings.threshold
    ));
    if show_input && format == OutputFormat::Text {
        output.info(&format!("Input: {:?}", input));
    }

    let reports = run_strategies(&config.engine, strategy, |scheduler| {
        pair_sum(scheduler, Arc::clone(&input), settings.threshold)
    })?;

    let mut extra = json!({ "length": input.len(), "threshold": settings.threshold });
    if show_input {
        extra["input"] = json!(input.as_ref());
    }

    print_reports("pairsum", &reports, Some(extra), format, output)?;
    check_agreement(&reports)
}

/// `size` values drawn uniformly from `lower_bound..=upper_bound`
fn random_sequence(settings: &SequenceSettings) -> Vec<i64> {
    let mut rng = rand::thread_rng();
    (0..settings.size)
        .map(|_| rng.gen_range(settings.lower_bound..=settings.upper_bound))
        .collect()
}
