//! Command implementations for the splitfold CLI
//!
//! Each command is organized into its own module. The helpers here run the
//! selected schedulers over one input and report every run the same way.

pub mod config;
pub mod count;
pub mod overrides;
pub mod pairsum;
pub mod version;

use crate::cli::{Output, OutputFormat, StrategyChoice};
use crate::config::EngineSettings;
use crate::error::EngineError;
use crate::parallel::{
    AtomicScalar, DroppedSubtree, ExecutionStrategy, Outcome, Scheduler, StrategyKind,
};
use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::fmt::Display;
use std::time::Instant;

/// Setup logging based on verbosity level
pub fn setup_logging(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => tracing_subscriber::EnvFilter::new("warn"),
        1 => tracing_subscriber::EnvFilter::new("info"),
        2 => tracing_subscriber::EnvFilter::new("debug"),
        _ => tracing_subscriber::EnvFilter::new("trace"),
    });

    // Logs go to stderr so reports on stdout stay machine readable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// One scheduler's run over the command input
#[derive(Debug, Serialize)]
pub struct StrategyReport<T> {
    pub strategy: StrategyKind,
    pub label: &'static str,
    #[serde(skip)]
    pub scheduler: &'static str,
    pub workers: usize,
    pub value: T,
    pub elapsed_ms: u128,
    pub tasks: usize,
    pub rounds: usize,
    pub complete: bool,
    pub dropped: Vec<DroppedSubtree>,
}

/// Run `job` once per selected strategy, each on a freshly built pool
pub fn run_strategies<T, F>(
    settings: &EngineSettings,
    choice: StrategyChoice,
    job: F,
) -> Result<Vec<StrategyReport<T>>>
where
    T: AtomicScalar + PartialEq,
    F: Fn(&ExecutionStrategy) -> std::result::Result<Outcome<T>, EngineError>,
{
    let mut reports = Vec::new();

    for kind in choice.kinds() {
        let scheduler = settings
            .scheduler(kind)
            .with_context(|| format!("Failed to start {} pool", kind.label()))?;
        let workers = scheduler.workers();

        let started = Instant::now();
        let outcome = job(&scheduler).with_context(|| format!("{} run failed", kind.label()))?;
        let elapsed_ms = started.elapsed().as_millis();

        tracing::debug!("{} took {} ms", kind.label(), elapsed_ms);

        reports.push(StrategyReport {
            strategy: kind,
            label: kind.label(),
            scheduler: scheduler.name(),
            workers,
            complete: outcome.is_complete(),
            value: outcome.value,
            elapsed_ms,
            tasks: outcome.tasks,
            rounds: outcome.rounds,
            dropped: outcome.dropped,
        });
    }

    Ok(reports)
}

/// Complete runs must agree; incomplete ones are only expected to be short
pub fn check_agreement<T: PartialEq + Display>(reports: &[StrategyReport<T>]) -> Result<()> {
    let mut complete = reports.iter().filter(|r| r.complete);
    if let Some(first) = complete.next() {
        for other in complete {
            if other.value != first.value {
                bail!(
                    "Strategies disagree: {} = {}, {} = {}",
                    first.label,
                    first.value,
                    other.label,
                    other.value
                );
            }
        }
    }
    Ok(())
}

/// Print reports as text or as one JSON document
pub fn print_reports<T: Serialize + Display>(
    command: &str,
    reports: &[StrategyReport<T>],
    extra: Option<serde_json::Value>,
    format: OutputFormat,
    output: &Output,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let mut document = serde_json::json!({
                "command": command,
                "results": reports,
            });
            if let Some(serde_json::Value::Object(fields)) = extra
                && let Some(map) = document.as_object_mut()
            {
                map.extend(fields);
            }
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        OutputFormat::Text => {
            for report in reports {
                output.section_header(&format!("{} ({})", report.label, report.scheduler));
                output.table_row("Result", &report.value.to_string());
                output.table_row("Elapsed", &format!("{} ms", report.elapsed_ms));
                output.verbose(&format!(
                    "{} workers, {} tasks, {} rounds",
                    report.workers, report.tasks, report.rounds
                ));

                if !report.complete {
                    output.warning(&format!(
                        "{} subtree(s) dropped, result is incomplete",
                        report.dropped.len()
                    ));
                    for dropped in &report.dropped {
                        output.list_item(&format!(
                            "round {}: {} ({})",
                            dropped.round, dropped.item, dropped.reason
                        ));
                    }
                }
            }
        }
    }
    Ok(())
}
