//! Configuration command implementations

use crate::cli::{ConfigCommands, Output, OutputFormat};
use crate::config::SplitfoldConfig;
use anyhow::Result;

/// Execute config commands
pub fn execute(
    config: Result<SplitfoldConfig>,
    cmd: ConfigCommands,
    format: OutputFormat,
    output: &Output,
) -> Result<()> {
    match cmd {
        ConfigCommands::Show => show(&config?, format),
        ConfigCommands::Validate => validate(config, output),
    }
}

fn show(config: &SplitfoldConfig, format: OutputFormat) -> Result<()> {
    let rendered = match format {
        OutputFormat::Text => toml::to_string_pretty(config)?,
        OutputFormat::Json => serde_json::to_string_pretty(config)?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

fn validate(config: Result<SplitfoldConfig>, output: &Output) -> Result<()> {
    output.header("Validating Configuration");

    match config {
        Ok(config) => {
            output.success("Configuration is valid");
            output.blank_line();
            output.table_row("Pool size", &config.engine.pool_size().to_string());
            output.table_row(
                "Batch timeout",
                &format!("{} ms", config.engine.batch_timeout_ms),
            );
            output.table_row("Tree extension", &config.tree.extension);
            output.table_row("Pair threshold", &config.sequence.threshold.to_string());
            Ok(())
        }
        Err(e) => Err(e.context("Configuration is invalid")),
    }
}
