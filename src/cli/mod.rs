//! Command-line interface for splitfold
//!
//! Parses arguments with clap, loads the layered configuration with the
//! command's flags merged on top, and dispatches to the command modules.

use anyhow::Result;
use clap::{ArgAction, CommandFactory, Parser, Subcommand, ValueEnum};

pub mod commands;
mod output;

pub use output::Output;

use crate::config::SplitfoldConfig;
use crate::parallel::StrategyKind;
use commands::overrides::ConfigOverrides;

/// splitfold - Parallel aggregation with fork/join and batch dispatch
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Enable quiet output (minimal)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Worker threads per pool (default: derived from CPU cores)
    #[arg(long, value_name = "N", global = true)]
    pub workers: Option<usize>,

    /// Per-task deadline for batch dispatch in milliseconds
    #[arg(long, value_name = "MS", global = true)]
    pub timeout_ms: Option<u64>,

    /// Scheduling strategy to run
    #[arg(long, value_enum, default_value_t = StrategyChoice::Both, global = true)]
    pub strategy: StrategyChoice,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Count files under a directory whose names match
    Count {
        /// Directory to search
        dir: String,
        /// File name suffix to count (default from config: .pdf)
        #[arg(short, long, value_name = "EXT")]
        ext: Option<String>,
        /// Glob pattern matched against file names (repeatable, overrides --ext)
        #[arg(short, long, value_name = "PATTERN")]
        glob: Vec<String>,
        /// Descend into symbolic links to directories
        #[arg(long)]
        follow_symlinks: bool,
    },
    /// Sum adjacent pairs of a sequence
    Pairsum {
        /// Length of the random sequence
        #[arg(long, value_name = "N", conflicts_with = "numbers")]
        size: Option<usize>,
        /// Smallest random value (inclusive)
        #[arg(long, value_name = "A", conflicts_with = "numbers", allow_negative_numbers = true)]
        lower: Option<i64>,
        /// Largest random value (inclusive)
        #[arg(long, value_name = "B", conflicts_with = "numbers", allow_negative_numbers = true)]
        upper: Option<i64>,
        /// Explicit input instead of random values (comma-separated)
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        numbers: Option<Vec<i64>>,
        /// Ranges at most this long are summed without splitting
        #[arg(short, long, value_name = "T")]
        threshold: Option<usize>,
        /// Print the input sequence
        #[arg(long)]
        show_input: bool,
    },
    /// Show the effective configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigCommands>,
    },
    /// Show version information
    Version,
}

/// Configuration subcommands
#[derive(Subcommand, Clone, Copy)]
pub enum ConfigCommands {
    /// Print the merged configuration (default)
    Show,
    /// Check that the configuration loads and validates
    Validate,
}

/// Which schedulers a command runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyChoice {
    ForkJoin,
    BatchDispatch,
    Both,
}

impl StrategyChoice {
    pub fn kinds(&self) -> Vec<StrategyKind> {
        match self {
            StrategyChoice::ForkJoin => vec![StrategyKind::ForkJoin],
            StrategyChoice::BatchDispatch => vec![StrategyKind::BatchDispatch],
            StrategyChoice::Both => vec![StrategyKind::ForkJoin, StrategyKind::BatchDispatch],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        commands::setup_logging(self.verbose, self.quiet);

        // JSON documents own stdout, so styled text is suppressed
        let output = Output::new(self.verbose > 0, self.quiet || self.format == OutputFormat::Json);

        let Some(command) = self.command.as_ref() else {
            // Show help when no command is provided
            let mut cmd = Cli::command();
            cmd.print_help()?;
            return Ok(());
        };

        let load_config = || {
            SplitfoldConfig::load_with_overrides(
                self.config.as_deref(),
                Some(ConfigOverrides::from_cli(&self)),
            )
        };

        match command {
            Commands::Count { dir, glob, .. } => {
                commands::count::execute(&load_config()?, dir, glob, self.strategy, self.format, &output)
            }
            Commands::Pairsum {
                numbers,
                show_input,
                ..
            } => commands::pairsum::execute(
                &load_config()?,
                numbers.as_deref(),
                *show_input,
                self.strategy,
                self.format,
                &output,
            ),
            Commands::Config { action } => commands::config::execute(
                load_config(),
                action.unwrap_or(ConfigCommands::Show),
                self.format,
                &output,
            ),
            Commands::Version => commands::version::execute(&output),
        }
    }
}
