//! CLI flags as a configuration layer
//!
//! Only flags the user actually passed are serialized, so figment keeps the
//! lower layers for everything else.

use crate::cli::{Cli, Commands};
use serde::Serialize;

#[derive(Debug, Default, Serialize)]
pub struct ConfigOverrides {
    engine: EngineOverrides,
    tree: TreeOverrides,
    sequence: SequenceOverrides,
}

#[derive(Debug, Default, Serialize)]
struct EngineOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    batch_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Serialize)]
struct TreeOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    extension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    follow_symlinks: Option<bool>,
}

#[derive(Debug, Default, Serialize)]
struct SequenceOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    threshold: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lower_bound: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    upper_bound: Option<i64>,
}

impl ConfigOverrides {
    pub fn from_cli(cli: &Cli) -> Self {
        let mut overrides = Self {
            engine: EngineOverrides {
                workers: cli.workers,
                batch_timeout_ms: cli.timeout_ms,
            },
            ..Self::default()
        };

        match &cli.command {
            Some(Commands::Count {
                ext,
                follow_symlinks,
                ..
            }) => {
                overrides.tree.extension = ext.clone();
                // A bare flag can only switch following on
                overrides.tree.follow_symlinks = follow_symlinks.then_some(true);
            }
            Some(Commands::Pairsum {
                size,
                lower,
                upper,
                threshold,
                ..
            }) => {
                overrides.sequence = SequenceOverrides {
                    threshold: *threshold,
                    size: *size,
                    lower_bound: *lower,
                    upper_bound: *upper,
                };
            }
            _ => {}
        }

        overrides
    }
}
