use super::SplitfoldConfig;
use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
};
use serde::Serialize;
use std::path::{Path, PathBuf};

// Embed the default config at compile time
const DEFAULT_CONFIG: &str = include_str!("../../default-config.toml");

const CONFIG_EXTENSIONS: [&str; 4] = ["toml", "json", "yaml", "yml"];

impl SplitfoldConfig {
    /// Load configuration from the default layers
    pub fn load(custom_config: Option<&str>) -> Result<Self> {
        Self::load_with_overrides(custom_config, None::<()>)
    }

    /// Load configuration with optional CLI overrides merged last
    ///
    /// Layers, lowest priority first: embedded defaults, user config, repo
    /// config, `SPLITFOLD_` environment variables, CLI overrides. A custom
    /// config file replaces both the user and the repo layer and must exist.
    pub fn load_with_overrides<T: Serialize>(
        custom_config: Option<&str>,
        cli_overrides: Option<T>,
    ) -> Result<Self> {
        tracing::trace!("CONFIG LOAD: Starting");

        let mut figment = Figment::new().merge(Toml::string(DEFAULT_CONFIG));

        if let Some(custom_path) = custom_config {
            if !Path::new(custom_path).exists() {
                bail!("Config file not found: {}", custom_path);
            }
            tracing::trace!("CONFIG LOAD: Custom config {}", custom_path);
            figment = merge_file(figment, Path::new(custom_path));
        } else {
            if let Some(user_base) = Self::user_config_base_path() {
                for ext in CONFIG_EXTENSIONS {
                    figment = merge_file(figment, &user_base.with_extension(ext));
                }
            }
            for ext in CONFIG_EXTENSIONS {
                figment = merge_file(figment, Path::new(&format!("splitfold.{ext}")));
            }
        }

        // SPLITFOLD_ENGINE__MAX_THREADS=4 -> engine.max_threads
        figment = figment.merge(Env::prefixed("SPLITFOLD_").split("__"));

        if let Some(overrides) = cli_overrides {
            tracing::trace!("CONFIG LOAD: Merging CLI overrides");
            figment = figment.merge(Serialized::defaults(overrides));
        }

        let config: SplitfoldConfig = figment
            .extract()
            .context("Failed to parse configuration")?;
        config.validate()?;

        tracing::trace!("CONFIG LOAD: Complete");
        Ok(config)
    }

    /// `~/.config/splitfold/config`, without an extension
    fn user_config_base_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("splitfold")
                .join("config")
        })
    }
}

/// Missing files are skipped by the figment file providers
fn merge_file(figment: Figment, path: &Path) -> Figment {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => figment.merge(Json::file(path)),
        Some("yaml") | Some("yml") => figment.merge(Yaml::file(path)),
        _ => figment.merge(Toml::file(path)),
    }
}
