//! `docweave.toml` schema and loading.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "DOCWEAVE_CONFIG";

/// Config file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "docweave.toml";

/// Engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub render: RenderSettings,
    pub templating: TemplatingSettings,
    pub env: EnvSettings,
    pub limits: Limits,
}

/// `[render]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderSettings {
    /// Tag gate set; empty means every block is open
    pub required_tags: Vec<String>,
}

/// `[templating]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplatingSettings {
    pub enabled: bool,
}

impl Default for TemplatingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
        }
    }
}

/// `[env]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvSettings {
    /// Only variables starting with this prefix are exposed under `.env`
    pub prefix: Option<String>,
}

/// `[limits]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Limits {
    /// Maximum block nesting, counting ref and depends_on recursion
    pub max_depth: usize,
    /// Maximum number of iterations of one dynamic block
    pub max_dynamic_items: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_dynamic_items: 10_000,
        }
    }
}

impl EngineConfig {
    /// Load the configuration following the lookup order.
    ///
    /// An explicit path or one named by `DOCWEAVE_CONFIG` must exist;
    /// `./docweave.toml` is optional.
    ///
    /// # Errors
    ///
    /// Returns an error if a required file is missing or any file found cannot
    /// be read or parsed.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path).await;
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|p| !p.is_empty()) {
            return Self::load_from(&PathBuf::from(path)).await;
        }
        let default = Path::new(DEFAULT_CONFIG_FILE);
        if default.exists() {
            return Self::load_from(default).await;
        }
        tracing::debug!("no config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid config.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid TOML or unknown keys.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Replace the required tag set, e.g. from `--tags`.
    #[must_use]
    pub fn with_required_tags(mut self, tags: Vec<String>) -> Self {
        self.render.required_tags = tags;
        self
    }

    /// Prefix used to build the `.env` context root.
    pub fn env_prefix(&self) -> &str {
        self.env.prefix.as_deref().unwrap_or_default()
    }
}
