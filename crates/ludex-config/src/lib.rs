//! Configuration management for Ludex
//!
//! Handles the library scan settings: game directories, which source
//! providers and enrichers run, their string options, and the location of the
//! custom filters file. TOML-based config files, layered system-then-user.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Directory name used below the OS config/cache/data locations
pub const APP_DIR_NAME: &str = "ludex";

/// System-wide configuration directory
pub const SYSTEM_CONFIG_DIR: &str = "/etc/ludex";

/// Separator for list-valued string options
pub const LIST_SEPARATOR: char = ';';

/// Per-user configuration directory (`~/.config/ludex` on Linux)
pub fn user_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME))
}

/// Per-user cache directory (`~/.cache/ludex` on Linux)
pub fn user_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join(APP_DIR_NAME))
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };

    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Main Ludex configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LudexConfig {
    #[serde(default)]
    pub library: LibraryConfig,

    /// Settings keyed by provider name (`pegasus`, `es2`, `steam`, `media`, ...)
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
}

/// Library-wide settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Directories searched for native metadata files
    #[serde(default)]
    pub game_dirs: Vec<PathBuf>,

    /// Custom filter definitions
    #[serde(default)]
    pub filters_file: Option<PathBuf>,
}

/// Settings of a single provider or enricher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Free-form string options, documented per provider
    #[serde(flatten)]
    pub options: BTreeMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            options: BTreeMap::new(),
        }
    }
}

impl ProviderSettings {
    /// Builder-style option setter
    pub fn with_option(mut self, key: &str, value: impl Into<String>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    /// Raw option value, `None` when unset or blank
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Option interpreted as a path, with `~` expanded
    pub fn path_option(&self, key: &str) -> Option<PathBuf> {
        self.option(key).map(|value| expand_home(Path::new(value)))
    }

    /// Option interpreted as a `;`-separated list of paths
    pub fn path_list_option(&self, key: &str) -> Vec<PathBuf> {
        self.option(key)
            .map(|value| {
                value
                    .split(LIST_SEPARATOR)
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| expand_home(Path::new(item)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl LudexConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load and merge several files; later files override earlier ones.
    /// Missing files are skipped.
    pub fn load_layered(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let mut found = false;

        for path in paths {
            if !path.exists() {
                continue;
            }

            let contents = std::fs::read_to_string(path)?;
            let layer: toml::Value = toml::from_str(&contents)?;
            merge_toml(&mut merged, layer);
            found = true;
            tracing::debug!("Configuration layer loaded from {}", path.display());
        }

        if !found {
            tracing::warn!("No configuration file found, using defaults");
            return Ok(Self::default());
        }

        let config = merged.try_into::<Self>()?;
        Ok(config)
    }

    /// Load configuration from default locations: the system file first, the
    /// user file layered on top of it
    pub fn load_default() -> Result<Self, ConfigError> {
        let mut layers = vec![Path::new(SYSTEM_CONFIG_DIR).join("config.toml")];
        if let Some(dir) = user_config_dir() {
            layers.push(dir.join("config.toml"));
        }

        Self::load_layered(&layers)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        tracing::info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Save to default user configuration location
    pub fn save_default(&self) -> Result<(), ConfigError> {
        let dir = user_config_dir()
            .ok_or_else(|| ConfigError::Invalid("no user configuration directory".to_string()))?;
        self.save(&dir.join("config.toml"))
    }

    /// Settings for a provider; unset providers get the defaults (enabled,
    /// no options)
    pub fn provider(&self, name: &str) -> ProviderSettings {
        self.providers.get(name).cloned().unwrap_or_default()
    }

    /// Whether a provider is enabled
    pub fn is_enabled(&self, name: &str) -> bool {
        self.providers
            .get(name)
            .map(|settings| settings.enabled)
            .unwrap_or(true)
    }

    /// Game directories with `~` expanded
    pub fn game_dirs(&self) -> Vec<PathBuf> {
        self.library
            .game_dirs
            .iter()
            .map(|dir| expand_home(dir))
            .collect()
    }

    /// The filters file, falling back to `<config_dir>/ludex/filters.txt`
    pub fn filters_file(&self) -> Option<PathBuf> {
        match &self.library.filters_file {
            Some(path) => Some(expand_home(path)),
            None => user_config_dir().map(|dir| dir.join("filters.txt")),
        }
    }
}

/// Helper function to merge TOML values
pub fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                if let Some(base_value) = base_table.get_mut(&key) {
                    merge_toml(base_value, value);
                } else {
                    base_table.insert(key, value);
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
