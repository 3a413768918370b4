//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/sensortree/sensortree.toml`
//! 3. Explicit config file handed in by the embedding application
//! 4. Environment variables: `SENSORTREE__*` prefix

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::{ApplicationError, ApplicationResult, BuildOptions};
use crate::domain::{ObjectId, ROOT_ID};

/// Unified configuration for sensortree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Object the tree is built from (default: the root group)
    pub root_id: ObjectId,
    /// Builder tuning
    pub build: BuildOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root_id: ROOT_ID,
            build: BuildOptions::default(),
        }
    }
}

/// Raw build options for intermediate parsing (None → inherit from base).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawBuildOptions {
    pub concurrency_limit: Option<usize>,
    pub include_channels: Option<bool>,
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub root_id: Option<ObjectId>,
    pub build: RawBuildOptions,
}

/// Get the XDG config directory for sensortree.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "sensortree").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("sensortree.toml"))
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> ApplicationResult<RawSettings> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}

/// An unset key is `None`; a set key that does not parse is an error.
fn present<T>(value: Result<T, ConfigError>) -> ApplicationResult<Option<T>> {
    match value {
        Ok(val) => Ok(Some(val)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(config_err(e)),
    }
}

impl Settings {
    /// Merge overlay config onto self (base). Overlay wins where it is set.
    pub fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            root_id: overlay.root_id.unwrap_or(self.root_id),
            build: BuildOptions {
                concurrency_limit: overlay
                    .build
                    .concurrency_limit
                    .unwrap_or(self.build.concurrency_limit),
                include_channels: overlay
                    .build
                    .include_channels
                    .unwrap_or(self.build.include_channels),
            },
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `explicit` - Optional config file supplied by the caller; it must exist
    pub fn load(explicit: Option<&Path>) -> ApplicationResult<Self> {
        // 1. Start with defaults
        let mut current = Self::default();

        // 2. Global config, if present
        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                current = current.merge_with(&load_raw_settings(&global_path)?);
            }
        }

        // 3. Explicit config
        if let Some(path) = explicit {
            current = current.merge_with(&load_raw_settings(path)?);
        }

        // 4. Environment variables
        current = Self::apply_env_overrides(current)?;

        current.validate()?;
        Ok(current)
    }

    /// Load from a single file on top of the defaults, ignoring global config
    /// and the environment.
    pub fn load_file(path: &Path) -> ApplicationResult<Self> {
        let settings = Self::default().merge_with(&load_raw_settings(path)?);
        settings.validate()?;
        Ok(settings)
    }

    /// Apply SENSORTREE__* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> ApplicationResult<Self> {
        let config = Config::builder()
            .add_source(Environment::with_prefix("SENSORTREE").separator("__"))
            .build()
            .map_err(config_err)?;

        if let Some(val) = present(config.get_int("root_id"))? {
            settings.root_id = ObjectId(val);
        }
        if let Some(val) = present(config.get_int("build.concurrency_limit"))? {
            settings.build.concurrency_limit =
                usize::try_from(val).map_err(|_| ApplicationError::Config {
                    message: format!("build.concurrency_limit must not be negative: {}", val),
                })?;
        }
        if let Some(val) = present(config.get_bool("build.include_channels"))? {
            settings.build.include_channels = val;
        }

        Ok(settings)
    }

    pub fn validate(&self) -> ApplicationResult<()> {
        if self.build.concurrency_limit == 0 {
            return Err(ApplicationError::Config {
                message: "build.concurrency_limit must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> ApplicationResult<String> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize settings: {}", e),
        })
    }
}
