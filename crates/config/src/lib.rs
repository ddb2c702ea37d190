#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for fman
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/fman/config.toml)
//! - Environment variables
//! - CLI flags

pub mod constants;

use fman_errors::{ConfigError, Error};
use fman_types::{ColorChoice, Environment, OutputFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub install: InstallConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub paths: PathConfig,

    #[serde(default)]
    pub environment: EnvironmentConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
    #[serde(default = "default_color_choice")]
    pub color: ColorChoice,
}

/// Install transaction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Upper bound on concurrently fetched plugin archives
    #[serde(default = "default_parallel_fetches")]
    pub parallel_fetches: usize,
    /// Content without a declared digest is reported as unsigned
    #[serde(default)]
    pub require_digests: bool,
    /// Accept unsigned content without asking
    #[serde(default)]
    pub accept_unsigned: bool,
}

/// Configuration history settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_max_history_count")]
    pub max_history_count: usize,
    /// Configure features found on sites that were not known before
    #[serde(default = "default_optimistic")]
    pub optimistic_reconciliation: bool,
}

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfig {
    pub state_path: Option<PathBuf>,
    /// Local site directories opened at startup
    #[serde(default)]
    pub sites: Vec<PathBuf>,
}

/// Overrides for the detected running environment
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnvironmentConfig {
    pub os: Option<String>,
    pub ws: Option<String>,
    pub arch: Option<String>,
    pub nl: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: OutputFormat::Tty,
            color: ColorChoice::Auto,
        }
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            parallel_fetches: default_parallel_fetches(),
            require_digests: false,
            accept_unsigned: false,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history_count: default_max_history_count(),
            optimistic_reconciliation: true,
        }
    }
}

// Default value functions for serde
fn default_output_format() -> OutputFormat {
    OutputFormat::Tty
}

fn default_color_choice() -> ColorChoice {
    ColorChoice::Auto
}

fn default_parallel_fetches() -> usize {
    constants::DEFAULT_PARALLEL_FETCHES
}

fn default_max_history_count() -> usize {
    constants::DEFAULT_MAX_HISTORY
}

fn default_optimistic() -> bool {
    true
}

fn parse_bool(field: &str, value: String) -> Result<bool, Error> {
    match value.as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        }
        .into()),
    }
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir
            .join(constants::APP_DIR)
            .join(constants::CONFIG_FILE))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: &Option<PathBuf>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Write the configuration as TOML
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the file cannot be written.
    pub async fn save_to_file(&self, path: &Path) -> Result<(), Error> {
        let contents = toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            error: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ConfigError::WriteError {
                    path: parent.display().to_string(),
                    error: e.to_string(),
                })?;
        }
        fs::write(path, contents)
            .await
            .map_err(|e| ConfigError::WriteError {
                path: path.display().to_string(),
                error: e.to_string(),
            })?;
        Ok(())
    }

    /// Reject values that would make the engine misbehave
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a zero history cap or zero fetch limit.
    pub fn validate(&self) -> Result<(), Error> {
        if self.history.max_history_count == 0 {
            return Err(ConfigError::InvalidValue {
                field: "history.max_history_count".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        if self.install.parallel_fetches == 0 {
            return Err(ConfigError::InvalidValue {
                field: "install.parallel_fetches".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        // FMAN_OUTPUT
        if let Ok(output) = std::env::var("FMAN_OUTPUT") {
            self.general.default_output = match output.as_str() {
                "plain" => OutputFormat::Plain,
                "tty" => OutputFormat::Tty,
                "json" => OutputFormat::Json,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "FMAN_OUTPUT".to_string(),
                        value: output,
                    }
                    .into())
                }
            };
        }

        // FMAN_COLOR
        if let Ok(color) = std::env::var("FMAN_COLOR") {
            self.general.color = match color.as_str() {
                "always" => ColorChoice::Always,
                "auto" => ColorChoice::Auto,
                "never" => ColorChoice::Never,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "FMAN_COLOR".to_string(),
                        value: color,
                    }
                    .into())
                }
            };
        }

        // FMAN_HISTORY_COUNT
        if let Ok(count) = std::env::var("FMAN_HISTORY_COUNT") {
            self.history.max_history_count =
                count
                    .parse()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| ConfigError::InvalidValue {
                        field: "FMAN_HISTORY_COUNT".to_string(),
                        value: count,
                    })?;
        }

        // FMAN_STATE_PATH
        if let Ok(path) = std::env::var("FMAN_STATE_PATH") {
            if path.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "FMAN_STATE_PATH".to_string(),
                    value: path,
                }
                .into());
            }
            self.paths.state_path = Some(PathBuf::from(path));
        }

        // FMAN_PARALLEL_FETCHES
        if let Ok(fetches) = std::env::var("FMAN_PARALLEL_FETCHES") {
            self.install.parallel_fetches = fetches
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: "FMAN_PARALLEL_FETCHES".to_string(),
                    value: fetches,
                })?;
        }

        // FMAN_OPTIMISTIC
        if let Ok(optimistic) = std::env::var("FMAN_OPTIMISTIC") {
            self.history.optimistic_reconciliation = parse_bool("FMAN_OPTIMISTIC", optimistic)?;
        }

        Ok(())
    }

    /// Get the state path (with default)
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.paths.state_path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(constants::APP_DIR)
                .join(constants::STATE_DIR)
        })
    }

    /// Directory for debug log files
    #[must_use]
    pub fn logs_path(&self) -> PathBuf {
        self.state_path().join(constants::LOGS_DIR)
    }

    /// The running environment with configured overrides applied
    #[must_use]
    pub fn environment(&self) -> Environment {
        let env = &self.environment;
        Environment::current().with_overrides(
            env.os.as_deref(),
            env.ws.as_deref(),
            env.arch.as_deref(),
            env.nl.as_deref(),
        )
    }
}
