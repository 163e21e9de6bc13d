//! Configuration parsing and management for lcovmerge.
//!
//! This crate provides:
//! - Configuration types (`Config`, `ChecksumConfig`, ...)
//! - TOML parsing and discovery of `lcovmerge.toml`
//! - Precedence handling (CLI > config file > defaults)

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name searched for by [`discover_config`].
pub const CONFIG_FILE_NAME: &str = "lcovmerge.toml";

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value.
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Log verbosity accepted in `[log] level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

/// `[checksum]` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChecksumConfig {
    /// Ignore checksums found in the inputs and never export them.
    #[serde(default)]
    pub discard: Option<bool>,
    /// Compute checksums for lines that lack one.
    #[serde(default)]
    pub generate: Option<bool>,
}

/// `[sources]` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcesConfig {
    /// Directory relative `SF` paths are resolved against. A relative value
    /// read by [`load_config`] is anchored at the config file's directory.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// `[log]` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: Option<LogLevel>,
}

/// Full configuration file contents.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub checksum: ChecksumConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub log: LogConfig,
}

// ============================================================================
// Effective Configuration
// ============================================================================

/// Effective configuration with all values resolved.
///
/// This represents the final configuration after applying:
/// 1. Built-in defaults
/// 2. Config file values
/// 3. CLI overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub discard_checksum: bool,
    pub generate_checksum: bool,
    pub source_root: PathBuf,
    pub log_level: LogLevel,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            discard_checksum: false,
            generate_checksum: false,
            source_root: PathBuf::from("."),
            log_level: LogLevel::Warn,
        }
    }
}

// ============================================================================
// Configuration Loading
// ============================================================================

/// Load configuration from a TOML file.
///
/// A relative `sources.root` is resolved against the directory holding
/// `path`, not the working directory.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;
    if let Some(root) = &mut config.sources.root
        && root.is_relative()
        && let Some(dir) = path.parent()
    {
        *root = dir.join(&*root);
    }
    Ok(config)
}

/// Load configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if let Some(root) = &config.sources.root
        && root.as_os_str().is_empty()
    {
        return Err(ConfigError::InvalidValue(
            "sources.root must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Find and load `lcovmerge.toml` from the current directory or a parent.
pub fn discover_config() -> Result<Option<(PathBuf, Config)>, ConfigError> {
    match std::env::current_dir() {
        Ok(cwd) => discover_config_from(&cwd),
        Err(_) => Ok(None),
    }
}

/// Search `start` and its ancestors for `lcovmerge.toml`.
///
/// The nearest file wins. A file that exists but fails to load is an error
/// rather than being skipped.
pub fn discover_config_from(start: &Path) -> Result<Option<(PathBuf, Config)>, ConfigError> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.is_file() {
            let config = load_config(&config_path)?;
            return Ok(Some((config_path, config)));
        }

        if !current.pop() {
            break;
        }
    }

    Ok(None)
}

// ============================================================================
// Precedence Resolution
// ============================================================================

/// CLI override options.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub discard_checksum: Option<bool>,
    pub generate_checksum: Option<bool>,
    pub source_root: Option<PathBuf>,
    pub log_level: Option<LogLevel>,
}

/// Resolve effective configuration from config file and CLI overrides.
///
/// Precedence: CLI > config file > defaults
pub fn resolve_config(config: Option<&Config>, cli: &CliOverrides) -> EffectiveConfig {
    let mut effective = EffectiveConfig::default();

    // Apply config file values
    if let Some(config) = config {
        if let Some(discard) = config.checksum.discard {
            effective.discard_checksum = discard;
        }
        if let Some(generate) = config.checksum.generate {
            effective.generate_checksum = generate;
        }
        if let Some(root) = &config.sources.root {
            effective.source_root = root.clone();
        }
        if let Some(level) = config.log.level {
            effective.log_level = level;
        }
    }

    // Apply CLI overrides
    if let Some(discard) = cli.discard_checksum {
        effective.discard_checksum = discard;
    }
    if let Some(generate) = cli.generate_checksum {
        effective.generate_checksum = generate;
    }
    if let Some(root) = &cli.source_root {
        effective.source_root = root.clone();
    }
    if let Some(level) = cli.log_level {
        effective.log_level = level;
    }

    effective
}

// ============================================================================
// Tests
// ============================================================================
