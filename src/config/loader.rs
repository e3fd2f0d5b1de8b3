// src/config/loader.rs
//! Layered configuration loader
//!
//! Sources are merged in order: built-in defaults, each existing TOML file in
//! the search path, then `ANALOG_IN__*` environment variables (`__` separates
//! nested keys, e.g. `ANALOG_IN__WAIT__TIMEOUT_MS=250`).

use crate::config::{constants::paths, SourceConfig};
use ::config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),
    #[error("configuration parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("configuration layering error: {0}")]
    Layering(#[from] ::config::ConfigError),
    #[error("configuration export error: {0}")]
    Export(#[from] toml::ser::Error),
    #[error("configuration validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Loads `SourceConfig` from defaults, files and the environment
pub struct ConfigLoader {
    config_paths: Vec<PathBuf>,
    use_environment: bool,
}

impl ConfigLoader {
    /// Create loader searching the working directory
    pub fn new() -> Self {
        Self {
            config_paths: vec![PathBuf::from(paths::CONFIG_FILE_NAME)],
            use_environment: true,
        }
    }

    /// Create loader with custom paths
    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            config_paths: paths,
            use_environment: true,
        }
    }

    /// Ignore `ANALOG_IN__*` environment overrides
    pub fn without_environment(mut self) -> Self {
        self.use_environment = false;
        self
    }

    /// Merge every layer and validate the result
    pub fn load(&self) -> Result<SourceConfig, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&SourceConfig::default())?);

        for path in &self.config_paths {
            if path.exists() {
                debug!(path = %path.display(), "merging configuration file");
                builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
            }
        }

        if self.use_environment {
            builder = builder.add_source(
                Environment::with_prefix(paths::ENV_PREFIX)
                    .separator(paths::ENV_SEPARATOR)
                    .try_parsing(true),
            );
        }

        let config: SourceConfig = builder.build()?.try_deserialize()?;
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    /// Load a single TOML file without layering
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<SourceConfig, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        let config: SourceConfig = toml::from_str(&content)?;
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    /// Export configuration to file
    pub fn export_config<P: AsRef<Path>>(config: &SourceConfig, path: P) -> Result<(), ConfigError> {
        let toml_content = toml::to_string_pretty(config)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    pub fn config_paths(&self) -> &[PathBuf] {
        &self.config_paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
