//! Configuration module for the widget plugin host
//!
//! Configuration comes from environment variables (including a `.env` file
//! loaded by the binary at startup) and an optional YAML file.
//! Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//!
//! # Example
//! ```rust,no_run
//! use widget_plugin_host::config::HostConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = HostConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = HostConfig::from_file(Path::new("host.yaml"))?;
//!
//! println!("Plugin directory: {:?}", config.plugin_dir);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

mod env;
mod yaml;

pub use env::{LOAD_LOG_ENV, PLUGINS_DIR_ENV, verbose_load_from_env};
pub use yaml::{PluginsYaml, WorkersYaml, YamlConfig};

use crate::plugin::registry::default_library_suffixes;

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Configured plugin directory does not exist: {}", .0.display())]
    PluginDirNotFound(PathBuf),

    #[error("Configured plugin path is not a directory: {}", .0.display())]
    PluginDirNotADirectory(PathBuf),
}

/// Host configuration
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Directory scanned for plugin modules
    pub plugin_dir: Option<PathBuf>,
    /// Modules loaded in addition to the directory scan
    pub plugin_files: Vec<PathBuf>,
    /// Log the load sequence at `info` instead of `trace`
    pub verbose_load: bool,
    /// File name suffixes that mark a plugin candidate
    pub library_suffixes: Vec<String>,
    /// Device-API worker threads started with the host
    pub worker_domains: Vec<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            plugin_dir: None,
            plugin_files: Vec::new(),
            verbose_load: false,
            library_suffixes: default_library_suffixes(),
            worker_domains: Vec::new(),
        }
    }
}

impl HostConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a configured plugin directory does not exist.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::merge(env::EnvConfig::load(), None);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// # Errors
    /// Returns an error if the YAML file cannot be read or is malformed, or
    /// if the resulting plugin directory does not exist.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml_config = YamlConfig::from_file(path)?;
        let config = Self::merge(env::EnvConfig::load(), Some(yaml_config));
        config.validate()?;
        Ok(config)
    }

    fn merge(env: env::EnvConfig, yaml: Option<YamlConfig>) -> Self {
        let mut config = Self {
            plugin_dir: env.plugin_dir,
            verbose_load: env.verbose_load,
            ..Self::default()
        };

        let Some(yaml) = yaml else {
            return config;
        };

        if let Some(plugins) = yaml.plugins {
            if let Some(dir) = plugins.dir {
                config.plugin_dir = Some(dir);
            }
            if let Some(files) = plugins.files {
                config.plugin_files = files;
            }
            if let Some(verbose) = plugins.verbose_load {
                config.verbose_load = verbose;
            }
            if let Some(suffixes) = plugins.library_suffixes {
                config.library_suffixes = suffixes;
            }
        }

        if let Some(domains) = yaml.workers.and_then(|w| w.domains) {
            config.worker_domains = domains;
        }

        config
    }

    /// Check that an explicitly configured plugin directory is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(dir) = &self.plugin_dir {
            if !dir.exists() {
                return Err(ConfigError::PluginDirNotFound(dir.clone()));
            }
            if !dir.is_dir() {
                return Err(ConfigError::PluginDirNotADirectory(dir.clone()));
            }
        }
        Ok(())
    }
}
