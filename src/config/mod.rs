//! Configuration for the monitor.
//!
//! Loaded from a TOML file discovered in standard locations, with environment
//! variable overrides for deployments configured purely by env.

use std::path::PathBuf;

use serde::Deserialize;

/// Environment variable overrides.
const ENV_HOST: &str = "CRAFTMON_RCON_HOST";
const ENV_PORT: &str = "CRAFTMON_RCON_PORT";
const ENV_PASSWORD: &str = "CRAFTMON_RCON_PASSWORD";
const ENV_LOG_FILE: &str = "CRAFTMON_LOG_FILE";

/// Monitor configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// RCON host of the observed server.
    pub host: String,
    /// RCON port.
    pub port: u16,
    /// RCON password.
    pub password: String,
    /// Path of the server log to tail.
    pub log_file: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25575,
            password: String::new(),
            log_file: PathBuf::new(),
        }
    }
}

impl MonitorConfig {
    /// Apply environment variable overrides on top of the loaded values.
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var(ENV_HOST) {
            self.host = host;
        }
        if let Ok(port) = std::env::var(ENV_PORT) {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(_) => {
                    tracing::warn!(value = %port, env = ENV_PORT, "Ignoring unparseable port override");
                }
            }
        }
        if let Ok(password) = std::env::var(ENV_PASSWORD) {
            self.password = password;
        }
        if let Ok(log_file) = std::env::var(ENV_LOG_FILE) {
            self.log_file = PathBuf::from(log_file);
        }
    }

    /// Check that the required values are present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingValue` if the password or log file path
    /// is unset; both are required and have no sensible default.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.password.is_empty() {
            return Err(ConfigError::MissingValue("password"));
        }
        if self.log_file.as_os_str().is_empty() {
            return Err(ConfigError::MissingValue("log_file"));
        }
        Ok(())
    }
}

/// Configuration loader that searches multiple locations.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        // 1. Current directory: .craftmon.toml
        search_paths.push(PathBuf::from(".craftmon.toml"));

        // 2. User config directory: ~/.config/craftmon/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("craftmon").join("config.toml"));
        }

        Self { search_paths }
    }

    /// Create a config loader with a specific config file path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
        }
    }

    /// Load configuration from the first available file, or return defaults.
    ///
    /// Environment overrides are applied after file loading either way.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load(&self) -> Result<MonitorConfig, ConfigError> {
        let mut config = match self.find_config_file() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading config file");
                Self::load_from_path(&path)?
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                MonitorConfig::default()
            }
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific path.
    fn load_from_path(path: &PathBuf) -> Result<MonitorConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.clone(),
            source: e,
        })
    }

    /// Find the first config file that exists.
    #[must_use]
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths.iter().find(|p| p.exists()).cloned()
    }

    /// Get the search paths for debugging.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file could not be parsed.
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A required value is missing.
    #[error("Missing required config value: {0}")]
    MissingValue(&'static str),
}
