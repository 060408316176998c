//! Console configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via ALGOL_CONFIG)
//! 3. Environment variables

use algol_protocol::{DEFAULT_INTERFACE, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the YAML config file.
pub const CONFIG_ENV: &str = "ALGOL_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Admin console listener.
    pub console: ConsoleConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }

    /// Applies overrides from an environment-like lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(interface) = lookup("ALGOL_CONSOLE_INTERFACE") {
            self.console.set_option("interface", &interface)?;
        }

        if let Some(port) = lookup("ALGOL_CONSOLE_PORT") {
            self.console.set_option("port", &port)?;
        }

        if let Some(level) = lookup("ALGOL_LOG") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }

        Ok(())
    }
}

/// Admin console listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Interface (host name or address) to listen on.
    pub interface: String,
    /// TCP port to listen on.
    pub port: u16,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            interface: DEFAULT_INTERFACE.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ConsoleConfig {
    pub fn new(interface: impl Into<String>, port: u16) -> Self {
        Self {
            interface: interface.into(),
            port,
        }
    }

    /// Applies a single `key = value` option from a configuration context.
    ///
    /// Unknown keys are ignored.
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "interface" => {
                if value.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "console interface must not be empty".to_string(),
                    ));
                }
                self.interface = value.to_string();
            }
            "port" => {
                self.port = value.parse().map_err(|_| {
                    ConfigError::ValidationError(format!("invalid console port '{}'", value))
                })?;
            }
            _ => tracing::debug!("ignoring unknown console option '{}'", key),
        }
        Ok(())
    }

    /// Returns the `interface:port` pair used for resolution.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.interface, self.port)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.console.interface, "127.0.0.1");
        assert_eq!(config.console.port, 60400);
        assert_eq!(config.console.endpoint(), "127.0.0.1:60400");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_set_option() {
        let mut console = ConsoleConfig::default();
        console.set_option("interface", "0.0.0.0").unwrap();
        console.set_option("port", "60500").unwrap();
        console.set_option("colour", "blue").unwrap();

        assert_eq!(console, ConsoleConfig::new("0.0.0.0", 60500));

        assert!(matches!(
            console.set_option("port", "not-a-port"),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(console.set_option("interface", "").is_err());
        assert_eq!(console.port, 60500);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("ALGOL_CONSOLE_INTERFACE", "localhost"),
            ("ALGOL_CONSOLE_PORT", "6100"),
            ("ALGOL_LOG", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.console.interface, "localhost");
        assert_eq!(config.console.port, 6100);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("algol.yaml");

        let mut config = Config::default();
        config.console.port = 61000;
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.console, config.console);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("algol.yaml");
        std::fs::write(&path, "console:\n  port: 7000\n").unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.console.port, 7000);
        assert_eq!(loaded.console.interface, "127.0.0.1");
        assert_eq!(loaded.logging.level, "info");
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("/nonexistent/algol.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(_, _))));
    }
}
