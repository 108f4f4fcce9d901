// Server configuration module
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    #[serde(default)]
    pub clouds: CloudsSettings,
    #[serde(default)]
    pub auth: AuthSettings,
}

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub file_path: String,
    #[serde(default = "default_true")]
    pub log_to_console: bool,
}

/// Cloud topology settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudsSettings {
    /// Path to the declarative JSON topology file.
    #[serde(default = "default_clouds_file")]
    pub file: String,
}

impl Default for CloudsSettings {
    fn default() -> Self {
        Self {
            file: default_clouds_file(),
        }
    }
}

/// Re-authentication settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSettings {
    /// JSON map of operator id to bcrypt hash, exported by the user
    /// subsystem for dangerous-verb re-authentication.
    #[serde(default)]
    pub operators_file: Option<String>,
}

// Default value functions
fn default_workers() -> usize {
    0
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_clouds_file() -> String {
    "clouds.json".to_string()
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let mut config: ServerConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - STRATUS_HOST: Override server.host
    /// - STRATUS_PORT: Override server.port
    /// - STRATUS_LOG_LEVEL: Override logging.level
    /// - STRATUS_CLOUDS_FILE: Override clouds.file
    /// - STRATUS_OPERATORS_FILE: Override auth.operators_file
    fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        use std::env;

        if let Ok(host) = env::var("STRATUS_HOST") {
            self.server.host = host;
        }
        if let Ok(port_str) = env::var("STRATUS_PORT") {
            self.server.port = port_str
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid STRATUS_PORT value: {}", port_str))?;
        }
        if let Ok(level) = env::var("STRATUS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(file) = env::var("STRATUS_CLOUDS_FILE") {
            self.clouds.file = file;
        }
        if let Ok(file) = env::var("STRATUS_OPERATORS_FILE") {
            self.auth.operators_file = Some(file);
        }

        Ok(())
    }

    /// Validate configuration settings
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }

        if self.clouds.file.trim().is_empty() {
            return Err(anyhow::anyhow!("clouds.file cannot be empty"));
        }

        Ok(())
    }

    /// Get default configuration (useful for testing)
    pub fn default() -> Self {
        ServerConfig {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                workers: 0,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                file_path: "./logs/stratus.log".to_string(),
                log_to_console: true,
            },
            clouds: CloudsSettings::default(),
            auth: AuthSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port() {
        let mut config = ServerConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = ServerConfig::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_clouds_file_rejected() {
        let mut config = ServerConfig::default();
        config.clouds.file = " ".to_string();
        assert!(config.validate().is_err());
    }
}
