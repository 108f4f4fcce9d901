use thiserror::Error;

/// Errors raised while loading or validating the cloud topology file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unresolved placeholder '{0}': variable not set")]
    UnresolvedVariable(String),

    #[error("Failed to read secret '{name}/{key}': {reason}")]
    Secret {
        name: String,
        key: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
