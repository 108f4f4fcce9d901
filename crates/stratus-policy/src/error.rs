use thiserror::Error;

/// Errors raised by the policy layer. All of these map to a 4xx at the
/// admission path, before any execution record exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Permission denied: {0}")]
    Denied(String),

    #[error("Command '{0}' is blocked on this control plane")]
    BlockedCommand(String),

    #[error("Unsupported command '{0}'")]
    UnsupportedCommand(String),

    #[error("Pattern matches every key; refusing wildcard-only pattern '{0}'")]
    WildcardPattern(String),

    #[error("Input contains a NUL byte")]
    NulByte,

    #[error("{kind} exceeds maximum length ({len} > {max})")]
    TooLong {
        kind: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("{0}")]
    InvalidInput(String),
}

/// Result type for policy checks.
pub type Result<T> = std::result::Result<T, PolicyError>;
