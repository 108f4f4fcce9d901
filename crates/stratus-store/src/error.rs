use stratus_commons::ExecutionId;
use thiserror::Error;

/// Errors raised by the execution store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Execution '{0}' already exists")]
    AlreadyExists(ExecutionId),

    #[error("Store backend error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
