use thiserror::Error;

/// Errors raised by the pool registry.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Unknown SQL target: cloud '{cloud}' database '{database}' is not configured")]
    UnknownTarget { cloud: String, database: String },

    #[error("Unknown KV cloud '{0}'")]
    UnknownKvCloud(String),

    #[error("SQL engine error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("KV engine error: {0}")]
    Kv(#[from] redis::RedisError),

    #[error("Topology error for cloud '{cloud}': {reason}")]
    Topology { cloud: String, reason: String },
}

/// Result type for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
