use thiserror::Error;

/// Errors raised while setting up or driving an execution. Failures of
/// individual statements or targets are captured into the result payload,
/// not raised through this type.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error(transparent)]
    Pool(#[from] stratus_pools::PoolError),

    #[error(transparent)]
    Store(#[from] stratus_store::StoreError),

    #[error("SQL engine error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("KV engine error: {0}")]
    Kv(#[from] redis::RedisError),

    #[error("Invalid schema identifier: {0}")]
    InvalidSchema(String),

    #[error("Unknown cloud '{0}'")]
    UnknownCloud(String),
}

/// Result type for executor operations.
pub type Result<T> = std::result::Result<T, ExecError>;
