//! # stratus-commons
//!
//! Shared building blocks for the Stratus control plane:
//! - user roles and ids
//! - execution records and progress models polled by the operator UI
//! - cloud topology configuration (JSON with secret substitution)
//! - identifier validation
//! - recognised environment settings

pub mod config;
pub mod env;
pub mod errors;
pub mod models;
pub mod security;
pub mod validation;

pub use config::{CloudConfig, DbConfig, KvCloud, SqlCloud};
pub use env::EnvSettings;
pub use errors::ConfigError;
pub use models::execution::{
    ExecutionProgress, ExecutionRecord, ExecutionStatus, QueryProgress, ScanProgress, ScanStatus,
};
pub use models::ids::{ExecutionId, UserId};
pub use models::role::Role;
