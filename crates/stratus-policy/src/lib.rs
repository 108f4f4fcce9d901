//! # stratus-policy
//!
//! The admission gate for every workload the control plane accepts:
//!
//! - SQL batch splitting and leading-verb classification
//! - the role → statement-category decision matrix
//! - KV command classes, the always-blocked command list, and input
//!   sanitisation (patterns, NUL bytes, length caps)
//!
//! Everything here is synchronous and side-effect-free; the same inputs
//! always produce the same decision.

pub mod error;
pub mod kv;
pub mod matrix;
pub mod sql;

pub use error::{PolicyError, Result};
pub use kv::{
    classify_kv_command, validate_kv_args, validate_raw_command, validate_scan_pattern,
    KvCommandClass,
};
pub use matrix::{authorize, authorize_kv, PolicyDecision};
pub use sql::{classify_sql, split_statements, StatementCategory};
