//! HTTP request handlers.

pub mod health;
pub mod kv;
pub mod query;

pub use health::health_handler;
pub use kv::{execute_kv, scan_cancel, scan_start, scan_status};
pub use query::{active_executions, cancel_query, execute_query, query_status, validate_query};
