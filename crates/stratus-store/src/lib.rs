//! # stratus-store
//!
//! Execution state shared across control-plane replicas, plus the strictly
//! per-replica registry of live backend sessions used for cancellation.
//!
//! The execution store has two tiers: a shared Redis-backed tier (the
//! production path) and an in-memory tier permitted only against a local
//! Redis host for development. In production a failed write surfaces; it
//! is never silently masked by the memory tier.

pub mod active;
pub mod error;
pub mod execution_store;

pub use active::{ActiveClientRegistry, ActiveExecution, BackendSession};
pub use error::{Result, StoreError};
pub use execution_store::ExecutionStore;
