//! # stratus-pools
//!
//! The pool registry: one lazy, reconnecting connection pool per
//! (cloud, database) for SQL, one cluster client per KV cloud, and the
//! topology lookup the scan executor fans out over. Handles are created on
//! first use and cached; a handle that keeps failing is evicted so the
//! next use rebuilds it cleanly.

pub mod backoff;
pub mod error;
pub mod registry;
pub mod topology;

pub use backoff::{Backoff, LogThrottle};
pub use error::{PoolError, Result};
pub use registry::{PoolRegistry, CLUSTER_EVICTION_THRESHOLD, SQL_EVICTION_THRESHOLD};
pub use topology::NodeInfo;
