//! # stratus-exec
//!
//! The executors behind the asynchronous endpoints:
//!
//! - [`SqlFanoutExecutor`]: dispatches a validated SQL batch in parallel
//!   across target clouds, sequentially within each target on a dedicated
//!   client, with auto-rollback, per-statement timeouts, and engine-level
//!   cancellation.
//! - [`CacheScanExecutor`]: iterates every master node of the selected KV
//!   clouds, matching a pattern, previewing keys, and optionally
//!   batch-unlinking them.
//! - [`KvCommandExecutor`]: synchronous-appearing fan-out of one cache
//!   command to every KV cloud.
//!
//! Every awaited I/O inside the executors is a suspension point: the
//! cancellation flag is re-checked before further work is dispatched.

pub mod error;
pub mod kv_exec;
pub mod request;
pub mod response;
pub mod scan;
pub mod sql_fanout;

pub use error::{ExecError, Result};
pub use kv_exec::KvCommandExecutor;
pub use request::{KvCommandRequest, QueryRequest, ScanAction, ScanRequest};
pub use response::{FieldInfo, KvCloudResult, KvResponse, QueryResponse, StatementResult, TargetResult};
pub use scan::CacheScanExecutor;
pub use sql_fanout::SqlFanoutExecutor;
