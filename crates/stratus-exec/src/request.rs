//! Validated executor inputs. The HTTP layer builds these after the
//! policy engine has admitted the submission.

use serde::{Deserialize, Serialize};

/// Target selection for an SQL submission: the primary cloud plus every
/// secondary, or a single named cloud.
pub const MODE_BOTH: &str = "both";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    pub database: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub pg_schema: Option<String>,
    /// Request-level statement timeout in milliseconds.
    #[serde(default, rename = "timeout")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub continue_on_error: bool,
}

fn default_mode() -> String {
    MODE_BOTH.to_string()
}

impl QueryRequest {
    pub fn targets_all_clouds(&self) -> bool {
        self.mode == MODE_BOTH
    }
}

/// What to do with the keys a scan finds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanAction {
    Preview,
    Delete,
}

/// Clamp bounds for the SCAN COUNT hint.
pub const SCAN_COUNT_MIN: u64 = 1;
pub const SCAN_COUNT_MAX: u64 = 200_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub pattern: String,
    /// A single KV cloud, or absent for every configured KV cloud.
    #[serde(default)]
    pub cloud: Option<String>,
    pub action: ScanAction,
    #[serde(default = "default_scan_count")]
    pub scan_count: u64,
}

fn default_scan_count() -> u64 {
    1000
}

impl ScanRequest {
    pub fn clamped_scan_count(&self) -> u64 {
        self.scan_count.clamp(SCAN_COUNT_MIN, SCAN_COUNT_MAX)
    }
}

/// One structured (or raw) cache command.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvCommandRequest {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// A single KV cloud, or absent for every configured KV cloud.
    #[serde(default)]
    pub cloud: Option<String>,
}
