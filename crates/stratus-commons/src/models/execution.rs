//! Execution records: the durable snapshot of an async submission.
//!
//! Records are created by the admission path, mutated only by the executor
//! owning them, and expire from the store via TTL. Status transitions are
//! monotone; `Cancelled` sticks.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::ids::{ExecutionId, UserId};

/// Lifecycle of an execution.
///
/// ```text
/// Running → Completed
///        → Failed
///        → Cancelled   (may happen at any time; never overwritten)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

/// SQL batch progress, updated after every statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryProgress {
    pub current_statement: usize,
    pub total_statements: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_statement_text: Option<String>,
}

/// Per-cloud status of a cache scan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Scanning,
    Deleting,
    Completed,
    Error,
    Cancelled,
}

/// Per-cloud progress of a cache SCAN (+ optional UNLINK) run.
///
/// Invariants: `nodes_scanned <= nodes_total`, `keys_deleted <= keys_found`.
/// `keys` is bounded by the preview cap; `keys_found` keeps counting past it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    pub cloud_name: String,
    pub nodes_total: usize,
    pub nodes_scanned: usize,
    pub keys_found: u64,
    pub keys_deleted: u64,
    pub keys: Vec<String>,
    pub status: ScanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanProgress {
    pub fn new(cloud_name: impl Into<String>) -> Self {
        Self {
            cloud_name: cloud_name.into(),
            nodes_total: 0,
            nodes_scanned: 0,
            keys_found: 0,
            keys_deleted: 0,
            keys: Vec::new(),
            status: ScanStatus::Pending,
            error: None,
        }
    }
}

/// Progress payload: statement counters for SQL runs, a cloud-keyed map for
/// cache runs. Untagged so the wire shape stays what the UI expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecutionProgress {
    Sql(QueryProgress),
    Scan(HashMap<String, ScanProgress>),
}

impl Default for ExecutionProgress {
    fn default() -> Self {
        ExecutionProgress::Sql(QueryProgress::default())
    }
}

/// The pollable snapshot of one submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: ExecutionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub status: ExecutionStatus,
    pub progress: ExecutionProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Epoch millis.
    pub start_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
}

impl ExecutionRecord {
    pub fn new(id: ExecutionId, user_id: Option<UserId>) -> Self {
        Self {
            id,
            user_id,
            status: ExecutionStatus::Running,
            progress: ExecutionProgress::default(),
            result: None,
            start_time: Utc::now().timestamp_millis(),
            end_time: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a terminal transition, honouring sticky `Cancelled`: once an
    /// execution is cancelled, a late complete/fail keeps the cancelled
    /// status (the result payload is still recorded for the operator).
    pub fn finish(&mut self, status: ExecutionStatus, result: Option<serde_json::Value>) {
        debug_assert!(status.is_terminal());
        if self.status != ExecutionStatus::Cancelled {
            self.status = status;
        }
        if self.end_time.is_none() {
            self.end_time = Some(Utc::now().timestamp_millis());
        }
        if result.is_some() {
            self.result = result;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_running() {
        let rec = ExecutionRecord::new(ExecutionId::new(), Some(UserId::from("u1")));
        assert_eq!(rec.status, ExecutionStatus::Running);
        assert!(rec.end_time.is_none());
        assert!(!rec.is_terminal());
    }

    #[test]
    fn test_cancelled_sticks_through_finish() {
        let mut rec = ExecutionRecord::new(ExecutionId::new(), None);
        rec.finish(ExecutionStatus::Cancelled, None);
        let first_end = rec.end_time;
        rec.finish(ExecutionStatus::Completed, Some(serde_json::json!({"ok": true})));
        assert_eq!(rec.status, ExecutionStatus::Cancelled);
        assert_eq!(rec.end_time, first_end);
        assert!(rec.result.is_some());
    }

    #[test]
    fn test_finish_sets_end_time_once() {
        let mut rec = ExecutionRecord::new(ExecutionId::new(), None);
        rec.finish(ExecutionStatus::Failed, None);
        let end = rec.end_time.unwrap();
        rec.finish(ExecutionStatus::Failed, None);
        assert_eq!(rec.end_time, Some(end));
    }

    #[test]
    fn test_record_wire_shape() {
        let mut rec = ExecutionRecord::new(ExecutionId::from("e1"), Some(UserId::from("u1")));
        rec.progress = ExecutionProgress::Sql(QueryProgress {
            current_statement: 2,
            total_statements: 5,
            current_statement_text: Some("SELECT 1".to_string()),
        });
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["progress"]["currentStatement"], 2);
        assert_eq!(json["progress"]["totalStatements"], 5);
    }

    #[test]
    fn test_scan_progress_round_trip() {
        let mut map = HashMap::new();
        map.insert("cache-east".to_string(), ScanProgress::new("cache-east"));
        let progress = ExecutionProgress::Scan(map);
        let json = serde_json::to_string(&progress).unwrap();
        let back: ExecutionProgress = serde_json::from_str(&json).unwrap();
        match back {
            ExecutionProgress::Scan(m) => {
                assert!(matches!(m["cache-east"].status, ScanStatus::Pending))
            }
            _ => panic!("expected scan progress"),
        }
    }
}
