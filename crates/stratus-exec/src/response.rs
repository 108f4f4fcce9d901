//! Executor result shapes. The wire keeps the cloud-keyed object layout
//! the operator UI consumes; internally everything is a map from cloud
//! name to a typed per-cloud result.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Column metadata of a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldInfo {
    pub name: String,
    /// Engine type name (e.g. `INT8`, `TEXT`).
    pub data_type: String,
}

/// Outcome of one statement on one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl StatementResult {
    pub fn failure(statement: Option<String>, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            statement,
            success: false,
            command: None,
            row_count: None,
            rows: None,
            fields: None,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// Outcome of one target (cloud, database) of an SQL submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<StatementResult>,
}

impl TargetResult {
    pub fn failed(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            duration_ms,
            results: Vec::new(),
        }
    }
}

/// Aggregated SQL fan-out response. `success` is true iff every target
/// and every statement within each target succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    #[serde(flatten)]
    pub clouds: HashMap<String, TargetResult>,
}

impl QueryResponse {
    pub fn from_targets(clouds: HashMap<String, TargetResult>) -> Self {
        let success = !clouds.is_empty() && clouds.values().all(|t| t.success);
        Self { success, clouds }
    }
}

/// Per-cloud outcome of a KV command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvCloudResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Aggregated KV command response, cloud-keyed like the SQL shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvResponse {
    pub id: String,
    pub success: bool,
    pub command: String,
    #[serde(flatten)]
    pub clouds: HashMap<String, KvCloudResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloud_keyed_wire_shape() {
        let mut clouds = HashMap::new();
        clouds.insert(
            "alpha".to_string(),
            TargetResult {
                success: true,
                error: None,
                duration_ms: 12,
                results: vec![],
            },
        );
        let response = QueryResponse::from_targets(clouds);
        let json = serde_json::to_value(&response).unwrap();
        // Cloud names are top-level keys, not nested under a "clouds" field.
        assert_eq!(json["alpha"]["success"], true);
        assert!(json.get("clouds").is_none());
        assert_eq!(json["success"], true);
    }

    #[test]
    fn test_overall_success_requires_every_target() {
        let mut clouds = HashMap::new();
        clouds.insert(
            "alpha".to_string(),
            TargetResult {
                success: true,
                error: None,
                duration_ms: 1,
                results: vec![],
            },
        );
        clouds.insert("beta".to_string(), TargetResult::failed("connect refused", 3));
        let response = QueryResponse::from_targets(clouds);
        assert!(!response.success);
    }

    #[test]
    fn test_empty_target_set_is_not_success() {
        assert!(!QueryResponse::from_targets(HashMap::new()).success);
    }

    #[test]
    fn test_statement_result_failure_shape() {
        let result = StatementResult::failure(Some("INVALID_SQL".into()), "syntax error", 5);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "syntax error");
        assert_eq!(json["statement"], "INVALID_SQL");
        assert!(json.get("rows").is_none());
    }
}
