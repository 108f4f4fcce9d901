//! Per-replica registry of live backend sessions.
//!
//! Strictly off the shared store: entries only make sense on the replica
//! that holds the client, and they exist solely to route engine-level
//! session cancellation. Eviction is mandatory on every exit path.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use stratus_commons::ExecutionId;

/// One live engine session held by this replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSession {
    pub cloud_key: String,
    /// Engine backend id (`pg_backend_pid()` for PostgreSQL).
    pub backend_pid: i32,
}

/// Summary of one in-flight execution on this replica.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveExecution {
    pub execution_id: ExecutionId,
    pub cloud_keys: Vec<String>,
}

#[derive(Default)]
pub struct ActiveClientRegistry {
    entries: DashMap<String, HashMap<String, BackendSession>>,
}

impl ActiveClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: &ExecutionId, cloud_key: &str, backend_pid: i32) {
        self.entries
            .entry(id.as_str().to_string())
            .or_default()
            .insert(
                cloud_key.to_string(),
                BackendSession {
                    cloud_key: cloud_key.to_string(),
                    backend_pid,
                },
            );
    }

    /// Remove one target's entry; the execution id itself stays until
    /// [`complete_active`](Self::complete_active).
    pub fn release(&self, id: &ExecutionId, cloud_key: &str) {
        if let Some(mut sessions) = self.entries.get_mut(id.as_str()) {
            sessions.remove(cloud_key);
        }
    }

    /// Remove the whole execution entry.
    pub fn complete_active(&self, id: &ExecutionId) {
        self.entries.remove(id.as_str());
    }

    /// Backend sessions to terminate on cancel.
    pub fn backend_sessions(&self, id: &ExecutionId) -> Vec<BackendSession> {
        self.entries
            .get(id.as_str())
            .map(|sessions| sessions.values().cloned().collect())
            .unwrap_or_default()
    }

    /// In-flight executions on this replica.
    pub fn list_active(&self) -> Vec<ActiveExecution> {
        self.entries
            .iter()
            .map(|entry| ActiveExecution {
                execution_id: ExecutionId::from(entry.key().as_str()),
                cloud_keys: entry.value().keys().cloned().collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = ActiveClientRegistry::new();
        let id = ExecutionId::new();
        registry.register(&id, "alpha/mydb", 4211);
        registry.register(&id, "beta/mydb", 4212);

        let mut sessions = registry.backend_sessions(&id);
        sessions.sort_by(|a, b| a.cloud_key.cmp(&b.cloud_key));
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].backend_pid, 4211);
    }

    #[test]
    fn test_release_single_target() {
        let registry = ActiveClientRegistry::new();
        let id = ExecutionId::new();
        registry.register(&id, "alpha/mydb", 1);
        registry.register(&id, "beta/mydb", 2);
        registry.release(&id, "alpha/mydb");

        let sessions = registry.backend_sessions(&id);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].cloud_key, "beta/mydb");
        assert_eq!(registry.list_active().len(), 1);
    }

    #[test]
    fn test_complete_removes_entry() {
        let registry = ActiveClientRegistry::new();
        let id = ExecutionId::new();
        registry.register(&id, "alpha/mydb", 1);
        registry.complete_active(&id);
        assert!(registry.backend_sessions(&id).is_empty());
        assert!(registry.list_active().is_empty());
    }

    #[test]
    fn test_reregister_overwrites_pid() {
        let registry = ActiveClientRegistry::new();
        let id = ExecutionId::new();
        registry.register(&id, "alpha/mydb", 1);
        registry.register(&id, "alpha/mydb", 9);
        assert_eq!(registry.backend_sessions(&id)[0].backend_pid, 9);
    }
}
