//! The SQL fan-out executor.
//!
//! Targets run concurrently; statements within a target run strictly
//! sequentially on one dedicated client so transaction semantics hold.
//! The executor owns its execution record: per-statement progress and
//! per-target partial results are flushed to the execution store, and the
//! record reaches a terminal state on every path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use futures::future::join_all;
use futures::StreamExt;
use log::{debug, error, warn};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Column, Either, Row, TypeInfo};
use stratus_commons::{EnvSettings, ExecutionId};
use stratus_commons::security::redact_sensitive_sql;
use stratus_commons::validation::validate_schema_identifier;
use stratus_policy::split_statements;
use stratus_pools::PoolRegistry;
use stratus_store::{ActiveClientRegistry, ExecutionStore};

use crate::request::QueryRequest;
use crate::response::{FieldInfo, QueryResponse, StatementResult, TargetResult};
use crate::Result;

/// Grace added on top of the server-side statement timeout before the
/// client-side race gives up on a statement.
const CLIENT_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// SQLSTATE for a statement aborted by `statement_timeout`.
const SQLSTATE_QUERY_CANCELED: &str = "57014";

/// Two-state transaction tracker, driven by leading-verb matches and read
/// at failure time to decide whether to synthesise a ROLLBACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxState {
    Outside,
    Inside,
}

impl TxState {
    fn observe(&mut self, statement: &str) {
        let verb = leading_verb(statement);
        match verb.as_str() {
            "BEGIN" | "START" => *self = TxState::Inside,
            "COMMIT" | "ROLLBACK" => *self = TxState::Outside,
            _ => {}
        }
    }

    fn is_inside(&self) -> bool {
        matches!(self, TxState::Inside)
    }
}

pub(crate) fn leading_verb(statement: &str) -> String {
    statement
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_uppercase()
}

pub(crate) fn is_transaction_control(statement: &str) -> bool {
    matches!(
        leading_verb(statement).as_str(),
        "BEGIN" | "START" | "COMMIT" | "ROLLBACK" | "SAVEPOINT"
    )
}

pub(crate) fn timeout_error_message(timeout_ms: u64) -> String {
    format!("Statement timeout after {}ms", timeout_ms)
}

pub struct SqlFanoutExecutor {
    pools: Arc<PoolRegistry>,
    store: Arc<ExecutionStore>,
    active: Arc<ActiveClientRegistry>,
    statement_timeout_ms: u64,
    max_query_timeout_ms: u64,
}

impl SqlFanoutExecutor {
    pub fn new(
        pools: Arc<PoolRegistry>,
        store: Arc<ExecutionStore>,
        active: Arc<ActiveClientRegistry>,
        env: &EnvSettings,
    ) -> Self {
        Self {
            pools,
            store,
            active,
            statement_timeout_ms: env.statement_timeout_ms,
            max_query_timeout_ms: env.max_query_timeout_ms,
        }
    }

    /// Per-statement wall-clock budget for one request.
    pub(crate) fn effective_timeout_ms(&self, request_timeout_ms: Option<u64>) -> u64 {
        self.statement_timeout_ms
            .max(request_timeout_ms.unwrap_or(0))
            .min(self.max_query_timeout_ms)
    }

    fn resolve_targets(&self, req: &QueryRequest) -> Vec<String> {
        if req.targets_all_clouds() {
            self.pools
                .config()
                .sql_clouds()
                .map(|c| c.cloud_name.clone())
                .collect()
        } else {
            vec![req.mode.clone()]
        }
    }

    /// Drive one submission to a terminal record. Spawned by the accept
    /// path; never returns an error to the caller — failures land in the
    /// execution record.
    pub async fn run(self: Arc<Self>, id: ExecutionId, req: QueryRequest) {
        let targets = self.resolve_targets(&req);
        let results: Arc<Mutex<HashMap<String, TargetResult>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let tasks = targets.into_iter().map(|cloud| {
            let this = Arc::clone(&self);
            let id = id.clone();
            let req = req.clone();
            let results = Arc::clone(&results);
            async move {
                let target_result = Box::pin(this.run_target(&id, &req, &cloud)).await;
                let snapshot = {
                    let mut map = results.lock();
                    map.insert(cloud.clone(), target_result);
                    map.clone()
                };
                // Flush what we have so far so pollers see per-cloud results
                // as they land, not only at the end.
                let partial = QueryResponse::from_targets(snapshot);
                if let Ok(value) = serde_json::to_value(&partial) {
                    if let Err(e) = Box::pin(this.store.save_partial(&id, value)).await {
                        warn!("Partial flush for {} failed: {}", id, e);
                    }
                }
            }
        });
        join_all(tasks).await;

        let clouds = results.lock().clone();
        let response = QueryResponse::from_targets(clouds);
        let success = response.success;
        match serde_json::to_value(&response) {
            Ok(value) => {
                if let Err(e) = Box::pin(self.store.complete(&id, value, success)).await {
                    error!("Failed to finalise execution {}: {}", id, e);
                }
            }
            Err(e) => {
                error!("Failed to serialise response for {}: {}", id, e);
                let _ = Box::pin(self.store.fail(&id, "Internal serialization error")).await;
            }
        }
        self.active.complete_active(&id);
        self.store.release_flag(&id);
    }

    async fn run_target<'a>(
        &'a self,
        id: &'a ExecutionId,
        req: &'a QueryRequest,
        cloud: &'a str,
    ) -> TargetResult {
        let start = Instant::now();
        let database = &req.database;
        let cloud_key = format!("{}/{}", cloud, database);
        let statements = split_statements(&req.query);

        let pool = match self.pools.sql_pool(cloud, database) {
            Ok(pool) => pool,
            Err(e) => return connect_failure(&statements, e.to_string(), start),
        };
        let mut conn = match Box::pin(pool.acquire()).await {
            Ok(conn) => conn,
            Err(e) => {
                self.pools.record_sql_failure(cloud, database, &e);
                return connect_failure(&statements, e.to_string(), start);
            }
        };
        self.pools.record_sql_success(cloud, database);

        let pid = match Box::pin(
            sqlx::query_scalar::<_, i32>("SELECT pg_backend_pid()").fetch_one(&mut *conn),
        )
        .await
        {
            Ok(pid) => pid,
            Err(e) => return connect_failure(&statements, e.to_string(), start),
        };
        self.active.register(id, &cloud_key, pid);

        let result = Box::pin(self.run_statements(&mut *conn, id, req, &statements, cloud, pid, start))
            .await;

        // Release on every exit path; a leaked client starves the pool.
        self.active.release(id, &cloud_key);
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_statements<'a>(
        &'a self,
        conn: &'a mut PgConnection,
        id: &'a ExecutionId,
        req: &'a QueryRequest,
        statements: &'a [String],
        cloud: &'a str,
        pid: i32,
        start: Instant,
    ) -> TargetResult {
        let timeout_ms = self.effective_timeout_ms(req.timeout_ms);

        // Server-side timeout keeps the session healthy when a statement
        // overruns; the client-side race below is only a safety net.
        let setup = format!("SET statement_timeout = {}", timeout_ms);
        if let Err(e) = Box::pin(sqlx::raw_sql(&setup).execute(&mut *conn)).await {
            return connect_failure(statements, e.to_string(), start);
        }

        if let Some(schema) = req.pg_schema.as_deref() {
            if let Err(e) = validate_schema_identifier(schema) {
                return TargetResult::failed(
                    format!("Invalid schema name '{}': {}", schema, e),
                    start.elapsed().as_millis() as u64,
                );
            }
            let set_path = format!("SET search_path TO \"{}\"", schema);
            if let Err(e) = Box::pin(sqlx::raw_sql(&set_path).execute(&mut *conn)).await {
                return TargetResult::failed(
                    format!("Failed to set search_path: {}", e),
                    start.elapsed().as_millis() as u64,
                );
            }
        }

        let total = statements.len();
        let multi = total > 1;
        let mut results: Vec<StatementResult> = Vec::with_capacity(total);
        let mut tx_state = TxState::Outside;
        let mut all_ok = true;

        for (idx, statement) in statements.iter().enumerate() {
            // Suspension-point check: no further statements after a cancel
            // is observed. In-flight statements are only interrupted by
            // engine-level session cancellation.
            if Box::pin(self.store.is_cancelled(id)).await {
                debug!("Execution {} cancelled before statement {}", id, idx + 1);
                all_ok = false;
                break;
            }

            if let Err(e) = Box::pin(self.store.update_progress(
                id,
                idx + 1,
                total,
                Some(truncate_statement(statement)),
            ))
            .await
            {
                warn!("Progress update for {} failed: {}", id, e);
            }

            tx_state.observe(statement);
            let mut result = Box::pin(self.execute_statement(conn, statement, cloud, req, pid, timeout_ms))
                .await;
            if multi {
                result.statement = Some(statement.clone());
            }
            let safe_sql = redact_sensitive_sql(statement);
            debug!(
                target: "sql::exec",
                "{} | sql='{}' | cloud={} | rows={:?} | took={}ms",
                if result.success { "ok" } else { "failed" },
                safe_sql,
                cloud,
                result.row_count,
                result.duration_ms
            );
            let failed = !result.success;
            results.push(result);

            if failed {
                all_ok = false;
                if tx_state.is_inside() && !is_transaction_control(statement) {
                    results.push(Box::pin(self.auto_rollback(conn)).await);
                    tx_state = TxState::Outside;
                }
                if !req.continue_on_error {
                    break;
                }
            }
        }

        TargetResult {
            success: all_ok,
            error: None,
            duration_ms: start.elapsed().as_millis() as u64,
            results,
        }
    }

    /// A failure inside an open transaction leaves the session aborted;
    /// roll it back and surface the synthetic entry so the operator sees
    /// what happened.
    async fn auto_rollback<'a>(&'a self, conn: &'a mut PgConnection) -> StatementResult {
        let start = Instant::now();
        match Box::pin(sqlx::raw_sql("ROLLBACK").execute(&mut *conn)).await {
            Ok(_) => StatementResult {
                statement: Some("ROLLBACK (auto)".to_string()),
                success: true,
                command: Some("ROLLBACK".to_string()),
                row_count: None,
                rows: None,
                fields: None,
                error: None,
                duration_ms: start.elapsed().as_millis() as u64,
            },
            Err(e) => StatementResult::failure(
                Some("ROLLBACK (auto)".to_string()),
                format!("Auto-rollback failed: {}", e),
                start.elapsed().as_millis() as u64,
            ),
        }
    }

    async fn execute_statement<'a>(
        &'a self,
        conn: &'a mut PgConnection,
        statement: &'a str,
        cloud: &'a str,
        req: &'a QueryRequest,
        pid: i32,
        timeout_ms: u64,
    ) -> StatementResult {
        let start = Instant::now();
        let client_budget = Duration::from_millis(timeout_ms) + CLIENT_TIMEOUT_GRACE;

        let collected =
            tokio::time::timeout(client_budget, Box::pin(collect_statement(conn, statement))).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        match collected {
            Ok(Ok((rows, fields, affected))) => {
                let row_count = if rows.is_empty() {
                    affected
                } else {
                    rows.len() as u64
                };
                StatementResult {
                    statement: None,
                    success: true,
                    command: Some(leading_verb(statement)),
                    row_count: Some(row_count),
                    rows: Some(rows),
                    fields,
                    error: None,
                    duration_ms,
                }
            }
            Ok(Err(e)) => {
                let message = if is_statement_timeout(&e) {
                    timeout_error_message(timeout_ms)
                } else {
                    e.to_string()
                };
                StatementResult::failure(None, message, duration_ms)
            }
            Err(_elapsed) => {
                // The server-side timeout should have fired already; if it
                // did not, cancel the backend so nothing keeps running.
                Box::pin(self.cancel_backend(cloud, &req.database, pid)).await;
                StatementResult::failure(None, timeout_error_message(timeout_ms), duration_ms)
            }
        }
    }

    /// Idempotent cancel: raise the flag (halting dispatch at the next
    /// suspension point on any replica) and, where this replica still holds
    /// the client, terminate the engine sessions themselves.
    pub async fn cancel(&self, id: &ExecutionId) -> Result<()> {
        self.store.mark_cancelled(id).await?;
        for session in self.active.backend_sessions(id) {
            let Some((cloud, database)) = session.cloud_key.split_once('/') else {
                continue;
            };
            self.cancel_backend(cloud, database, session.backend_pid).await;
        }
        Ok(())
    }

    /// Best-effort `pg_cancel_backend` on a separate administrative client.
    async fn cancel_backend<'a>(&'a self, cloud: &'a str, database: &'a str, pid: i32) {
        let pool = match self.pools.sql_pool(cloud, database) {
            Ok(pool) => pool,
            Err(e) => {
                warn!("No pool for cancel of {}/{}: {}", cloud, database, e);
                return;
            }
        };
        match sqlx::query_scalar::<_, bool>("SELECT pg_cancel_backend($1)")
            .bind(pid)
            .fetch_one(&pool)
            .await
        {
            Ok(true) => debug!("Cancelled backend {} on {}/{}", pid, cloud, database),
            Ok(false) => debug!("Backend {} on {}/{} was already gone", pid, cloud, database),
            Err(e) => warn!(
                "pg_cancel_backend({}) on {}/{} failed: {}",
                pid, cloud, database, e
            ),
        }
    }
}

/// Run one statement and collect rows, field metadata, and the affected
/// count from the command tail.
async fn collect_statement<'a>(
    conn: &'a mut PgConnection,
    statement: &'a str,
) -> sqlx::Result<(Vec<serde_json::Value>, Option<Vec<FieldInfo>>, u64)> {
    let mut rows = Vec::new();
    let mut fields: Option<Vec<FieldInfo>> = None;
    let mut affected = 0u64;

    let mut stream = Box::pin(sqlx::raw_sql(statement).fetch_many(&mut *conn));
    while let Some(item) = stream.next().await {
        match item? {
            Either::Left(done) => affected += done.rows_affected(),
            Either::Right(row) => {
                if fields.is_none() {
                    fields = Some(field_infos(&row));
                }
                rows.push(pg_row_to_json(&row));
            }
        }
    }
    Ok((rows, fields, affected))
}

fn field_infos(row: &PgRow) -> Vec<FieldInfo> {
    row.columns()
        .iter()
        .map(|col| FieldInfo {
            name: col.name().to_string(),
            data_type: col.type_info().name().to_string(),
        })
        .collect()
}

fn pg_row_to_json(row: &PgRow) -> serde_json::Value {
    let mut object = serde_json::Map::new();
    for (idx, col) in row.columns().iter().enumerate() {
        object.insert(col.name().to_string(), pg_value_to_json(row, idx));
    }
    serde_json::Value::Object(object)
}

/// Decode one column into JSON by engine type name. Types without a native
/// JSON shape fall back to their text form; undecodable values become null.
fn pg_value_to_json(row: &PgRow, idx: usize) -> serde_json::Value {
    use serde_json::{json, Value};

    let type_name = row.columns()[idx].type_info().name().to_string();
    match type_name.as_str() {
        "BOOL" => row
            .try_get::<Option<bool>, _>(idx)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
        "INT8" => row
            .try_get::<Option<i64>, _>(idx)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(idx)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(idx)
            .unwrap_or(None)
            .unwrap_or(Value::Null),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(idx)
            .map(|v| v.map(|u| json!(u.to_string())).unwrap_or(Value::Null))
            .unwrap_or(Value::Null),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
            .map(|v| v.map(|t| json!(t.to_rfc3339())).unwrap_or(Value::Null))
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
            .map(|v| v.map(|t| json!(t.to_string())).unwrap_or(Value::Null))
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(idx)
            .map(|v| v.map(|t| json!(t.to_string())).unwrap_or(Value::Null))
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<Option<String>, _>(idx)
            .map(|v| v.map(|s| json!(s)).unwrap_or(Value::Null))
            .unwrap_or(Value::Null),
    }
}

fn is_statement_timeout(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(SQLSTATE_QUERY_CANCELED),
        _ => false,
    }
}

/// Uniform failure shape for errors that precede statement execution: in
/// the multi-statement path every statement is reported with the same
/// error so the result keeps its shape.
fn connect_failure(statements: &[String], error: String, start: Instant) -> TargetResult {
    let duration_ms = start.elapsed().as_millis() as u64;
    let results = if statements.len() > 1 {
        statements
            .iter()
            .map(|stmt| StatementResult::failure(Some(stmt.clone()), error.clone(), 0))
            .collect()
    } else {
        Vec::new()
    };
    TargetResult {
        success: false,
        error: Some(error),
        duration_ms,
        results,
    }
}

fn truncate_statement(statement: &str) -> String {
    const MAX: usize = 200;
    if statement.chars().count() <= MAX {
        statement.to_string()
    } else {
        let head: String = statement.chars().take(MAX).collect();
        format!("{}…", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_state_machine() {
        let mut tx = TxState::Outside;
        tx.observe("BEGIN");
        assert!(tx.is_inside());
        tx.observe("UPDATE t SET x=1 WHERE id=1");
        assert!(tx.is_inside());
        tx.observe("COMMIT");
        assert!(!tx.is_inside());

        tx.observe("START TRANSACTION");
        assert!(tx.is_inside());
        tx.observe("ROLLBACK");
        assert!(!tx.is_inside());
    }

    #[test]
    fn test_savepoint_does_not_close_transaction() {
        let mut tx = TxState::Outside;
        tx.observe("BEGIN");
        tx.observe("SAVEPOINT s1");
        assert!(tx.is_inside());
    }

    #[test]
    fn test_transaction_control_detection() {
        assert!(is_transaction_control("BEGIN"));
        assert!(is_transaction_control("start transaction"));
        assert!(is_transaction_control("SAVEPOINT s"));
        assert!(!is_transaction_control("SELECT 1"));
        assert!(!is_transaction_control("INSERT INTO t VALUES (1)"));
    }

    #[test]
    fn test_timeout_message_shape() {
        assert_eq!(
            timeout_error_message(300_000),
            "Statement timeout after 300000ms"
        );
    }

    #[test]
    fn test_leading_verb() {
        assert_eq!(leading_verb("select * from t"), "SELECT");
        assert_eq!(leading_verb("  "), "");
    }

    #[test]
    fn test_connect_failure_uniform_shape() {
        let statements = vec!["SELECT 1".to_string(), "SELECT 2".to_string()];
        let result = connect_failure(&statements, "connect refused".into(), Instant::now());
        assert!(!result.success);
        assert_eq!(result.results.len(), 2);
        assert!(result
            .results
            .iter()
            .all(|r| r.error.as_deref() == Some("connect refused")));

        // Single-statement failures stay at target scope.
        let single = connect_failure(&statements[..1], "connect refused".into(), Instant::now());
        assert!(single.results.is_empty());
        assert_eq!(single.error.as_deref(), Some("connect refused"));
    }

    #[test]
    fn test_truncate_statement() {
        let short = "SELECT 1";
        assert_eq!(truncate_statement(short), short);
        let long = "x".repeat(500);
        let truncated = truncate_statement(&long);
        assert_eq!(truncated.chars().count(), 201);
    }

    fn executor_env(statement_ms: u64, max_ms: u64) -> EnvSettings {
        let mut env = EnvSettings::default();
        env.statement_timeout_ms = statement_ms;
        env.max_query_timeout_ms = max_ms;
        env
    }

    fn test_executor(env: &EnvSettings) -> SqlFanoutExecutor {
        let config: stratus_commons::CloudConfig = serde_json::from_value(serde_json::json!({
            "primary": {
                "cloudName": "alpha",
                "db_configs": [{
                    "name": "mydb", "host": "127.0.0.1", "port": 5432,
                    "user": "u", "password": "p", "database": "mydb",
                    "schemas": ["public"], "defaultSchema": "public"
                }]
            }
        }))
        .unwrap();
        SqlFanoutExecutor::new(
            Arc::new(PoolRegistry::new(Arc::new(config))),
            Arc::new(ExecutionStore::local_only(300)),
            Arc::new(ActiveClientRegistry::new()),
            env,
        )
    }

    #[test]
    fn test_effective_timeout_takes_larger_bounded_by_max() {
        let executor = test_executor(&executor_env(300_000, 300_000));
        assert_eq!(executor.effective_timeout_ms(None), 300_000);
        assert_eq!(executor.effective_timeout_ms(Some(5_000)), 300_000);
        assert_eq!(executor.effective_timeout_ms(Some(900_000)), 300_000);

        let executor = test_executor(&executor_env(10_000, 600_000));
        assert_eq!(executor.effective_timeout_ms(Some(60_000)), 60_000);
        assert_eq!(executor.effective_timeout_ms(None), 10_000);
    }

    #[test]
    fn test_resolve_targets_both_vs_single() {
        let executor = test_executor(&EnvSettings::default());
        let mut req: QueryRequest = serde_json::from_str(
            r#"{"query": "SELECT 1", "database": "mydb", "mode": "both"}"#,
        )
        .unwrap();
        assert_eq!(executor.resolve_targets(&req), vec!["alpha"]);
        req.mode = "beta".to_string();
        assert_eq!(executor.resolve_targets(&req), vec!["beta"]);
    }
}
