//! The two-tier execution store.
//!
//! Records are keyed `execution:<id>` and serialised as compact JSON with
//! a bounded TTL. The shared tier is authoritative in production; the
//! in-memory tier exists for local development only and is selected solely
//! by `REDIS_HOST` pointing at localhost.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use log::{debug, info, warn};
use redis::aio::MultiplexedConnection;
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use stratus_commons::{
    EnvSettings, ExecutionId, ExecutionProgress, ExecutionRecord, ExecutionStatus, QueryProgress,
    ScanProgress, UserId,
};

use crate::error::{Result, StoreError};

/// Sweep cadence for the in-memory tier.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// In-memory records are evicted this long after their `end_time`.
const SWEEP_RETENTION_MS: i64 = 25 * 60 * 1000;

enum SharedBackend {
    Single(redis::Client),
    Cluster(ClusterClient),
}

enum SharedConn {
    Single(MultiplexedConnection),
    Cluster(ClusterConnection),
}

impl SharedConn {
    async fn get(&mut self, key: &str) -> redis::RedisResult<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        match self {
            SharedConn::Single(c) => cmd.query_async(c).await,
            SharedConn::Cluster(c) => cmd.query_async(c).await,
        }
    }

    async fn set_ex(&mut self, key: &str, value: &str, ttl: u64) -> redis::RedisResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("EX").arg(ttl);
        match self {
            SharedConn::Single(c) => cmd.query_async(c).await,
            SharedConn::Cluster(c) => cmd.query_async(c).await,
        }
    }

    /// SET NX EX; false when the key already exists.
    async fn set_nx_ex(&mut self, key: &str, value: &str, ttl: u64) -> redis::RedisResult<bool> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX").arg("EX").arg(ttl);
        let reply: Option<String> = match self {
            SharedConn::Single(c) => cmd.query_async(c).await?,
            SharedConn::Cluster(c) => cmd.query_async(c).await?,
        };
        Ok(reply.is_some())
    }
}

pub struct ExecutionStore {
    shared: Option<SharedBackend>,
    local: DashMap<String, ExecutionRecord>,
    cancel_flags: DashMap<String, Arc<AtomicBool>>,
    ttl_seconds: u64,
}

impl ExecutionStore {
    /// Choose the tier from the environment: shared Redis everywhere,
    /// in-memory only when Redis is local.
    pub fn from_env(env: &EnvSettings) -> Result<Self> {
        if env.redis_is_local() {
            info!("Execution store: in-memory tier (local Redis host '{}')", env.redis_host);
            Ok(Self::local_only(env.execution_ttl_seconds))
        } else {
            info!(
                "Execution store: shared tier at {}:{} (cluster_mode={})",
                env.redis_host, env.redis_port, env.redis_cluster_mode
            );
            Self::shared(&env.redis_url(), env.redis_cluster_mode, env.execution_ttl_seconds)
        }
    }

    pub fn shared(url: &str, cluster_mode: bool, ttl_seconds: u64) -> Result<Self> {
        let backend = if cluster_mode {
            SharedBackend::Cluster(ClusterClient::new(vec![url.to_string()])?)
        } else {
            SharedBackend::Single(redis::Client::open(url)?)
        };
        Ok(Self {
            shared: Some(backend),
            local: DashMap::new(),
            cancel_flags: DashMap::new(),
            ttl_seconds,
        })
    }

    pub fn local_only(ttl_seconds: u64) -> Self {
        Self {
            shared: None,
            local: DashMap::new(),
            cancel_flags: DashMap::new(),
            ttl_seconds,
        }
    }

    pub fn is_shared(&self) -> bool {
        self.shared.is_some()
    }

    async fn conn(&self) -> Result<SharedConn> {
        match self.shared.as_ref() {
            Some(SharedBackend::Single(client)) => Ok(SharedConn::Single(
                client.get_multiplexed_async_connection().await?,
            )),
            Some(SharedBackend::Cluster(client)) => {
                Ok(SharedConn::Cluster(client.get_async_connection().await?))
            }
            None => unreachable!("conn() is only called on the shared tier"),
        }
    }

    /// Create the record with `status=running`. Fails if the id exists.
    pub async fn init(&self, id: &ExecutionId, user_id: Option<UserId>) -> Result<ExecutionRecord> {
        let record = ExecutionRecord::new(id.clone(), user_id);
        if self.is_shared() {
            let payload = serde_json::to_string(&record)?;
            let mut conn = self.conn().await?;
            if !conn.set_nx_ex(&id.store_key(), &payload, self.ttl_seconds).await? {
                return Err(StoreError::AlreadyExists(id.clone()));
            }
        } else {
            if self.local.contains_key(id.as_str()) {
                return Err(StoreError::AlreadyExists(id.clone()));
            }
            self.local.insert(id.as_str().to_string(), record.clone());
        }
        self.cancel_flags
            .insert(id.as_str().to_string(), Arc::new(AtomicBool::new(false)));
        Ok(record)
    }

    /// Read a snapshot. Absent when the record expired or never existed.
    pub async fn get(&self, id: &ExecutionId) -> Result<Option<ExecutionRecord>> {
        if self.is_shared() {
            let mut conn = self.conn().await?;
            match conn.get(&id.store_key()).await? {
                Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
                None => Ok(None),
            }
        } else {
            Ok(self.local.get(id.as_str()).map(|r| r.value().clone()))
        }
    }

    async fn write(&self, record: &ExecutionRecord) -> Result<()> {
        if self.is_shared() {
            let payload = serde_json::to_string(record)?;
            let mut conn = self.conn().await?;
            conn.set_ex(&record.id.store_key(), &payload, self.ttl_seconds)
                .await?;
        } else {
            self.local
                .insert(record.id.as_str().to_string(), record.clone());
        }
        Ok(())
    }

    /// Read-modify-write. Last-writer-wins is acceptable for progress
    /// fields; terminal stickiness is enforced by the mutators themselves.
    async fn modify<F>(&self, id: &ExecutionId, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut ExecutionRecord),
    {
        let Some(mut record) = self.get(id).await? else {
            debug!("Ignoring update for unknown execution {}", id);
            return Ok(());
        };
        mutate(&mut record);
        self.write(&record).await
    }

    /// Atomic progress update; no-op when absent or terminal.
    pub async fn update_progress(
        &self,
        id: &ExecutionId,
        current: usize,
        total: usize,
        text: Option<String>,
    ) -> Result<()> {
        self.modify(id, |record| {
            if record.is_terminal() {
                return;
            }
            record.progress = ExecutionProgress::Sql(QueryProgress {
                current_statement: current,
                total_statements: total,
                current_statement_text: text,
            });
        })
        .await
    }

    /// Replace the per-cloud scan progress map; no-op when terminal.
    pub async fn save_scan_progress(
        &self,
        id: &ExecutionId,
        progress: HashMap<String, ScanProgress>,
    ) -> Result<()> {
        self.modify(id, |record| {
            if record.is_terminal() {
                return;
            }
            record.progress = ExecutionProgress::Scan(progress);
        })
        .await
    }

    /// Write a partial result without touching the status. Used by the
    /// fan-out as each cloud finishes.
    pub async fn save_partial(&self, id: &ExecutionId, result: serde_json::Value) -> Result<()> {
        self.modify(id, |record| {
            record.result = Some(result);
        })
        .await
    }

    /// Terminal transition. Respects a prior `cancelled`; idempotent for
    /// the same terminal state.
    pub async fn complete(
        &self,
        id: &ExecutionId,
        result: serde_json::Value,
        success: bool,
    ) -> Result<()> {
        let status = if success {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        };
        self.modify(id, |record| {
            record.finish(status, Some(result));
        })
        .await
    }

    /// Terminal failure with an error message (unless already cancelled).
    pub async fn fail(&self, id: &ExecutionId, error: &str) -> Result<()> {
        let result = serde_json::json!({ "success": false, "error": error });
        self.modify(id, |record| {
            record.finish(ExecutionStatus::Failed, Some(result));
        })
        .await
    }

    /// Force `status=cancelled`, set `end_time`, and raise the local
    /// cancellation flag. Idempotent.
    pub async fn mark_cancelled(&self, id: &ExecutionId) -> Result<()> {
        self.cancel_flags
            .entry(id.as_str().to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .store(true, Ordering::SeqCst);
        self.modify(id, |record| {
            if !record.is_terminal() {
                record.finish(ExecutionStatus::Cancelled, None);
            }
        })
        .await
    }

    /// Cancellation check for executor suspension points. The local flag is
    /// the fast path; on the shared tier a cancel raised by another replica
    /// is observed through the record.
    pub async fn is_cancelled(&self, id: &ExecutionId) -> bool {
        if let Some(flag) = self.cancel_flags.get(id.as_str()) {
            if flag.load(Ordering::SeqCst) {
                return true;
            }
        }
        if self.is_shared() {
            match self.get(id).await {
                Ok(Some(record)) if record.status == ExecutionStatus::Cancelled => {
                    if let Some(flag) = self.cancel_flags.get(id.as_str()) {
                        flag.store(true, Ordering::SeqCst);
                    }
                    return true;
                }
                Ok(_) => {}
                Err(e) => {
                    // An unreachable store must not mask a cancel forever;
                    // the next check retries.
                    warn!("Cancellation check for {} failed: {}", id, e);
                }
            }
        } else if let Some(record) = self.local.get(id.as_str()) {
            return record.status == ExecutionStatus::Cancelled;
        }
        false
    }

    /// Drop the per-replica cancellation flag once an execution is done.
    pub fn release_flag(&self, id: &ExecutionId) {
        self.cancel_flags.remove(id.as_str());
    }

    /// Periodic eviction for the in-memory tier.
    pub fn start_sweeper(self: &Arc<Self>) {
        if self.is_shared() {
            return;
        }
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.sweep_local(Utc::now().timestamp_millis());
            }
        });
    }

    fn sweep_local(&self, now_ms: i64) {
        let before = self.local.len();
        self.local.retain(|_, record| match record.end_time {
            Some(end) => now_ms - end < SWEEP_RETENTION_MS,
            None => true,
        });
        let evicted = before - self.local.len();
        if evicted > 0 {
            debug!("Swept {} expired execution record(s)", evicted);
            self.cancel_flags
                .retain(|id, _| self.local.contains_key(id));
        }
    }
}
