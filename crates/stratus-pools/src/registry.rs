//! The process-global pool registry.
//!
//! One `PgPool` per (cloud, database), one cluster client per KV cloud.
//! Handles are built lazily on first use; a handle that keeps failing is
//! evicted so the next request rebuilds it from configuration.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::{info, warn};
use parking_lot::Mutex;
use redis::cluster::ClusterClient;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use stratus_commons::{CloudConfig, DbConfig};

use crate::backoff::{Backoff, LogThrottle};
use crate::error::{PoolError, Result};
use crate::topology::{parse_cluster_nodes, NodeInfo};

/// Consecutive failures before an SQL pool handle is evicted.
pub const SQL_EVICTION_THRESHOLD: u32 = 5;

/// Consecutive failures before a cluster client handle is evicted.
pub const CLUSTER_EVICTION_THRESHOLD: u32 = 10;

const POOL_MIN_CONNECTIONS: u32 = 2;
const POOL_MAX_CONNECTIONS: u32 = 20;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

type SqlKey = (String, String);

pub struct PoolRegistry {
    config: Arc<CloudConfig>,
    sql_pools: DashMap<SqlKey, PgPool>,
    sql_failures: DashMap<SqlKey, u32>,
    kv_clients: DashMap<String, Arc<ClusterClient>>,
    kv_failures: DashMap<String, u32>,
    log_throttle: Mutex<LogThrottle>,
}

impl PoolRegistry {
    pub fn new(config: Arc<CloudConfig>) -> Self {
        Self {
            config,
            sql_pools: DashMap::new(),
            sql_failures: DashMap::new(),
            kv_clients: DashMap::new(),
            kv_failures: DashMap::new(),
            log_throttle: Mutex::new(LogThrottle::new(10)),
        }
    }

    /// Snapshot of the declared topology for downstream validation.
    pub fn config(&self) -> Arc<CloudConfig> {
        Arc::clone(&self.config)
    }

    /// Lazy pool for an SQL target. Unknown pairs are a configuration
    /// error at request time, not a fatal one.
    pub fn sql_pool(&self, cloud: &str, database: &str) -> Result<PgPool> {
        let key = (cloud.to_string(), database.to_string());
        if let Some(pool) = self.sql_pools.get(&key) {
            return Ok(pool.value().clone());
        }
        let db = self
            .config
            .sql_target(cloud, database)
            .ok_or_else(|| PoolError::UnknownTarget {
                cloud: cloud.to_string(),
                database: database.to_string(),
            })?;
        info!(
            "Building SQL pool for {}/{} ({}:{})",
            cloud, database, db.host, db.port
        );
        let pool = build_sql_pool(db);
        // entry() keeps concurrent first-use from installing two pools.
        let entry = self.sql_pools.entry(key).or_insert(pool);
        Ok(entry.value().clone())
    }

    /// Record an acquisition failure for an SQL target; past the threshold
    /// the pool handle is dropped so the next use rebuilds it.
    pub fn record_sql_failure(&self, cloud: &str, database: &str, error: &sqlx::Error) {
        let key = (cloud.to_string(), database.to_string());
        let mut failures = self.sql_failures.entry(key.clone()).or_insert(0);
        *failures += 1;
        let count = *failures;
        drop(failures);

        if self.log_throttle.lock().should_log() {
            warn!(
                "SQL pool {}/{} failure #{}: {}",
                cloud, database, count, error
            );
        }
        if count >= SQL_EVICTION_THRESHOLD {
            self.sql_pools.remove(&key);
            self.sql_failures.remove(&key);
            warn!(
                "Evicted SQL pool {}/{} after {} consecutive failures",
                cloud, database, count
            );
        }
    }

    pub fn record_sql_success(&self, cloud: &str, database: &str) {
        self.sql_failures
            .remove(&(cloud.to_string(), database.to_string()));
    }

    /// Lazy cluster client for a KV cloud.
    pub fn kv_client(&self, cloud: &str) -> Result<Arc<ClusterClient>> {
        if let Some(client) = self.kv_clients.get(cloud) {
            return Ok(Arc::clone(client.value()));
        }
        let kv = self
            .config
            .kv_cloud(cloud)
            .ok_or_else(|| PoolError::UnknownKvCloud(cloud.to_string()))?;
        info!(
            "Building cluster client for {} ({}:{})",
            cloud, kv.host, kv.port
        );
        let client =
            Arc::new(ClusterClient::new(vec![format!("redis://{}:{}/", kv.host, kv.port)])?);
        let entry = self.kv_clients.entry(cloud.to_string()).or_insert(client);
        Ok(Arc::clone(entry.value()))
    }

    /// Slot-routing async connection for a KV cloud. Reconnects are
    /// internal: failed attempts back off exponentially; once the handle
    /// has failed [`CLUSTER_EVICTION_THRESHOLD`] times it is evicted and
    /// the error surfaces, so the next request rebuilds it from scratch.
    pub async fn kv_connection(
        &self,
        cloud: &str,
    ) -> Result<redis::cluster_async::ClusterConnection> {
        let client = self.kv_client(cloud)?;
        let mut backoff = Backoff::new();
        loop {
            match client.get_async_connection().await {
                Ok(conn) => {
                    self.kv_failures.remove(cloud);
                    return Ok(conn);
                }
                Err(e) => {
                    let mut failures = self.kv_failures.entry(cloud.to_string()).or_insert(0);
                    *failures += 1;
                    let count = *failures;
                    drop(failures);

                    if self.log_throttle.lock().should_log() {
                        warn!("Cluster client {} failure #{}: {}", cloud, count, e);
                    }
                    if count >= CLUSTER_EVICTION_THRESHOLD {
                        self.kv_clients.remove(cloud);
                        self.kv_failures.remove(cloud);
                        warn!(
                            "Evicted cluster client {} after {} consecutive failures",
                            cloud, count
                        );
                        return Err(e.into());
                    }
                    tokio::time::sleep(backoff.next_delay()).await;
                }
            }
        }
    }

    /// Master-node topology of a KV cloud. Opens a short-lived seed
    /// connection; invoked at the start of each scan so the fan-out sees
    /// the current cluster shape.
    pub async fn kv_masters(&self, cloud: &str) -> Result<Vec<NodeInfo>> {
        let kv = self
            .config
            .kv_cloud(cloud)
            .ok_or_else(|| PoolError::UnknownKvCloud(cloud.to_string()))?;
        let client = redis::Client::open(format!("redis://{}:{}/", kv.host, kv.port))?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let raw: String = redis::cmd("CLUSTER")
            .arg("NODES")
            .query_async(&mut conn)
            .await?;
        let masters = parse_cluster_nodes(&raw);
        if masters.is_empty() {
            return Err(PoolError::Topology {
                cloud: cloud.to_string(),
                reason: "no healthy master nodes reported".to_string(),
            });
        }
        Ok(masters)
    }

    /// Ephemeral direct connection to a single cluster node (used by the
    /// per-node SCAN loop).
    pub async fn node_connection(
        &self,
        node: &NodeInfo,
    ) -> Result<redis::aio::MultiplexedConnection> {
        let client = redis::Client::open(node.url())?;
        Ok(client.get_multiplexed_async_connection().await?)
    }
}

fn build_sql_pool(db: &DbConfig) -> PgPool {
    let opts = PgConnectOptions::new()
        .host(&db.host)
        .port(db.port)
        .username(&db.user)
        .password(&db.password)
        .database(&db.database)
        .application_name("stratus");
    PgPoolOptions::new()
        .min_connections(POOL_MIN_CONNECTIONS)
        .max_connections(POOL_MAX_CONNECTIONS)
        .idle_timeout(POOL_IDLE_TIMEOUT)
        .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
        .connect_lazy_with(opts)
}
