//! Cluster-wide SCAN + UNLINK engine for the KV clouds.
//!
//! Phase 1 discovers the master topology of every target cloud. Phase 2
//! walks each master's keyspace with `SCAN cursor MATCH pattern COUNT n`,
//! accumulating keys up to the preview cap. Phase 3 (delete action only)
//! unlinks the collected keys in batches through the slot-routing cluster
//! client. Cancellation is checked at the top of every scan iteration,
//! between nodes, and between delete batches; a cancelled run keeps its
//! partial counts so the operator sees how far it got.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, warn};
use stratus_commons::{ExecutionId, ScanProgress, ScanStatus};
use stratus_pools::PoolRegistry;
use stratus_store::ExecutionStore;

use crate::request::{ScanAction, ScanRequest};
use crate::ExecError;

/// Keys materialised per cloud for preview; `keys_found` keeps counting
/// past this bound.
pub const PREVIEW_KEY_CAP: usize = 10_000;

/// UNLINK batch size during the delete phase.
pub const DELETE_BATCH_SIZE: usize = 1_000;

/// Pause between non-terminal scan iterations to yield scheduler time.
const SCAN_BATCH_PAUSE: Duration = Duration::from_millis(100);

type ProgressMap = Arc<tokio::sync::Mutex<HashMap<String, ScanProgress>>>;

pub struct CacheScanExecutor {
    pools: Arc<PoolRegistry>,
    store: Arc<ExecutionStore>,
}

impl CacheScanExecutor {
    pub fn new(pools: Arc<PoolRegistry>, store: Arc<ExecutionStore>) -> Self {
        Self { pools, store }
    }

    fn resolve_clouds(&self, req: &ScanRequest) -> Vec<String> {
        match req.cloud.as_deref() {
            Some(cloud) => vec![cloud.to_string()],
            None => self
                .pools
                .config()
                .kv
                .iter()
                .map(|c| c.cloud_name.clone())
                .collect(),
        }
    }

    /// Drive one scan run to a terminal record. Spawned by the accept path.
    pub async fn run(self: Arc<Self>, id: ExecutionId, req: ScanRequest) {
        let clouds = self.resolve_clouds(&req);
        let progress: ProgressMap = Arc::new(tokio::sync::Mutex::new(
            clouds
                .iter()
                .map(|c| (c.clone(), ScanProgress::new(c.clone())))
                .collect(),
        ));
        self.flush_progress(&id, &progress).await;

        let tasks = clouds.iter().map(|cloud| {
            let this = Arc::clone(&self);
            let id = id.clone();
            let req = req.clone();
            let cloud = cloud.clone();
            let progress = Arc::clone(&progress);
            async move {
                if let Err(e) = this.run_cloud(&id, &req, &cloud, &progress).await {
                    warn!("Scan of cloud {} for {} failed: {}", cloud, id, e);
                    this.set_cloud_status(&progress, &cloud, ScanStatus::Error, Some(e.to_string()))
                        .await;
                    this.flush_progress(&id, &progress).await;
                }
            }
        });
        join_all(tasks).await;

        let snapshot = progress.lock().await.clone();
        let run_status = resolve_run_status(snapshot.values());
        let success = run_status == ScanStatus::Completed;
        let result = serde_json::to_value(&snapshot).unwrap_or_default();

        if run_status == ScanStatus::Cancelled {
            // mark_cancelled already transitioned the record; persist the
            // partial counts alongside it.
            if let Err(e) = self.store.save_partial(&id, result).await {
                warn!("Failed to save cancelled scan result for {}: {}", id, e);
            }
        } else if let Err(e) = self.store.complete(&id, result, success).await {
            warn!("Failed to finalise scan {}: {}", id, e);
        }
        self.store.release_flag(&id);
    }

    async fn run_cloud(
        &self,
        id: &ExecutionId,
        req: &ScanRequest,
        cloud: &str,
        progress: &ProgressMap,
    ) -> Result<(), ExecError> {
        // Phase 1: topology.
        let masters = self.pools.kv_masters(cloud).await?;
        {
            let mut map = progress.lock().await;
            if let Some(p) = map.get_mut(cloud) {
                p.nodes_total = masters.len();
                p.status = ScanStatus::Scanning;
            }
        }
        self.flush_progress(id, progress).await;

        // Phase 2: per-node scan.
        let count = req.clamped_scan_count();
        for node in &masters {
            if self.check_cancelled(id, cloud, progress).await {
                return Ok(());
            }
            let mut conn = self.pools.node_connection(node).await?;
            let mut cursor: u64 = 0;
            loop {
                if self.check_cancelled(id, cloud, progress).await {
                    return Ok(());
                }
                let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&req.pattern)
                    .arg("COUNT")
                    .arg(count)
                    .query_async(&mut conn)
                    .await?;
                {
                    let mut map = progress.lock().await;
                    if let Some(p) = map.get_mut(cloud) {
                        p.keys_found += keys.len() as u64;
                        let room = PREVIEW_KEY_CAP.saturating_sub(p.keys.len());
                        p.keys.extend(keys.into_iter().take(room));
                    }
                }
                self.flush_progress(id, progress).await;
                if next == 0 {
                    break;
                }
                cursor = next;
                tokio::time::sleep(SCAN_BATCH_PAUSE).await;
            }
            {
                let mut map = progress.lock().await;
                if let Some(p) = map.get_mut(cloud) {
                    p.nodes_scanned += 1;
                }
            }
            self.flush_progress(id, progress).await;
        }

        // Phase 3: delete.
        if req.action == ScanAction::Delete {
            self.delete_collected(id, cloud, progress).await?;
        }

        self.set_cloud_status(progress, cloud, ScanStatus::Completed, None)
            .await;
        self.flush_progress(id, progress).await;
        Ok(())
    }

    async fn delete_collected(
        &self,
        id: &ExecutionId,
        cloud: &str,
        progress: &ProgressMap,
    ) -> Result<(), ExecError> {
        let keys = {
            let mut map = progress.lock().await;
            match map.get_mut(cloud) {
                Some(p) => {
                    p.status = ScanStatus::Deleting;
                    p.keys.clone()
                }
                None => return Ok(()),
            }
        };
        self.flush_progress(id, progress).await;

        let mut conn = self.pools.kv_connection(cloud).await?;
        for batch in keys.chunks(DELETE_BATCH_SIZE) {
            if self.check_cancelled(id, cloud, progress).await {
                return Ok(());
            }
            let mut deleted: u64 = 0;
            // The cluster client routes by slot, so keys are unlinked one
            // at a time; a multi-key UNLINK would fault across slots.
            for key in batch {
                let removed: u64 = redis::cmd("UNLINK")
                    .arg(key)
                    .query_async(&mut conn)
                    .await?;
                deleted += removed;
            }
            {
                let mut map = progress.lock().await;
                if let Some(p) = map.get_mut(cloud) {
                    p.keys_deleted += deleted;
                }
            }
            self.flush_progress(id, progress).await;
        }
        debug!("Delete phase for {} on {} finished", id, cloud);
        Ok(())
    }

    /// Cancellation probe for the scan loops; flips the cloud status so the
    /// partial counts stay visible.
    async fn check_cancelled(&self, id: &ExecutionId, cloud: &str, progress: &ProgressMap) -> bool {
        if !self.store.is_cancelled(id).await {
            return false;
        }
        self.set_cloud_status(progress, cloud, ScanStatus::Cancelled, None)
            .await;
        self.flush_progress(id, progress).await;
        true
    }

    async fn set_cloud_status(
        &self,
        progress: &ProgressMap,
        cloud: &str,
        status: ScanStatus,
        error: Option<String>,
    ) {
        let mut map = progress.lock().await;
        if let Some(p) = map.get_mut(cloud) {
            p.status = status;
            p.error = error;
        }
    }

    async fn flush_progress(&self, id: &ExecutionId, progress: &ProgressMap) {
        let snapshot = progress.lock().await.clone();
        if let Err(e) = self.store.save_scan_progress(id, snapshot).await {
            warn!("Scan progress flush for {} failed: {}", id, e);
        }
    }

    /// Idempotent cancel for scan runs.
    pub async fn cancel(&self, id: &ExecutionId) -> crate::Result<()> {
        self.store.mark_cancelled(id).await?;
        Ok(())
    }
}

/// Overall status: cancelled if any cloud was cancelled, else failed if
/// any errored, else completed.
pub(crate) fn resolve_run_status<'a>(
    clouds: impl Iterator<Item = &'a ScanProgress>,
) -> ScanStatus {
    let mut any_error = false;
    for progress in clouds {
        match progress.status {
            ScanStatus::Cancelled => return ScanStatus::Cancelled,
            ScanStatus::Error => any_error = true,
            _ => {}
        }
    }
    if any_error {
        ScanStatus::Error
    } else {
        ScanStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(status: ScanStatus) -> ScanProgress {
        let mut p = ScanProgress::new("c");
        p.status = status;
        p
    }

    #[test]
    fn test_run_status_all_completed() {
        let clouds = vec![progress(ScanStatus::Completed), progress(ScanStatus::Completed)];
        assert_eq!(resolve_run_status(clouds.iter()), ScanStatus::Completed);
    }

    #[test]
    fn test_run_status_error_beats_completed() {
        let clouds = vec![progress(ScanStatus::Completed), progress(ScanStatus::Error)];
        assert_eq!(resolve_run_status(clouds.iter()), ScanStatus::Error);
    }

    #[test]
    fn test_run_status_cancelled_beats_error() {
        let clouds = vec![
            progress(ScanStatus::Error),
            progress(ScanStatus::Cancelled),
            progress(ScanStatus::Completed),
        ];
        assert_eq!(resolve_run_status(clouds.iter()), ScanStatus::Cancelled);
    }

    #[test]
    fn test_preview_cap_arithmetic() {
        let mut p = ScanProgress::new("c");
        p.keys = vec!["k".to_string(); PREVIEW_KEY_CAP - 2];
        let incoming = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        p.keys_found += incoming.len() as u64;
        let room = PREVIEW_KEY_CAP.saturating_sub(p.keys.len());
        p.keys.extend(incoming.into_iter().take(room));
        assert_eq!(p.keys.len(), PREVIEW_KEY_CAP);
        assert_eq!(p.keys_found, 3);
    }
}
