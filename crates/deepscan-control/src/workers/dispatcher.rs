// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker that dispatches queued scans.
//!
//! Each tick lists queued scans and creates one workload per scan. A
//! scan whose presigned-URL fetch or workload creation fails is marked
//! failed with the error text; the loop moves on to the next scan.
//! Retries are deliberately not implemented here: the next tick
//! reconsiders queued scans, and failed ones are re-queued by operators.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::blobstore::BlobStore;
use crate::domain::{Scan, ScanStatus};
use crate::persistence::{ScanFilter, ScanStore};
use crate::workload::{WorkloadManager, WorkloadSpec, WorkloadSpecConfig};

/// Configuration for the dispatcher worker.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How often to look for queued scans.
    pub interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

impl DispatcherConfig {
    /// Load configuration from environment variables.
    ///
    /// - `DEEPSCAN_DISPATCH_INTERVAL_SECS`: seconds between ticks (default: 10)
    pub fn from_env() -> Self {
        let interval_secs = std::env::var("DEEPSCAN_DISPATCH_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        Self {
            interval: Duration::from_secs(interval_secs),
        }
    }
}

/// Background worker that moves scans from queued to running.
pub struct Dispatcher {
    store: Arc<dyn ScanStore>,
    workloads: Arc<dyn WorkloadManager>,
    blobs: Arc<dyn BlobStore>,
    spec_config: WorkloadSpecConfig,
    config: DispatcherConfig,
    shutdown: Arc<Notify>,
}

impl Dispatcher {
    /// Create a new dispatcher worker.
    pub fn new(
        store: Arc<dyn ScanStore>,
        workloads: Arc<dyn WorkloadManager>,
        blobs: Arc<dyn BlobStore>,
        spec_config: WorkloadSpecConfig,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            workloads,
            blobs,
            spec_config,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the dispatcher loop.
    ///
    /// Ticks are strictly serial: a tick finishes before the next sleep
    /// starts, even when it overruns the interval. The loop exits when
    /// the shutdown signal is received.
    pub async fn run(&self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Dispatcher worker started"
        );

        // First tick runs immediately so a restart picks up the backlog.
        self.dispatch_queued().await;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Dispatcher worker received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.interval) => {
                    self.dispatch_queued().await;
                }
            }
        }

        info!("Dispatcher worker stopped");
    }

    /// Run a single dispatch cycle.
    pub async fn dispatch_queued(&self) {
        debug!("Starting dispatch cycle");

        let mut queued = match self
            .store
            .list_scans(&ScanFilter::with_status(ScanStatus::Queued))
            .await
        {
            Ok(scans) => scans,
            Err(e) => {
                error!(error = %e, "Failed to list queued scans");
                return;
            }
        };

        if queued.is_empty() {
            debug!("No queued scans to dispatch");
            return;
        }

        // The list comes back newest first; dispatch oldest first.
        queued.reverse();

        info!(count = queued.len(), "Found queued scans to dispatch");

        for scan in &queued {
            self.dispatch_scan(scan).await;
        }

        debug!("Dispatch cycle completed");
    }

    /// Dispatch a single scan: obtain the source download URL when one
    /// is needed, create the workload, and record the result.
    async fn dispatch_scan(&self, scan: &Scan) {
        info!(scan_id = %scan.id, project_id = %scan.project_id, "Dispatching scan");

        let download_url = match self.fetch_download_url(scan).await {
            Ok(url) => url,
            Err(message) => {
                error!(scan_id = %scan.id, error = %message, "Failed to get artifact download URL");
                self.mark_failed(scan, message).await;
                return;
            }
        };

        let spec = WorkloadSpec::for_scan(scan, download_url.as_deref(), &self.spec_config);

        let workload = match self.workloads.create_workload(&spec).await {
            Ok(workload) => workload,
            Err(e) => {
                error!(scan_id = %scan.id, error = %e, "Failed to create workload");
                self.mark_failed(scan, format!("failed to create workload: {}", e))
                    .await;
                return;
            }
        };

        let mut updated = scan.clone();
        updated.workload_name = Some(workload.name.clone());
        updated.workload_namespace = Some(workload.namespace.clone());
        updated.status = ScanStatus::Running;
        updated.started_at = Some(Utc::now());

        if let Err(e) = self.store.update_scan(&updated).await {
            error!(scan_id = %scan.id, error = %e, "Failed to update scan with workload information");
            return;
        }

        info!(
            scan_id = %scan.id,
            workload_name = %workload.name,
            workload_namespace = %workload.namespace,
            "Successfully dispatched scan"
        );
    }

    /// Presigned download URL for the scan's source archive, if any.
    async fn fetch_download_url(&self, scan: &Scan) -> Result<Option<String>, String> {
        let Some(archive_id) = scan.source_archive_id.as_deref().filter(|id| !id.is_empty())
        else {
            return Ok(None);
        };

        info!(scan_id = %scan.id, artifact_id = archive_id, "Fetching artifact download URL");

        match self.blobs.get_artifact(archive_id).await {
            Ok(download) => {
                debug!(
                    scan_id = %scan.id,
                    expiration = %download.expiration,
                    "Retrieved artifact download URL"
                );
                Ok(Some(download.signed_url))
            }
            Err(e) => Err(format!("failed to get artifact download URL: {}", e)),
        }
    }

    async fn mark_failed(&self, scan: &Scan, message: String) {
        let mut failed = scan.clone();
        failed.status = ScanStatus::Failed;
        failed.error_message = Some(message);
        failed.completed_at = Some(Utc::now());

        if let Err(e) = self.store.update_scan(&failed).await {
            warn!(scan_id = %scan.id, error = %e, "Failed to update scan status to failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobstore::MockBlobStore;
    use crate::domain::ScanKind;
    use crate::persistence::MemoryStore;
    use crate::workload::{MockWorkloadManager, WorkloadResources};
    use uuid::Uuid;

    fn spec_config() -> WorkloadSpecConfig {
        WorkloadSpecConfig {
            namespace: "deepscan".to_string(),
            service_account: String::new(),
            runner_image: "deepscan/runner".to_string(),
            runner_version: "latest".to_string(),
            resources: WorkloadResources::default(),
            ttl_seconds_after_finished: None,
            backoff_limit: None,
            active_deadline_seconds: None,
            orchestrator_endpoint: "127.0.0.1:9440".to_string(),
            storage_service_endpoint: "127.0.0.1:9441".to_string(),
        }
    }

    fn queued_scan() -> Scan {
        let now = Utc::now();
        Scan {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            user_id: None,
            status: ScanStatus::Queued,
            scan_kinds: vec![ScanKind::Sast],
            repository_url: Some("https://x/y".to_string()),
            branch: None,
            commit_sha: None,
            source_archive_id: None,
            workload_name: None,
            workload_namespace: None,
            findings_count: 0,
            critical_count: 0,
            high_count: 0,
            medium_count: 0,
            low_count: 0,
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn harness() -> (
        Arc<MemoryStore>,
        Arc<MockWorkloadManager>,
        Arc<MockBlobStore>,
        Dispatcher,
    ) {
        let store = Arc::new(MemoryStore::new());
        let workloads = Arc::new(MockWorkloadManager::new());
        let blobs = Arc::new(MockBlobStore::new());
        let dispatcher = Dispatcher::new(
            store.clone(),
            workloads.clone(),
            blobs.clone(),
            spec_config(),
            DispatcherConfig::default(),
        );
        (store, workloads, blobs, dispatcher)
    }

    #[test]
    fn test_config_default() {
        let config = DispatcherConfig::default();
        assert_eq!(config.interval, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_dispatch_moves_scan_to_running() {
        let (store, workloads, _blobs, dispatcher) = harness();
        let scan = queued_scan();
        store.create_scan(&scan).await.unwrap();

        dispatcher.dispatch_queued().await;

        let dispatched = store.get_scan(scan.id).await.unwrap();
        assert_eq!(dispatched.status, ScanStatus::Running);
        assert!(dispatched.started_at.is_some());

        let name = dispatched.workload_name.unwrap();
        assert!(name.starts_with("scan-"));
        assert_eq!(name.len(), 13);
        assert_eq!(dispatched.workload_namespace.as_deref(), Some("deepscan"));

        assert_eq!(workloads.created_specs().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_skips_blob_service_without_artifact() {
        let (store, workloads, _blobs, dispatcher) = harness();
        let scan = queued_scan();
        store.create_scan(&scan).await.unwrap();

        dispatcher.dispatch_queued().await;

        // No artifact id, so no SOURCE_DOWNLOAD_URL in the spec.
        let specs = workloads.created_specs();
        assert_eq!(specs[0].env_var("SOURCE_DOWNLOAD_URL"), None);
    }

    #[tokio::test]
    async fn test_dispatch_artifact_scan_carries_download_url() {
        let (store, workloads, blobs, dispatcher) = harness();
        blobs.insert_artifact("art-123", "https://signed");

        let mut scan = queued_scan();
        scan.repository_url = None;
        scan.source_archive_id = Some("art-123".to_string());
        store.create_scan(&scan).await.unwrap();

        dispatcher.dispatch_queued().await;

        let specs = workloads.created_specs();
        assert_eq!(specs[0].env_var("SOURCE_DOWNLOAD_URL"), Some("https://signed"));
        assert_eq!(specs[0].env_var("SOURCE_ARTIFACT_ID"), Some("art-123"));
    }

    #[tokio::test]
    async fn test_blob_failure_marks_scan_failed() {
        let (store, workloads, blobs, dispatcher) = harness();
        blobs.fail_gets();

        let mut scan = queued_scan();
        scan.source_archive_id = Some("art-123".to_string());
        store.create_scan(&scan).await.unwrap();

        dispatcher.dispatch_queued().await;

        let failed = store.get_scan(scan.id).await.unwrap();
        assert_eq!(failed.status, ScanStatus::Failed);
        assert!(failed.error_message.unwrap().contains("download URL"));
        assert!(failed.completed_at.is_some());
        assert!(workloads.created_specs().is_empty());
    }

    #[tokio::test]
    async fn test_create_failure_marks_scan_failed_and_continues() {
        let (store, _workloads, _blobs, _dispatcher) = harness();

        let first = queued_scan();
        let second = queued_scan();
        store.create_scan(&first).await.unwrap();
        store.create_scan(&second).await.unwrap();

        let (_, workloads, _, failing_dispatcher) = {
            let workloads = Arc::new(MockWorkloadManager::new());
            workloads.fail_creates();
            let blobs = Arc::new(MockBlobStore::new());
            let d = Dispatcher::new(
                store.clone(),
                workloads.clone(),
                blobs.clone(),
                spec_config(),
                DispatcherConfig::default(),
            );
            (store.clone(), workloads, blobs, d)
        };

        failing_dispatcher.dispatch_queued().await;

        for id in [first.id, second.id] {
            let scan = store.get_scan(id).await.unwrap();
            assert_eq!(scan.status, ScanStatus::Failed);
            assert!(scan.error_message.unwrap().contains("failed to create workload"));
        }
        assert!(workloads.created_specs().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_ignores_non_queued_scans() {
        let (store, workloads, _blobs, dispatcher) = harness();

        let mut scan = queued_scan();
        scan.status = ScanStatus::Cancelled;
        store.create_scan(&scan).await.unwrap();

        dispatcher.dispatch_queued().await;

        assert!(workloads.created_specs().is_empty());
        let untouched = store.get_scan(scan.id).await.unwrap();
        assert_eq!(untouched.status, ScanStatus::Cancelled);
    }
}
