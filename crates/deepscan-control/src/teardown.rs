// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-scan resource teardown.
//!
//! One component performs the full reclamation of a scan across the
//! three dependent systems. It is invoked by the cleaner for expired
//! scans and by the delete operations of the request API; both must
//! observe the same order:
//!
//! 1. workload (external, errors swallowed)
//! 2. artifacts (external, errors swallowed)
//! 3. findings (store, error aborts)
//! 4. scan row (store, error aborts)
//!
//! External resources go first because they outlive the row otherwise;
//! the row goes last so a partial teardown stays observable and is
//! re-attempted on the next cycle.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::blobstore::BlobStore;
use crate::domain::Scan;
use crate::error::Result;
use crate::persistence::Store;
use crate::workload::WorkloadManager;

/// Tears down all resources of a single scan.
pub struct ScanTeardown {
    store: Arc<dyn Store>,
    workloads: Arc<dyn WorkloadManager>,
    blobs: Arc<dyn BlobStore>,
    /// Namespace used when a dispatched scan predates namespace tracking.
    default_namespace: String,
}

impl ScanTeardown {
    /// Create a new teardown component.
    pub fn new(
        store: Arc<dyn Store>,
        workloads: Arc<dyn WorkloadManager>,
        blobs: Arc<dyn BlobStore>,
        default_namespace: String,
    ) -> Self {
        Self {
            store,
            workloads,
            blobs,
            default_namespace,
        }
    }

    /// Remove the scan's workload, artifacts, findings, and row.
    ///
    /// Steps 1 and 2 are best effort: the external resources may already
    /// be gone or their service unavailable, and a later cycle retries.
    /// Steps 3 and 4 abort on error so consistency is preserved.
    pub async fn teardown_scan(&self, scan: &Scan) -> Result<()> {
        debug!(scan_id = %scan.id, "Tearing down scan");

        // 1. Workload
        if let Some(name) = scan.workload_name.as_deref()
            && !name.is_empty()
        {
            let namespace = scan
                .workload_namespace
                .as_deref()
                .filter(|ns| !ns.is_empty())
                .unwrap_or(&self.default_namespace);

            if let Err(e) = self.workloads.delete_workload(namespace, name).await {
                warn!(scan_id = %scan.id, workload = name, error = %e, "Failed to delete workload");
            } else {
                debug!(scan_id = %scan.id, workload = name, "Deleted workload");
            }
        }

        // 2. Artifacts, batched in a single call
        let artifact_ids = self.collect_artifact_ids(scan);
        if !artifact_ids.is_empty() {
            match self.blobs.delete_artifacts(&artifact_ids).await {
                Ok(deleted) => {
                    debug!(scan_id = %scan.id, requested = artifact_ids.len(), deleted = deleted, "Deleted artifacts");
                }
                Err(e) => {
                    warn!(scan_id = %scan.id, error = %e, "Failed to delete artifacts");
                }
            }
        }

        // 3. Findings
        let deleted = self.store.delete_findings_by_scan(scan.id).await?;
        debug!(scan_id = %scan.id, deleted = deleted, "Deleted findings");

        // 4. Scan row
        self.store.delete_scan(scan.id).await?;
        info!(scan_id = %scan.id, "Scan torn down");

        Ok(())
    }

    /// Artifact ids owned by a scan. Currently the source archive;
    /// results and log artifacts join here once the runner registers them.
    fn collect_artifact_ids(&self, scan: &Scan) -> Vec<String> {
        let mut ids = Vec::new();
        if let Some(archive_id) = scan.source_archive_id.as_deref()
            && !archive_id.is_empty()
        {
            ids.push(archive_id.to_string());
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobstore::MockBlobStore;
    use crate::domain::{ScanKind, ScanStatus};
    use crate::persistence::{MemoryStore, ScanStore};
    use crate::workload::MockWorkloadManager;
    use chrono::Utc;
    use uuid::Uuid;

    fn scan_with_resources() -> Scan {
        let now = Utc::now();
        Scan {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            user_id: None,
            status: ScanStatus::Completed,
            scan_kinds: vec![ScanKind::Sca],
            repository_url: None,
            branch: None,
            commit_sha: None,
            source_archive_id: Some("art-1".to_string()),
            workload_name: Some("scan-aaaaaaaa".to_string()),
            workload_namespace: Some("deepscan".to_string()),
            findings_count: 0,
            critical_count: 0,
            high_count: 0,
            medium_count: 0,
            low_count: 0,
            error_message: None,
            started_at: Some(now),
            completed_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    fn harness() -> (
        Arc<MemoryStore>,
        Arc<MockWorkloadManager>,
        Arc<MockBlobStore>,
        ScanTeardown,
    ) {
        let store = Arc::new(MemoryStore::new());
        let workloads = Arc::new(MockWorkloadManager::new());
        let blobs = Arc::new(MockBlobStore::new());
        let teardown = ScanTeardown::new(
            store.clone(),
            workloads.clone(),
            blobs.clone(),
            "deepscan".to_string(),
        );
        (store, workloads, blobs, teardown)
    }

    #[tokio::test]
    async fn test_teardown_order() {
        let (store, workloads, blobs, teardown) = harness();
        let journal: crate::persistence::memory::CallJournal = Default::default();
        store.set_journal(journal.clone());
        workloads.set_journal(journal.clone());
        blobs.set_journal(journal.clone());

        let scan = scan_with_resources();
        store.create_scan(&scan).await.unwrap();
        blobs.insert_artifact("art-1", "https://signed");

        teardown.teardown_scan(&scan).await.unwrap();

        let calls = journal.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "workload.delete scan-aaaaaaaa".to_string(),
                "storage.delete_artifacts art-1".to_string(),
                format!("store.delete_findings {}", scan.id),
                format!("store.delete_scan {}", scan.id),
            ]
        );
    }

    #[tokio::test]
    async fn test_teardown_survives_external_failures() {
        let (store, _workloads, blobs, teardown) = harness();
        blobs.fail_deletes();

        let scan = scan_with_resources();
        store.create_scan(&scan).await.unwrap();

        // Artifact deletion fails, but the row still goes away.
        teardown.teardown_scan(&scan).await.unwrap();
        assert_eq!(store.scan_count(), 0);
    }

    #[tokio::test]
    async fn test_teardown_without_workload_or_artifacts() {
        let (store, workloads, blobs, teardown) = harness();

        let mut scan = scan_with_resources();
        scan.workload_name = None;
        scan.source_archive_id = None;
        store.create_scan(&scan).await.unwrap();

        teardown.teardown_scan(&scan).await.unwrap();

        assert!(workloads.deleted_names().is_empty());
        assert!(blobs.deleted_batches().is_empty());
        assert_eq!(store.scan_count(), 0);
    }

    #[tokio::test]
    async fn test_teardown_missing_scan_row_fails() {
        let (_store, _workloads, _blobs, teardown) = harness();
        let scan = scan_with_resources();

        // Row was never created; step 4 reports NotFound.
        let result = teardown.teardown_scan(&scan).await;
        assert!(result.is_err());
    }
}
