// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared test harness: in-memory store plus mock external clients.

#![allow(dead_code)]

use std::sync::Arc;

use deepscan_control::blobstore::MockBlobStore;
use deepscan_control::domain::ScanKind;
use deepscan_control::handlers::{CreateScanParams, HandlerState};
use deepscan_control::persistence::MemoryStore;
use deepscan_control::teardown::ScanTeardown;
use deepscan_control::workers::{
    Cleaner, CleanerConfig, Dispatcher, DispatcherConfig, Sweeper, SweeperConfig,
};
use deepscan_control::workload::{
    MockWorkloadManager, WorkloadResources, WorkloadSpecConfig,
};

pub const ORG_ID: &str = "aaaaaaaa-aaaa-aaaa-aaaa-000000000001";
pub const PROJECT_ID: &str = "aaaaaaaa-aaaa-aaaa-aaaa-000000000002";
pub const NAMESPACE: &str = "deepscan";

/// Everything a lifecycle test needs, wired the same way the runtime
/// wires production components.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub workloads: Arc<MockWorkloadManager>,
    pub blobs: Arc<MockBlobStore>,
    pub teardown: Arc<ScanTeardown>,
    pub state: HandlerState,
    pub dispatcher: Dispatcher,
    pub sweeper: Sweeper,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let workloads = Arc::new(MockWorkloadManager::new());
        let blobs = Arc::new(MockBlobStore::new());

        let teardown = Arc::new(ScanTeardown::new(
            store.clone(),
            workloads.clone(),
            blobs.clone(),
            NAMESPACE.to_string(),
        ));

        let state = HandlerState::new(
            store.clone(),
            workloads.clone(),
            blobs.clone(),
            teardown.clone(),
            NAMESPACE.to_string(),
        );

        let dispatcher = Dispatcher::new(
            store.clone(),
            workloads.clone(),
            blobs.clone(),
            spec_config(),
            DispatcherConfig::default(),
        );

        let sweeper = Sweeper::new(
            store.clone(),
            workloads.clone(),
            NAMESPACE.to_string(),
            SweeperConfig::default(),
        );

        Self {
            store,
            workloads,
            blobs,
            teardown,
            state,
            dispatcher,
            sweeper,
        }
    }

    /// Cleaner over this harness's store and teardown.
    pub fn cleaner(&self, retention_days: i64) -> Cleaner {
        Cleaner::new(
            self.store.clone(),
            self.teardown.clone(),
            CleanerConfig {
                enabled: true,
                retention_days,
                cleanup_time: "00:00".to_string(),
            },
        )
    }
}

pub fn spec_config() -> WorkloadSpecConfig {
    WorkloadSpecConfig {
        namespace: NAMESPACE.to_string(),
        service_account: "deepscan-runner".to_string(),
        runner_image: "deepscan/runner".to_string(),
        runner_version: "latest".to_string(),
        resources: WorkloadResources::default(),
        ttl_seconds_after_finished: Some(3600),
        backoff_limit: Some(1),
        active_deadline_seconds: Some(3600),
        orchestrator_endpoint: "deepscan-control.deepscan.svc:9440".to_string(),
        storage_service_endpoint: "deepscan-storage.deepscan.svc:9441".to_string(),
    }
}

/// A scan row created `days_old` days ago, for retention tests.
pub fn aged_scan(status: deepscan_control::domain::ScanStatus, days_old: i64) -> deepscan_control::domain::Scan {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    let created = Utc::now() - Duration::days(days_old);
    deepscan_control::domain::Scan {
        id: Uuid::new_v4(),
        organization_id: ORG_ID.parse().unwrap(),
        project_id: PROJECT_ID.parse().unwrap(),
        user_id: None,
        status,
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
        created_at: created,
        updated_at: created,
    }
}

/// Parameters for a repository-based scan request.
pub fn git_scan_params(kinds: Vec<ScanKind>) -> CreateScanParams {
    CreateScanParams {
        organization_id: ORG_ID.to_string(),
        project_id: PROJECT_ID.to_string(),
        scan_kinds: kinds,
        git_url: "https://x/y".to_string(),
        ..Default::default()
    }
}

/// Parameters for an uploaded-archive scan request.
pub fn artifact_scan_params(artifact_id: &str) -> CreateScanParams {
    CreateScanParams {
        organization_id: ORG_ID.to_string(),
        project_id: PROJECT_ID.to_string(),
        scan_kinds: vec![ScanKind::Sast],
        source_artifact_id: artifact_id.to_string(),
        ..Default::default()
    }
}
