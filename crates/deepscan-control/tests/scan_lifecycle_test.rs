// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end scan lifecycle: create → dispatch → sweep.

mod common;

use common::{Harness, artifact_scan_params, git_scan_params};
use deepscan_control::domain::{ScanKind, ScanStatus};
use deepscan_control::handlers::handle_create_scan;
use deepscan_control::persistence::ScanStore;
use deepscan_control::workload::{WorkloadCondition, WorkloadStatus};

#[tokio::test]
async fn test_happy_path() {
    let h = Harness::new();

    // Create: queued scan with a fresh id.
    let scan = handle_create_scan(&h.state, git_scan_params(vec![ScanKind::Sast, ScanKind::Sca]))
        .await
        .unwrap();
    assert_eq!(scan.status, ScanStatus::Queued);
    assert!(!scan.id.is_nil());

    // One dispatcher tick: running, with a workload behind it.
    h.dispatcher.dispatch_queued().await;

    let running = h.store.get_scan(scan.id).await.unwrap();
    assert_eq!(running.status, ScanStatus::Running);
    assert!(running.started_at.is_some());
    let workload_name = running.workload_name.clone().unwrap();
    assert!(workload_name.starts_with("scan-"));
    assert_eq!(workload_name.len(), 13);

    // Sweeper observes success: completed with a completion time.
    h.workloads.set_status(
        &workload_name,
        WorkloadStatus {
            succeeded: 1,
            ..Default::default()
        },
    );
    h.sweeper.sweep().await;

    let completed = h.store.get_scan(scan.id).await.unwrap();
    assert_eq!(completed.status, ScanStatus::Completed);
    assert!(completed.completed_at.is_some());
}

#[tokio::test]
async fn test_source_artifact_path() {
    let h = Harness::new();
    h.blobs.insert_artifact("art-123", "https://signed");

    let scan = handle_create_scan(&h.state, artifact_scan_params("art-123"))
        .await
        .unwrap();
    assert_eq!(scan.source_archive_id.as_deref(), Some("art-123"));

    h.dispatcher.dispatch_queued().await;

    let specs = h.workloads.created_specs();
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].env_var("SOURCE_DOWNLOAD_URL"), Some("https://signed"));
    assert_eq!(specs[0].env_var("SOURCE_ARTIFACT_ID"), Some("art-123"));

    let running = h.store.get_scan(scan.id).await.unwrap();
    assert_eq!(running.status, ScanStatus::Running);
}

#[tokio::test]
async fn test_failure_diagnostics_from_condition() {
    let h = Harness::new();

    let scan = handle_create_scan(&h.state, git_scan_params(vec![ScanKind::Sast]))
        .await
        .unwrap();
    h.dispatcher.dispatch_queued().await;

    let workload_name = h
        .store
        .get_scan(scan.id)
        .await
        .unwrap()
        .workload_name
        .unwrap();

    h.workloads.set_status(
        &workload_name,
        WorkloadStatus {
            failed: 1,
            conditions: vec![WorkloadCondition {
                condition_type: "Failed".to_string(),
                status: "True".to_string(),
                reason: "BackoffLimitExceeded".to_string(),
                message: "OOMKilled".to_string(),
            }],
            ..Default::default()
        },
    );
    h.sweeper.sweep().await;

    let failed = h.store.get_scan(scan.id).await.unwrap();
    assert_eq!(failed.status, ScanStatus::Failed);
    assert_eq!(failed.error_message.as_deref(), Some("OOMKilled"));
    assert!(failed.completed_at.is_some());
}

#[tokio::test]
async fn test_pending_workload_keeps_scan_running() {
    let h = Harness::new();

    let scan = handle_create_scan(&h.state, git_scan_params(vec![ScanKind::Secrets]))
        .await
        .unwrap();
    h.dispatcher.dispatch_queued().await;

    // All-zero status: pod still pending, nothing changes.
    h.sweeper.sweep().await;

    let unchanged = h.store.get_scan(scan.id).await.unwrap();
    assert_eq!(unchanged.status, ScanStatus::Running);
    assert!(unchanged.completed_at.is_none());
    assert!(unchanged.error_message.is_none());
}

#[tokio::test]
async fn test_terminal_transitions_are_monotonic() {
    let h = Harness::new();

    let scan = handle_create_scan(&h.state, git_scan_params(vec![ScanKind::Sast]))
        .await
        .unwrap();
    h.dispatcher.dispatch_queued().await;
    let workload_name = h
        .store
        .get_scan(scan.id)
        .await
        .unwrap()
        .workload_name
        .unwrap();

    h.workloads.set_status(
        &workload_name,
        WorkloadStatus {
            succeeded: 1,
            ..Default::default()
        },
    );
    h.sweeper.sweep().await;

    // A later, contradictory observation must not move the scan.
    h.workloads.set_status(
        &workload_name,
        WorkloadStatus {
            failed: 1,
            ..Default::default()
        },
    );
    h.sweeper.sweep().await;

    let settled = h.store.get_scan(scan.id).await.unwrap();
    assert_eq!(settled.status, ScanStatus::Completed);
    assert!(settled.error_message.is_none());
}

#[tokio::test]
async fn test_dispatch_failure_reconsidered_scans_stay_failed() {
    let h = Harness::new();
    h.workloads.fail_creates();

    let scan = handle_create_scan(&h.state, git_scan_params(vec![ScanKind::Sca]))
        .await
        .unwrap();

    h.dispatcher.dispatch_queued().await;

    let failed = h.store.get_scan(scan.id).await.unwrap();
    assert_eq!(failed.status, ScanStatus::Failed);
    assert!(failed
        .error_message
        .as_deref()
        .unwrap()
        .contains("failed to create workload"));

    // The next tick only considers queued scans; the failed one stays put.
    h.dispatcher.dispatch_queued().await;
    let still_failed = h.store.get_scan(scan.id).await.unwrap();
    assert_eq!(still_failed.status, ScanStatus::Failed);
}
