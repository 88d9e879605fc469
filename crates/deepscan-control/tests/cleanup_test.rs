// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Retention cleanup and explicit deletion.

mod common;

use common::{Harness, aged_scan, git_scan_params};
use deepscan_control::domain::{ScanKind, ScanStatus};
use deepscan_control::handlers::{
    handle_create_scan, handle_delete_project_scans, handle_delete_scan,
};
use deepscan_control::persistence::memory::CallJournal;
use deepscan_control::persistence::{FindingFilter, FindingStore, ScanStore};

#[tokio::test]
async fn test_cleaner_cycle_respects_retention_and_terminal_statuses() {
    let h = Harness::new();

    let mut expired = aged_scan(ScanStatus::Completed, 91);
    expired.workload_name = Some("scan-dddddddd".to_string());
    expired.workload_namespace = Some("deepscan".to_string());
    expired.source_archive_id = Some("art-old".to_string());
    let ancient_queued = aged_scan(ScanStatus::Queued, 100);

    h.store.create_scan(&expired).await.unwrap();
    h.store.create_scan(&ancient_queued).await.unwrap();
    h.blobs.insert_artifact("art-old", "https://signed");

    let journal = CallJournal::default();
    h.store.set_journal(journal.clone());
    h.workloads.set_journal(journal.clone());
    h.blobs.set_journal(journal.clone());

    let summary = h.cleaner(90).run_cycle().await;
    assert_eq!(summary.total, 1);
    assert_eq!(summary.success, 1);

    // The completed scan is gone, the ancient queued one untouched.
    assert!(h.store.get_scan(expired.id).await.is_err());
    assert!(h.store.get_scan(ancient_queued.id).await.is_ok());

    // Teardown order: workload, artifacts, findings, scan row.
    let calls = journal.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            "workload.delete scan-dddddddd".to_string(),
            "storage.delete_artifacts art-old".to_string(),
            format!("store.delete_findings {}", expired.id),
            format!("store.delete_scan {}", expired.id),
        ]
    );
}

#[tokio::test]
async fn test_delete_scan_removes_scan_and_findings() {
    let h = Harness::new();

    let scan = handle_create_scan(&h.state, git_scan_params(vec![ScanKind::Sast]))
        .await
        .unwrap();

    let finding = {
        let mut f = sample_finding();
        f.scan_id = scan.id;
        f
    };
    h.store.create_findings(&[finding]).await.unwrap();

    handle_delete_scan(&h.state, &scan.id.to_string())
        .await
        .unwrap();

    // No scan row and no findings remain.
    assert!(h.store.get_scan(scan.id).await.is_err());
    let leftover = h
        .store
        .list_findings(&FindingFilter::for_scan(scan.id))
        .await
        .unwrap();
    assert!(leftover.is_empty());
}

#[tokio::test]
async fn test_delete_scan_ignores_age_and_status() {
    let h = Harness::new();

    // A fresh, still-running scan is deletable on demand.
    let scan = handle_create_scan(&h.state, git_scan_params(vec![ScanKind::Sca]))
        .await
        .unwrap();
    h.dispatcher.dispatch_queued().await;

    handle_delete_scan(&h.state, &scan.id.to_string())
        .await
        .unwrap();
    assert!(h.store.get_scan(scan.id).await.is_err());
}

#[tokio::test]
async fn test_delete_missing_scan_is_not_found() {
    let h = Harness::new();

    let err = handle_delete_scan(&h.state, "aaaaaaaa-aaaa-aaaa-aaaa-999999999999")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_delete_succeeds_when_external_resources_already_gone() {
    let h = Harness::new();
    h.blobs.fail_deletes();

    let mut scan = aged_scan(ScanStatus::Failed, 5);
    scan.workload_name = Some("scan-eeeeeeee".to_string());
    scan.source_archive_id = Some("art-gone".to_string());
    h.store.create_scan(&scan).await.unwrap();

    // Workload is unknown to the manager and the blob call fails; the
    // row still goes away.
    handle_delete_scan(&h.state, &scan.id.to_string())
        .await
        .unwrap();
    assert!(h.store.get_scan(scan.id).await.is_err());
}

#[tokio::test]
async fn test_delete_project_scans_counts_successes() {
    let h = Harness::new();

    for _ in 0..3 {
        handle_create_scan(&h.state, git_scan_params(vec![ScanKind::Sast]))
            .await
            .unwrap();
    }

    let deleted = handle_delete_project_scans(&h.state, common::PROJECT_ID)
        .await
        .unwrap();
    assert_eq!(deleted, 3);
    assert_eq!(h.store.scan_count(), 0);
}

#[tokio::test]
async fn test_delete_project_scans_scoped_to_project() {
    let h = Harness::new();

    handle_create_scan(&h.state, git_scan_params(vec![ScanKind::Sast]))
        .await
        .unwrap();

    let other_project = aged_scan(ScanStatus::Completed, 1);
    let mut other = other_project.clone();
    other.project_id = uuid::Uuid::new_v4();
    h.store.create_scan(&other).await.unwrap();

    let deleted = handle_delete_project_scans(&h.state, common::PROJECT_ID)
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(h.store.get_scan(other.id).await.is_ok());
}

fn sample_finding() -> deepscan_control::domain::Finding {
    use chrono::Utc;
    use uuid::Uuid;

    deepscan_control::domain::Finding {
        id: Uuid::new_v4(),
        scan_id: Uuid::nil(),
        scan_kind: ScanKind::Sast,
        tool_name: "semgrep".to_string(),
        title: "sql injection".to_string(),
        description: String::new(),
        severity: deepscan_control::domain::Severity::High,
        file_path: "src/db.rs".to_string(),
        start_line: 42,
        end_line: None,
        start_column: None,
        end_column: None,
        code_snippet: None,
        rule_id: None,
        cwe_id: Some("CWE-89".to_string()),
        cve_id: None,
        cvss_score: None,
        cvss_vector: None,
        package_name: None,
        package_version: None,
        fixed_version: None,
        license_name: None,
        license_type: None,
        remediation: None,
        references: Vec::new(),
        raw_output: None,
        created_at: Utc::now(),
    }
}
