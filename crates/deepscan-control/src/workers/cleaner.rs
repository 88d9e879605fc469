// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker that enforces the retention policy.
//!
//! Once a day, at a configured wall-clock time, the cleaner selects
//! terminal scans older than the retention window and hands each to the
//! shared teardown. Non-terminal scans are never selected, regardless of
//! age: a stuck scan must keep its artifacts until someone looks at it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::domain::{Scan, ScanStatus};
use crate::persistence::{ScanFilter, ScanStore};
use crate::teardown::ScanTeardown;

/// Configuration for the cleaner worker.
#[derive(Debug, Clone)]
pub struct CleanerConfig {
    /// Whether retention cleanup is enabled.
    pub enabled: bool,
    /// Days a terminal scan is preserved before cleanup.
    pub retention_days: i64,
    /// Wall-clock time of day for the daily cycle, "HH:MM".
    pub cleanup_time: String,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            enabled: false, // Disabled by default for safety
            retention_days: 90,
            cleanup_time: "00:00".to_string(),
        }
    }
}

impl CleanerConfig {
    /// Load configuration from environment variables.
    ///
    /// - `DEEPSCAN_CLEANER_ENABLED`: "true" or "1" to enable (default: false)
    /// - `DEEPSCAN_RETENTION_DAYS`: retention window in days (default: 90)
    /// - `DEEPSCAN_CLEANUP_TIME`: daily cleanup time, "HH:MM" (default: "00:00")
    pub fn from_env() -> Self {
        let enabled = std::env::var("DEEPSCAN_CLEANER_ENABLED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let retention_days = std::env::var("DEEPSCAN_RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(90);

        let cleanup_time =
            std::env::var("DEEPSCAN_CLEANUP_TIME").unwrap_or_else(|_| "00:00".to_string());

        Self {
            enabled,
            retention_days,
            cleanup_time,
        }
    }
}

/// Outcome counts of one cleanup cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub success: usize,
    pub failure: usize,
    pub total: usize,
}

/// Background worker that reclaims expired scans.
pub struct Cleaner {
    store: Arc<dyn ScanStore>,
    teardown: Arc<ScanTeardown>,
    config: CleanerConfig,
    shutdown: Arc<Notify>,
}

impl Cleaner {
    /// Create a new cleaner worker.
    pub fn new(store: Arc<dyn ScanStore>, teardown: Arc<ScanTeardown>, config: CleanerConfig) -> Self {
        Self {
            store,
            teardown,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the cleaner schedule until shutdown is signalled.
    pub async fn run(&self) {
        if !self.config.enabled {
            info!("Cleaner worker disabled");
            return;
        }

        info!(
            retention_days = self.config.retention_days,
            cleanup_time = %self.config.cleanup_time,
            "Cleaner worker started"
        );

        let (hour, minute) = parse_cleanup_time(&self.config.cleanup_time);

        loop {
            let next = next_occurrence(Local::now(), hour, minute);
            let sleep_for = (next - Local::now())
                .to_std()
                .unwrap_or(Duration::from_secs(0));
            info!(next_cleanup = %next, "Next cleanup scheduled");

            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Cleaner worker received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(sleep_for) => {
                    self.run_cycle().await;
                }
            }
        }

        info!("Cleaner worker stopped");
    }

    /// Run one cleanup cycle.
    pub async fn run_cycle(&self) -> CycleSummary {
        info!("Starting cleanup cycle");

        let cutoff = Utc::now() - chrono::Duration::days(self.config.retention_days);
        info!(cutoff = %cutoff, "Cleaning scans older than cutoff");

        let expired = self.list_expired(cutoff).await;
        info!(count = expired.len(), "Found expired terminal scans to clean up");

        let mut summary = CycleSummary {
            total: expired.len(),
            ..Default::default()
        };

        for scan in &expired {
            match self.teardown.teardown_scan(scan).await {
                Ok(()) => summary.success += 1,
                Err(e) => {
                    error!(scan_id = %scan.id, error = %e, "Failed to clean up scan");
                    summary.failure += 1;
                }
            }
        }

        info!(
            success_count = summary.success,
            failure_count = summary.failure,
            total_count = summary.total,
            "Cleanup cycle completed"
        );

        summary
    }

    /// Expired scans in terminal states only.
    async fn list_expired(&self, cutoff: DateTime<Utc>) -> Vec<Scan> {
        let mut expired = Vec::new();

        for status in ScanStatus::terminal() {
            let filter = ScanFilter {
                status: Some(status),
                created_before: Some(cutoff),
                ..Default::default()
            };

            match self.store.list_scans(&filter).await {
                Ok(scans) => expired.extend(scans),
                Err(e) => {
                    warn!(status = %status, error = %e, "Failed to list expired scans");
                }
            }
        }

        expired
    }
}

/// Parse "HH:MM"; malformed input falls back to midnight.
fn parse_cleanup_time(time: &str) -> (u32, u32) {
    let mut parts = time.splitn(2, ':');
    let hour = parts.next().and_then(|h| h.parse().ok()).unwrap_or(0);
    let minute = parts.next().and_then(|m| m.parse().ok()).unwrap_or(0);

    if hour > 23 || minute > 59 {
        return (0, 0);
    }
    (hour, minute)
}

/// Next occurrence of the target time of day, strictly after `now`.
fn next_occurrence(now: DateTime<Local>, hour: u32, minute: u32) -> DateTime<Local> {
    let today = now
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .unwrap_or_else(|| now.date_naive().and_hms_opt(0, 0, 0).expect("midnight is valid"));

    let candidate = today
        .and_local_timezone(Local)
        .earliest()
        .unwrap_or_else(|| now + chrono::Duration::days(1));

    if candidate <= now {
        candidate + chrono::Duration::days(1)
    } else {
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobstore::MockBlobStore;
    use crate::domain::ScanKind;
    use crate::persistence::MemoryStore;
    use crate::workload::MockWorkloadManager;
    use uuid::Uuid;

    fn scan_created_days_ago(status: ScanStatus, days: i64) -> Scan {
        let created = Utc::now() - chrono::Duration::days(days);
        Scan {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            user_id: None,
            status,
            scan_kinds: vec![ScanKind::Sast],
            repository_url: Some("https://x/y".to_string()),
            branch: None,
            commit_sha: None,
            source_archive_id: None,
            workload_name: Some("scan-cccccccc".to_string()),
            workload_namespace: Some("deepscan".to_string()),
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

    fn harness(config: CleanerConfig) -> (Arc<MemoryStore>, Cleaner) {
        let store = Arc::new(MemoryStore::new());
        let teardown = Arc::new(ScanTeardown::new(
            store.clone(),
            Arc::new(MockWorkloadManager::new()),
            Arc::new(MockBlobStore::new()),
            "deepscan".to_string(),
        ));
        let cleaner = Cleaner::new(store.clone(), teardown, config);
        (store, cleaner)
    }

    #[test]
    fn test_config_default() {
        let config = CleanerConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.retention_days, 90);
        assert_eq!(config.cleanup_time, "00:00");
    }

    #[test]
    fn test_parse_cleanup_time() {
        assert_eq!(parse_cleanup_time("00:00"), (0, 0));
        assert_eq!(parse_cleanup_time("23:59"), (23, 59));
        assert_eq!(parse_cleanup_time("07:30"), (7, 30));
        assert_eq!(parse_cleanup_time("25:00"), (0, 0));
        assert_eq!(parse_cleanup_time("bogus"), (0, 0));
        assert_eq!(parse_cleanup_time(""), (0, 0));
    }

    #[test]
    fn test_next_occurrence_is_strictly_future() {
        let now = Local::now();
        let next = next_occurrence(now, 0, 0);
        assert!(next > now);
        // Always within the next 24 hours
        assert!(next - now <= chrono::Duration::days(1));
    }

    #[tokio::test]
    async fn test_cycle_cleans_only_expired_terminal_scans() {
        let (store, cleaner) = harness(CleanerConfig {
            enabled: true,
            retention_days: 90,
            cleanup_time: "00:00".to_string(),
        });

        let expired_completed = scan_created_days_ago(ScanStatus::Completed, 91);
        let ancient_queued = scan_created_days_ago(ScanStatus::Queued, 100);
        let fresh_completed = scan_created_days_ago(ScanStatus::Completed, 10);

        store.create_scan(&expired_completed).await.unwrap();
        store.create_scan(&ancient_queued).await.unwrap();
        store.create_scan(&fresh_completed).await.unwrap();

        let summary = cleaner.run_cycle().await;

        assert_eq!(summary, CycleSummary { success: 1, failure: 0, total: 1 });

        // Only the expired terminal scan is gone.
        assert!(store.get_scan(expired_completed.id).await.is_err());
        assert!(store.get_scan(ancient_queued.id).await.is_ok());
        assert!(store.get_scan(fresh_completed.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_cycle_covers_all_terminal_statuses() {
        let (store, cleaner) = harness(CleanerConfig {
            enabled: true,
            retention_days: 30,
            cleanup_time: "00:00".to_string(),
        });

        for status in ScanStatus::terminal() {
            store
                .create_scan(&scan_created_days_ago(status, 31))
                .await
                .unwrap();
        }

        let summary = cleaner.run_cycle().await;
        assert_eq!(summary.success, 3);
        assert_eq!(store.scan_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_cycle() {
        let (_store, cleaner) = harness(CleanerConfig {
            enabled: true,
            ..Default::default()
        });

        let summary = cleaner.run_cycle().await;
        assert_eq!(summary, CycleSummary::default());
    }
}
