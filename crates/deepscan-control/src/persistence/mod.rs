// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends.
//!
//! The store is the single durable source of truth for scans and
//! findings; no other component touches the database directly.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Finding, Scan, ScanKind, ScanStatus, Severity};
use crate::error::Result;

/// Filter criteria for listing scans.
///
/// All criteria are conjunctive. Every tenant-scoped caller sets
/// `organization_id`; loops that span tenants leave it unset.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    pub organization_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub status: Option<ScanStatus>,
    /// Scans whose kind set contains all of these kinds.
    pub scan_kinds: Vec<ScanKind>,
    /// Scans created strictly before this watermark.
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ScanFilter {
    /// Filter selecting a single status.
    pub fn with_status(status: ScanStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Filter criteria for listing findings. Always scan-scoped.
#[derive(Debug, Clone)]
pub struct FindingFilter {
    pub scan_id: Uuid,
    pub severity: Option<Severity>,
    pub scan_kind: Option<ScanKind>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl FindingFilter {
    /// Filter selecting every finding of one scan.
    pub fn for_scan(scan_id: Uuid) -> Self {
        Self {
            scan_id,
            severity: None,
            scan_kind: None,
            limit: None,
            offset: None,
        }
    }
}

/// Aggregated finding counts for one scan.
///
/// `total` covers every severity; the per-severity counters leave out
/// info findings, so their sum is at most `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindingStats {
    pub total: i64,
    pub critical: i64,
    pub high: i64,
    pub medium: i64,
    pub low: i64,
    pub info: i64,
}

/// Scan persistence operations.
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Persist a new scan. Fails with `Conflict` on an id collision and
    /// `Invalid` on constraint violations.
    async fn create_scan(&self, scan: &Scan) -> Result<()>;

    /// Fetch a scan by id, or `ScanNotFound`.
    async fn get_scan(&self, id: Uuid) -> Result<Scan>;

    /// Overwrite the mutable fields of a scan. `updated_at` advances
    /// automatically. Does not validate state-machine legality; callers
    /// are responsible for the transition DAG.
    async fn update_scan(&self, scan: &Scan) -> Result<()>;

    /// Atomic single-field status transition.
    async fn update_scan_status(&self, id: Uuid, status: ScanStatus) -> Result<()>;

    /// List scans matching the filter, newest first.
    async fn list_scans(&self, filter: &ScanFilter) -> Result<Vec<Scan>>;

    /// Remove the scan row. Callers must have deleted findings first.
    async fn delete_scan(&self, id: Uuid) -> Result<()>;

    /// Reverse lookup by workload name, used by external callbacks.
    async fn get_scan_by_workload_name(&self, name: &str) -> Result<Scan>;
}

/// Combined store surface; implemented by every backend.
pub trait Store: ScanStore + FindingStore {}

impl<T: ScanStore + FindingStore> Store for T {}

/// Finding persistence operations.
#[async_trait]
pub trait FindingStore: Send + Sync {
    /// Insert a batch of findings in one atomic transaction. An empty
    /// batch is a no-op. Fails with `Invalid` when a finding references
    /// a missing scan.
    async fn create_findings(&self, findings: &[Finding]) -> Result<()>;

    /// List findings for a scan, ordered by severity (critical first)
    /// then creation time descending.
    async fn list_findings(&self, filter: &FindingFilter) -> Result<Vec<Finding>>;

    /// Aggregate finding counts for a scan.
    async fn get_finding_stats(&self, scan_id: Uuid) -> Result<FindingStats>;

    /// Delete all findings for a scan; returns the number deleted.
    async fn delete_findings_by_scan(&self, scan_id: Uuid) -> Result<u64>;
}
