// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory store.
//!
//! Mirrors the Postgres semantics closely enough for worker and handler
//! tests to run without a database. Not used in production.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::{Finding, Scan, ScanStatus};
use crate::error::{ControlError, Result};

use super::{FindingFilter, FindingStats, FindingStore, ScanFilter, ScanStore};

/// Shared, ordered record of calls across mock collaborators.
///
/// Tests that assert cross-component ordering (e.g. the teardown order)
/// hand the same journal to several mocks.
pub type CallJournal = std::sync::Arc<Mutex<Vec<String>>>;

/// In-memory implementation of [`ScanStore`] and [`FindingStore`].
#[derive(Default)]
pub struct MemoryStore {
    scans: Mutex<HashMap<Uuid, Scan>>,
    findings: Mutex<Vec<Finding>>,
    journal: Mutex<Option<CallJournal>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a shared call journal.
    pub fn set_journal(&self, journal: CallJournal) {
        *self.journal.lock().unwrap() = Some(journal);
    }

    fn record(&self, entry: String) {
        if let Some(journal) = self.journal.lock().unwrap().as_ref() {
            journal.lock().unwrap().push(entry);
        }
    }

    /// Number of scans currently stored.
    pub fn scan_count(&self) -> usize {
        self.scans.lock().unwrap().len()
    }

    /// Number of findings currently stored.
    pub fn finding_count(&self) -> usize {
        self.findings.lock().unwrap().len()
    }
}

fn matches_filter(scan: &Scan, filter: &ScanFilter) -> bool {
    if let Some(org_id) = filter.organization_id
        && scan.organization_id != org_id
    {
        return false;
    }
    if let Some(project_id) = filter.project_id
        && scan.project_id != project_id
    {
        return false;
    }
    if let Some(user_id) = filter.user_id
        && scan.user_id != Some(user_id)
    {
        return false;
    }
    if let Some(status) = filter.status
        && scan.status != status
    {
        return false;
    }
    if !filter.scan_kinds.is_empty()
        && !filter.scan_kinds.iter().all(|k| scan.scan_kinds.contains(k))
    {
        return false;
    }
    if let Some(created_before) = filter.created_before
        && scan.created_at >= created_before
    {
        return false;
    }
    true
}

#[async_trait]
impl ScanStore for MemoryStore {
    async fn create_scan(&self, scan: &Scan) -> Result<()> {
        if scan.scan_kinds.is_empty() {
            return Err(ControlError::Invalid(
                "scan must have at least one scan kind".to_string(),
            ));
        }

        let mut scans = self.scans.lock().unwrap();
        if scans.contains_key(&scan.id) {
            return Err(ControlError::Conflict(format!(
                "scan '{}' already exists",
                scan.id
            )));
        }
        scans.insert(scan.id, scan.clone());
        Ok(())
    }

    async fn get_scan(&self, id: Uuid) -> Result<Scan> {
        self.scans
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(ControlError::ScanNotFound(id))
    }

    async fn update_scan(&self, scan: &Scan) -> Result<()> {
        let mut scans = self.scans.lock().unwrap();
        match scans.get_mut(&scan.id) {
            Some(existing) => {
                let mut updated = scan.clone();
                updated.created_at = existing.created_at;
                updated.updated_at = Utc::now();
                *existing = updated;
                Ok(())
            }
            None => Err(ControlError::ScanNotFound(scan.id)),
        }
    }

    async fn update_scan_status(&self, id: Uuid, status: ScanStatus) -> Result<()> {
        let mut scans = self.scans.lock().unwrap();
        match scans.get_mut(&id) {
            Some(scan) => {
                scan.status = status;
                scan.updated_at = Utc::now();
                Ok(())
            }
            None => Err(ControlError::ScanNotFound(id)),
        }
    }

    async fn list_scans(&self, filter: &ScanFilter) -> Result<Vec<Scan>> {
        let scans = self.scans.lock().unwrap();
        let mut matched: Vec<Scan> = scans
            .values()
            .filter(|s| matches_filter(s, filter))
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let matched: Vec<Scan> = match filter.limit {
            Some(limit) => matched
                .into_iter()
                .skip(offset)
                .take(limit.max(0) as usize)
                .collect(),
            None => matched.into_iter().skip(offset).collect(),
        };

        Ok(matched)
    }

    async fn delete_scan(&self, id: Uuid) -> Result<()> {
        let removed = self.scans.lock().unwrap().remove(&id);
        if removed.is_none() {
            return Err(ControlError::ScanNotFound(id));
        }
        self.record(format!("store.delete_scan {}", id));
        Ok(())
    }

    async fn get_scan_by_workload_name(&self, name: &str) -> Result<Scan> {
        self.scans
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.workload_name.as_deref() == Some(name))
            .max_by_key(|s| s.created_at)
            .cloned()
            .ok_or_else(|| ControlError::NotFound(format!("scan with workload name '{}'", name)))
    }
}

#[async_trait]
impl FindingStore for MemoryStore {
    async fn create_findings(&self, new_findings: &[Finding]) -> Result<()> {
        if new_findings.is_empty() {
            return Ok(());
        }

        // All-or-nothing: validate scan references before inserting.
        {
            let scans = self.scans.lock().unwrap();
            for finding in new_findings {
                if !scans.contains_key(&finding.scan_id) {
                    return Err(ControlError::Invalid(format!(
                        "finding references missing scan '{}'",
                        finding.scan_id
                    )));
                }
            }
        }

        self.findings.lock().unwrap().extend_from_slice(new_findings);
        Ok(())
    }

    async fn list_findings(&self, filter: &FindingFilter) -> Result<Vec<Finding>> {
        let findings = self.findings.lock().unwrap();
        let mut matched: Vec<Finding> = findings
            .iter()
            .filter(|f| f.scan_id == filter.scan_id)
            .filter(|f| filter.severity.is_none_or(|s| f.severity == s))
            .filter(|f| filter.scan_kind.is_none_or(|k| f.scan_kind == k))
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            b.severity
                .priority()
                .cmp(&a.severity.priority())
                .then(b.created_at.cmp(&a.created_at))
        });

        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let matched: Vec<Finding> = match filter.limit {
            Some(limit) => matched
                .into_iter()
                .skip(offset)
                .take(limit.max(0) as usize)
                .collect(),
            None => matched.into_iter().skip(offset).collect(),
        };

        Ok(matched)
    }

    async fn get_finding_stats(&self, scan_id: Uuid) -> Result<FindingStats> {
        let findings = self.findings.lock().unwrap();
        let mut stats = FindingStats::default();

        for finding in findings.iter().filter(|f| f.scan_id == scan_id) {
            stats.total += 1;
            match finding.severity {
                crate::domain::Severity::Critical => stats.critical += 1,
                crate::domain::Severity::High => stats.high += 1,
                crate::domain::Severity::Medium => stats.medium += 1,
                crate::domain::Severity::Low => stats.low += 1,
                crate::domain::Severity::Info => stats.info += 1,
            }
        }

        Ok(stats)
    }

    async fn delete_findings_by_scan(&self, scan_id: Uuid) -> Result<u64> {
        let mut findings = self.findings.lock().unwrap();
        let before = findings.len();
        findings.retain(|f| f.scan_id != scan_id);
        let deleted = (before - findings.len()) as u64;
        drop(findings);

        self.record(format!("store.delete_findings {}", scan_id));
        Ok(deleted)
    }
}
