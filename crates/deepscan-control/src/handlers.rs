// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request API handlers.
//!
//! Synchronous operations over the store and the external clients. The
//! QUIC server decodes wire messages and routes them here; handlers work
//! in domain types and classify failures via [`ControlError`] so the
//! boundary can map them to RPC status codes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::blobstore::BlobStore;
use crate::domain::{Finding, Scan, ScanKind, ScanStatus};
use crate::error::{ControlError, Result};
use crate::persistence::{FindingFilter, ScanFilter, Store};
use crate::teardown::ScanTeardown;
use crate::workload::WorkloadManager;

/// Shared state for request handlers.
pub struct HandlerState {
    pub store: Arc<dyn Store>,
    pub workloads: Arc<dyn WorkloadManager>,
    pub blobs: Arc<dyn BlobStore>,
    pub teardown: Arc<ScanTeardown>,
    /// Namespace for workloads of scans that predate namespace tracking.
    pub default_namespace: String,
}

impl HandlerState {
    /// Create a new handler state.
    pub fn new(
        store: Arc<dyn Store>,
        workloads: Arc<dyn WorkloadManager>,
        blobs: Arc<dyn BlobStore>,
        teardown: Arc<ScanTeardown>,
        default_namespace: String,
    ) -> Self {
        Self {
            store,
            workloads,
            blobs,
            teardown,
            default_namespace,
        }
    }
}

/// Parameters for creating a scan. Identifier fields arrive as strings
/// from the wire and are validated here.
#[derive(Debug, Clone, Default)]
pub struct CreateScanParams {
    pub organization_id: String,
    pub project_id: String,
    pub user_id: String,
    pub scan_kinds: Vec<ScanKind>,
    pub git_url: String,
    pub git_branch: String,
    pub git_commit: String,
    pub source_artifact_id: String,
}

/// Parameters for listing scans.
#[derive(Debug, Clone, Default)]
pub struct ListScansParams {
    pub organization_id: String,
    pub project_id: String,
    pub user_id: String,
    pub status: Option<ScanStatus>,
    pub scan_kinds: Vec<ScanKind>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Parameters for the workload-reported scan update.
#[derive(Debug, Clone, Default)]
pub struct UpdateScanParams {
    pub id: String,
    pub status: Option<ScanStatus>,
    pub total_findings: Option<i32>,
    pub error_message: Option<String>,
}

/// Parameters for fetching findings.
#[derive(Debug, Clone, Default)]
pub struct GetFindingsParams {
    pub scan_id: String,
    pub scan_kind: Option<ScanKind>,
    pub severity: Option<crate::domain::Severity>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn parse_id(value: &str, field: &str) -> Result<Uuid> {
    value
        .parse()
        .map_err(|e| ControlError::Invalid(format!("invalid {}: {}", field, e)))
}

fn parse_optional_id(value: &str, field: &str) -> Result<Option<Uuid>> {
    if value.is_empty() {
        return Ok(None);
    }
    parse_id(value, field).map(Some)
}

/// Create a new scan in the queued state.
#[instrument(skip(state, params), fields(org_id = %params.organization_id, project_id = %params.project_id))]
pub async fn handle_create_scan(state: &HandlerState, params: CreateScanParams) -> Result<Scan> {
    info!(git_url = %params.git_url, "Creating new scan");

    if params.organization_id.is_empty() {
        return Err(ControlError::Invalid("organization_id is required".to_string()));
    }
    if params.project_id.is_empty() {
        return Err(ControlError::Invalid("project_id is required".to_string()));
    }
    if params.scan_kinds.is_empty() {
        return Err(ControlError::Invalid(
            "at least one scan kind is required".to_string(),
        ));
    }
    // Either a repository URL or an uploaded archive must identify the source.
    if params.git_url.is_empty() && params.source_artifact_id.is_empty() {
        return Err(ControlError::Invalid(
            "either git_url or source_artifact_id is required".to_string(),
        ));
    }

    let organization_id = parse_id(&params.organization_id, "organization_id")?;
    let project_id = parse_id(&params.project_id, "project_id")?;
    let user_id = parse_optional_id(&params.user_id, "user_id")?;

    let non_empty = |s: String| if s.is_empty() { None } else { Some(s) };

    let now = Utc::now();
    let scan = Scan {
        id: Uuid::new_v4(),
        organization_id,
        project_id,
        user_id,
        status: ScanStatus::Queued,
        scan_kinds: params.scan_kinds,
        repository_url: non_empty(params.git_url),
        branch: non_empty(params.git_branch),
        commit_sha: non_empty(params.git_commit),
        source_archive_id: non_empty(params.source_artifact_id),
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
    };

    state.store.create_scan(&scan).await?;

    info!(scan_id = %scan.id, "Scan created successfully");
    Ok(scan)
}

/// Fetch a scan by id.
#[instrument(skip(state))]
pub async fn handle_get_scan(state: &HandlerState, id: &str) -> Result<Scan> {
    let scan_id = parse_id(id, "scan_id")?;
    state.store.get_scan(scan_id).await
}

/// List scans with multi-tenant filtering.
#[instrument(skip(state, params), fields(org_id = %params.organization_id))]
pub async fn handle_list_scans(state: &HandlerState, params: ListScansParams) -> Result<Vec<Scan>> {
    let filter = ScanFilter {
        organization_id: parse_optional_id(&params.organization_id, "organization_id")?,
        project_id: parse_optional_id(&params.project_id, "project_id")?,
        user_id: parse_optional_id(&params.user_id, "user_id")?,
        status: params.status,
        scan_kinds: params.scan_kinds,
        created_before: params.created_before,
        limit: params.limit,
        offset: params.offset,
    };

    state.store.list_scans(&filter).await
}

/// Apply a progress report from a running workload.
///
/// Workloads are trusted callers, so the transition is not validated
/// against the state machine. A terminal report stamps `completed_at`
/// so the timing invariant holds.
#[instrument(skip(state, params), fields(scan_id = %params.id))]
pub async fn handle_update_scan(state: &HandlerState, params: UpdateScanParams) -> Result<Scan> {
    info!("Updating scan");

    let scan_id = parse_id(&params.id, "scan_id")?;
    let mut scan = state.store.get_scan(scan_id).await?;

    if let Some(status) = params.status {
        scan.status = status;
        if matches!(status, ScanStatus::Completed | ScanStatus::Failed)
            && scan.completed_at.is_none()
        {
            scan.completed_at = Some(Utc::now());
        }
    }
    if let Some(total) = params.total_findings
        && total > 0
    {
        scan.findings_count = total;
    }
    if let Some(message) = params.error_message
        && !message.is_empty()
    {
        scan.error_message = Some(message);
    }

    // On completion, reconcile the row's counters against the findings
    // actually stored, so per-severity counts cannot drift.
    if scan.status == ScanStatus::Completed {
        let stats = state.store.get_finding_stats(scan_id).await?;
        scan.critical_count = stats.critical as i32;
        scan.high_count = stats.high as i32;
        scan.medium_count = stats.medium as i32;
        scan.low_count = stats.low as i32;
        scan.findings_count = scan.findings_count.max(stats.total as i32);
    }

    state.store.update_scan(&scan).await?;

    info!(scan_id = %scan.id, "Scan updated successfully");
    state.store.get_scan(scan_id).await
}

/// Fetch findings for a scan.
#[instrument(skip(state, params), fields(scan_id = %params.scan_id))]
pub async fn handle_get_findings(
    state: &HandlerState,
    params: GetFindingsParams,
) -> Result<Vec<Finding>> {
    let scan_id = parse_id(&params.scan_id, "scan_id")?;

    let filter = FindingFilter {
        scan_id,
        severity: params.severity,
        scan_kind: params.scan_kind,
        limit: params.limit,
        offset: params.offset,
    };

    state.store.list_findings(&filter).await
}

/// Insert a batch of findings reported by a workload.
///
/// Returns the number inserted. The scan must exist; tool names default
/// to the scanner of the finding's kind.
#[instrument(skip(state, findings), fields(scan_id = %scan_id, count = findings.len()))]
pub async fn handle_create_findings(
    state: &HandlerState,
    scan_id: &str,
    mut findings: Vec<Finding>,
) -> Result<u32> {
    info!("Creating findings");

    if scan_id.is_empty() {
        return Err(ControlError::Invalid("scan_id is required".to_string()));
    }
    let scan_id = parse_id(scan_id, "scan_id")?;

    // Verify the scan exists before accepting its findings.
    state.store.get_scan(scan_id).await?;

    for finding in &mut findings {
        finding.scan_id = scan_id;
        if finding.tool_name.is_empty() {
            finding.tool_name = finding.scan_kind.default_tool().to_string();
        }
    }

    state.store.create_findings(&findings).await?;

    info!(count = findings.len(), "Findings created successfully");
    Ok(findings.len() as u32)
}

/// Cancel a scan.
///
/// Cancelling a cancelled scan is a no-op; cancelling a completed or
/// failed scan is a precondition failure. Workload cancellation is best
/// effort: its failure is logged and the scan is still cancelled.
#[instrument(skip(state))]
pub async fn handle_cancel_scan(state: &HandlerState, id: &str) -> Result<()> {
    info!("Cancelling scan");

    let scan_id = parse_id(id, "scan_id")?;
    let scan = state.store.get_scan(scan_id).await?;

    match scan.status {
        ScanStatus::Completed | ScanStatus::Failed => {
            return Err(ControlError::Conflict("scan already completed".to_string()));
        }
        ScanStatus::Cancelled => {
            // Idempotent.
            return Ok(());
        }
        ScanStatus::Queued | ScanStatus::Running => {}
    }

    if let Some(workload_name) = scan.workload_name.as_deref().filter(|n| !n.is_empty()) {
        let namespace = scan
            .workload_namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(&state.default_namespace);

        if let Err(e) = state.workloads.cancel_workload(namespace, workload_name).await {
            warn!(scan_id = %scan.id, workload = workload_name, error = %e, "Failed to cancel workload");
        }
    }

    state
        .store
        .update_scan_status(scan_id, ScanStatus::Cancelled)
        .await?;

    info!(scan_id = %scan.id, "Scan cancelled successfully");
    Ok(())
}

/// Delete a scan and all of its resources, regardless of age or status.
#[instrument(skip(state))]
pub async fn handle_delete_scan(state: &HandlerState, id: &str) -> Result<()> {
    info!("Deleting scan");

    let scan_id = parse_id(id, "scan_id")?;
    let scan = state.store.get_scan(scan_id).await?;

    state.teardown.teardown_scan(&scan).await
}

/// Delete every scan of a project; continues past per-scan failures and
/// returns the number of scans successfully deleted.
#[instrument(skip(state))]
pub async fn handle_delete_project_scans(state: &HandlerState, project_id: &str) -> Result<u32> {
    info!("Deleting project scans");

    let project_id = parse_id(project_id, "project_id")?;

    let filter = ScanFilter {
        project_id: Some(project_id),
        ..Default::default()
    };
    let scans = state.store.list_scans(&filter).await?;

    let mut deleted = 0u32;
    for scan in &scans {
        match state.teardown.teardown_scan(scan).await {
            Ok(()) => deleted += 1,
            Err(e) => {
                warn!(scan_id = %scan.id, error = %e, "Failed to delete scan, continuing");
            }
        }
    }

    info!(deleted = deleted, total = scans.len(), "Project scans deleted");
    Ok(deleted)
}
