// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL persistence for scans and findings.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Finding, Scan, ScanKind, ScanStatus, Severity};
use crate::error::{ControlError, Result};

use super::{FindingFilter, FindingStats, FindingStore, ScanFilter, ScanStore};

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new Postgres-backed store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ============================================================================
// Row Types
// ============================================================================

const SCAN_COLUMNS: &str = "\
    id, organization_id, project_id, user_id, status, scan_kinds, \
    repository_url, branch, commit_sha, source_archive_id, \
    workload_name, workload_namespace, \
    findings_count, critical_count, high_count, medium_count, low_count, \
    error_message, started_at, completed_at, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct ScanRow {
    id: Uuid,
    organization_id: Uuid,
    project_id: Uuid,
    user_id: Option<Uuid>,
    status: String,
    scan_kinds: Vec<String>,
    repository_url: Option<String>,
    branch: Option<String>,
    commit_sha: Option<String>,
    source_archive_id: Option<String>,
    workload_name: Option<String>,
    workload_namespace: Option<String>,
    findings_count: i32,
    critical_count: i32,
    high_count: i32,
    medium_count: i32,
    low_count: i32,
    error_message: Option<String>,
    started_at: Option<chrono::DateTime<Utc>>,
    completed_at: Option<chrono::DateTime<Utc>>,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl TryFrom<ScanRow> for Scan {
    type Error = ControlError;

    fn try_from(row: ScanRow) -> Result<Self> {
        let status = ScanStatus::parse(&row.status)
            .ok_or_else(|| ControlError::Internal(format!("unknown scan status '{}'", row.status)))?;

        let scan_kinds = row
            .scan_kinds
            .iter()
            .map(|k| {
                ScanKind::parse(k)
                    .ok_or_else(|| ControlError::Internal(format!("unknown scan kind '{}'", k)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Scan {
            id: row.id,
            organization_id: row.organization_id,
            project_id: row.project_id,
            user_id: row.user_id,
            status,
            scan_kinds,
            repository_url: row.repository_url,
            branch: row.branch,
            commit_sha: row.commit_sha,
            source_archive_id: row.source_archive_id,
            workload_name: row.workload_name,
            workload_namespace: row.workload_namespace,
            findings_count: row.findings_count,
            critical_count: row.critical_count,
            high_count: row.high_count,
            medium_count: row.medium_count,
            low_count: row.low_count,
            error_message: row.error_message,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FindingRow {
    id: Uuid,
    scan_id: Uuid,
    scan_kind: String,
    tool_name: String,
    title: String,
    description: String,
    severity: String,
    file_path: String,
    start_line: i32,
    end_line: Option<i32>,
    start_column: Option<i32>,
    end_column: Option<i32>,
    code_snippet: Option<String>,
    rule_id: Option<String>,
    cwe_id: Option<String>,
    cve_id: Option<String>,
    cvss_score: Option<f64>,
    cvss_vector: Option<String>,
    package_name: Option<String>,
    package_version: Option<String>,
    fixed_version: Option<String>,
    license_name: Option<String>,
    license_type: Option<String>,
    remediation: Option<String>,
    references: Vec<String>,
    raw_output: Option<String>,
    created_at: chrono::DateTime<Utc>,
}

impl TryFrom<FindingRow> for Finding {
    type Error = ControlError;

    fn try_from(row: FindingRow) -> Result<Self> {
        let scan_kind = ScanKind::parse(&row.scan_kind).ok_or_else(|| {
            ControlError::Internal(format!("unknown scan kind '{}'", row.scan_kind))
        })?;
        let severity = Severity::parse(&row.severity).ok_or_else(|| {
            ControlError::Internal(format!("unknown severity '{}'", row.severity))
        })?;

        Ok(Finding {
            id: row.id,
            scan_id: row.scan_id,
            scan_kind,
            tool_name: row.tool_name,
            title: row.title,
            description: row.description,
            severity,
            file_path: row.file_path,
            start_line: row.start_line,
            end_line: row.end_line,
            start_column: row.start_column,
            end_column: row.end_column,
            code_snippet: row.code_snippet,
            rule_id: row.rule_id,
            cwe_id: row.cwe_id,
            cve_id: row.cve_id,
            cvss_score: row.cvss_score,
            cvss_vector: row.cvss_vector,
            package_name: row.package_name,
            package_version: row.package_version,
            fixed_version: row.fixed_version,
            license_name: row.license_name,
            license_type: row.license_type,
            remediation: row.remediation,
            references: row.references,
            raw_output: row.raw_output,
            created_at: row.created_at,
        })
    }
}

// ============================================================================
// Scan Operations
// ============================================================================

/// Persist a new scan row.
pub async fn create_scan(pool: &PgPool, scan: &Scan) -> Result<()> {
    if scan.scan_kinds.is_empty() {
        return Err(ControlError::Invalid(
            "scan must have at least one scan kind".to_string(),
        ));
    }

    let kinds: Vec<String> = scan.scan_kinds.iter().map(|k| k.to_string()).collect();

    sqlx::query(
        r#"
        INSERT INTO scans (
            id, organization_id, project_id, user_id, status, scan_kinds,
            repository_url, branch, commit_sha, source_archive_id,
            workload_name, workload_namespace, created_at, updated_at
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14
        )
        "#,
    )
    .bind(scan.id)
    .bind(scan.organization_id)
    .bind(scan.project_id)
    .bind(scan.user_id)
    .bind(scan.status.as_str())
    .bind(&kinds)
    .bind(&scan.repository_url)
    .bind(&scan.branch)
    .bind(&scan.commit_sha)
    .bind(&scan.source_archive_id)
    .bind(&scan.workload_name)
    .bind(&scan.workload_namespace)
    .bind(scan.created_at)
    .bind(scan.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a scan by id.
pub async fn get_scan(pool: &PgPool, id: Uuid) -> Result<Scan> {
    let row = sqlx::query_as::<_, ScanRow>(&format!(
        "SELECT {} FROM scans WHERE id = $1",
        SCAN_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => row.try_into(),
        None => Err(ControlError::ScanNotFound(id)),
    }
}

/// Overwrite the mutable fields of a scan.
pub async fn update_scan(pool: &PgPool, scan: &Scan) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE scans SET
            status = $2,
            workload_name = $3,
            workload_namespace = $4,
            findings_count = $5,
            critical_count = $6,
            high_count = $7,
            medium_count = $8,
            low_count = $9,
            started_at = $10,
            completed_at = $11,
            error_message = $12,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(scan.id)
    .bind(scan.status.as_str())
    .bind(&scan.workload_name)
    .bind(&scan.workload_namespace)
    .bind(scan.findings_count)
    .bind(scan.critical_count)
    .bind(scan.high_count)
    .bind(scan.medium_count)
    .bind(scan.low_count)
    .bind(scan.started_at)
    .bind(scan.completed_at)
    .bind(&scan.error_message)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ControlError::ScanNotFound(scan.id));
    }

    Ok(())
}

/// Atomic single-field status transition.
pub async fn update_scan_status(pool: &PgPool, id: Uuid, status: ScanStatus) -> Result<()> {
    let result = sqlx::query("UPDATE scans SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(status.as_str())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ControlError::ScanNotFound(id));
    }

    Ok(())
}

/// List scans matching the filter, newest first.
pub async fn list_scans(pool: &PgPool, filter: &ScanFilter) -> Result<Vec<Scan>> {
    let mut query = format!("SELECT {} FROM scans WHERE 1=1", SCAN_COLUMNS);
    let mut idx = 0u32;
    let mut next = |clause: &str| {
        idx += 1;
        format!(" AND {} ${}", clause, idx)
    };

    if filter.organization_id.is_some() {
        query.push_str(&next("organization_id ="));
    }
    if filter.project_id.is_some() {
        query.push_str(&next("project_id ="));
    }
    if filter.user_id.is_some() {
        query.push_str(&next("user_id ="));
    }
    if filter.status.is_some() {
        query.push_str(&next("status ="));
    }
    if !filter.scan_kinds.is_empty() {
        query.push_str(&next("scan_kinds @>"));
    }
    if filter.created_before.is_some() {
        query.push_str(&next("created_at <"));
    }

    query.push_str(" ORDER BY created_at DESC");

    if filter.limit.is_some() {
        idx += 1;
        query.push_str(&format!(" LIMIT ${}", idx));
    }
    if filter.offset.is_some() {
        idx += 1;
        query.push_str(&format!(" OFFSET ${}", idx));
    }

    let mut q = sqlx::query_as::<_, ScanRow>(&query);
    if let Some(org_id) = filter.organization_id {
        q = q.bind(org_id);
    }
    if let Some(project_id) = filter.project_id {
        q = q.bind(project_id);
    }
    if let Some(user_id) = filter.user_id {
        q = q.bind(user_id);
    }
    if let Some(status) = filter.status {
        q = q.bind(status.as_str());
    }
    if !filter.scan_kinds.is_empty() {
        let kinds: Vec<String> = filter.scan_kinds.iter().map(|k| k.to_string()).collect();
        q = q.bind(kinds);
    }
    if let Some(created_before) = filter.created_before {
        q = q.bind(created_before);
    }
    if let Some(limit) = filter.limit {
        q = q.bind(limit);
    }
    if let Some(offset) = filter.offset {
        q = q.bind(offset);
    }

    let rows = q.fetch_all(pool).await?;
    rows.into_iter().map(Scan::try_from).collect()
}

/// Remove a scan row. Findings must already be gone.
pub async fn delete_scan(pool: &PgPool, id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM scans WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ControlError::ScanNotFound(id));
    }

    Ok(())
}

/// Reverse lookup by workload name.
pub async fn get_scan_by_workload_name(pool: &PgPool, name: &str) -> Result<Scan> {
    let row = sqlx::query_as::<_, ScanRow>(&format!(
        "SELECT {} FROM scans WHERE workload_name = $1 ORDER BY created_at DESC LIMIT 1",
        SCAN_COLUMNS
    ))
    .bind(name)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => row.try_into(),
        None => Err(ControlError::NotFound(format!(
            "scan with workload name '{}'",
            name
        ))),
    }
}

// ============================================================================
// Finding Operations
// ============================================================================

/// Insert a batch of findings in one transaction.
pub async fn create_findings(pool: &PgPool, findings: &[Finding]) -> Result<()> {
    if findings.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    // Scans are partitioned, so there is no foreign key to lean on;
    // verify every referenced scan exists inside the transaction.
    let mut scan_ids: Vec<Uuid> = findings.iter().map(|f| f.scan_id).collect();
    scan_ids.sort_unstable();
    scan_ids.dedup();

    let known: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT id) FROM scans WHERE id = ANY($1)")
            .bind(&scan_ids)
            .fetch_one(&mut *tx)
            .await?;
    if known != scan_ids.len() as i64 {
        return Err(ControlError::Invalid(
            "finding references a missing scan".to_string(),
        ));
    }

    for finding in findings {
        sqlx::query(
            r#"
            INSERT INTO findings (
                id, scan_id, scan_kind, tool_name, title, description, severity,
                file_path, start_line, end_line, start_column, end_column, code_snippet,
                rule_id, cwe_id, cve_id, cvss_score, cvss_vector,
                package_name, package_version, fixed_version,
                license_name, license_type, remediation, "references", raw_output,
                created_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27
            )
            "#,
        )
        .bind(finding.id)
        .bind(finding.scan_id)
        .bind(finding.scan_kind.as_str())
        .bind(finding.effective_tool_name())
        .bind(&finding.title)
        .bind(&finding.description)
        .bind(finding.severity.as_str())
        .bind(&finding.file_path)
        .bind(finding.start_line)
        .bind(finding.end_line)
        .bind(finding.start_column)
        .bind(finding.end_column)
        .bind(&finding.code_snippet)
        .bind(&finding.rule_id)
        .bind(&finding.cwe_id)
        .bind(&finding.cve_id)
        .bind(finding.cvss_score)
        .bind(&finding.cvss_vector)
        .bind(&finding.package_name)
        .bind(&finding.package_version)
        .bind(&finding.fixed_version)
        .bind(&finding.license_name)
        .bind(&finding.license_type)
        .bind(&finding.remediation)
        .bind(&finding.references)
        .bind(&finding.raw_output)
        .bind(finding.created_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// List findings matching the filter, most severe first.
pub async fn list_findings(pool: &PgPool, filter: &FindingFilter) -> Result<Vec<Finding>> {
    let mut query = String::from(
        r#"SELECT
            id, scan_id, scan_kind, tool_name, title, description, severity,
            file_path, start_line, end_line, start_column, end_column, code_snippet,
            rule_id, cwe_id, cve_id, cvss_score, cvss_vector,
            package_name, package_version, fixed_version,
            license_name, license_type, remediation, "references", raw_output,
            created_at
        FROM findings WHERE scan_id = $1"#,
    );

    let mut idx = 1u32;
    if filter.scan_kind.is_some() {
        idx += 1;
        query.push_str(&format!(" AND scan_kind = ${}", idx));
    }
    if filter.severity.is_some() {
        idx += 1;
        query.push_str(&format!(" AND severity = ${}", idx));
    }

    query.push_str(
        " ORDER BY CASE severity \
         WHEN 'critical' THEN 1 WHEN 'high' THEN 2 WHEN 'medium' THEN 3 \
         WHEN 'low' THEN 4 ELSE 5 END, created_at DESC",
    );

    if filter.limit.is_some() {
        idx += 1;
        query.push_str(&format!(" LIMIT ${}", idx));
    }
    if filter.offset.is_some() {
        idx += 1;
        query.push_str(&format!(" OFFSET ${}", idx));
    }

    let mut q = sqlx::query_as::<_, FindingRow>(&query).bind(filter.scan_id);
    if let Some(kind) = filter.scan_kind {
        q = q.bind(kind.as_str());
    }
    if let Some(severity) = filter.severity {
        q = q.bind(severity.as_str());
    }
    if let Some(limit) = filter.limit {
        q = q.bind(limit);
    }
    if let Some(offset) = filter.offset {
        q = q.bind(offset);
    }

    let rows = q.fetch_all(pool).await?;
    rows.into_iter().map(Finding::try_from).collect()
}

/// Aggregate finding counts for a scan.
pub async fn get_finding_stats(pool: &PgPool, scan_id: Uuid) -> Result<FindingStats> {
    let (total, critical, high, medium, low, info): (i64, i64, i64, i64, i64, i64) =
        sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE severity = 'critical'),
                COUNT(*) FILTER (WHERE severity = 'high'),
                COUNT(*) FILTER (WHERE severity = 'medium'),
                COUNT(*) FILTER (WHERE severity = 'low'),
                COUNT(*) FILTER (WHERE severity = 'info')
            FROM findings WHERE scan_id = $1
            "#,
        )
        .bind(scan_id)
        .fetch_one(pool)
        .await?;

    Ok(FindingStats {
        total,
        critical,
        high,
        medium,
        low,
        info,
    })
}

/// Delete all findings for a scan.
pub async fn delete_findings_by_scan(pool: &PgPool, scan_id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM findings WHERE scan_id = $1")
        .bind(scan_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

// ============================================================================
// Trait Implementations
// ============================================================================

#[async_trait]
impl ScanStore for PostgresStore {
    async fn create_scan(&self, scan: &Scan) -> Result<()> {
        create_scan(&self.pool, scan).await
    }

    async fn get_scan(&self, id: Uuid) -> Result<Scan> {
        get_scan(&self.pool, id).await
    }

    async fn update_scan(&self, scan: &Scan) -> Result<()> {
        update_scan(&self.pool, scan).await
    }

    async fn update_scan_status(&self, id: Uuid, status: ScanStatus) -> Result<()> {
        update_scan_status(&self.pool, id, status).await
    }

    async fn list_scans(&self, filter: &ScanFilter) -> Result<Vec<Scan>> {
        list_scans(&self.pool, filter).await
    }

    async fn delete_scan(&self, id: Uuid) -> Result<()> {
        delete_scan(&self.pool, id).await
    }

    async fn get_scan_by_workload_name(&self, name: &str) -> Result<Scan> {
        get_scan_by_workload_name(&self.pool, name).await
    }
}

#[async_trait]
impl FindingStore for PostgresStore {
    async fn create_findings(&self, findings: &[Finding]) -> Result<()> {
        create_findings(&self.pool, findings).await
    }

    async fn list_findings(&self, filter: &FindingFilter) -> Result<Vec<Finding>> {
        list_findings(&self.pool, filter).await
    }

    async fn get_finding_stats(&self, scan_id: Uuid) -> Result<FindingStats> {
        get_finding_stats(&self.pool, scan_id).await
    }

    async fn delete_findings_by_scan(&self, scan_id: Uuid) -> Result<u64> {
        delete_findings_by_scan(&self.pool, scan_id).await
    }
}

/// Check database health with a trivial round trip.
pub async fn health_check_db(pool: &PgPool) -> bool {
    sqlx::query_as::<_, (i32,)>("SELECT 1")
        .fetch_one(pool)
        .await
        .is_ok()
}

/// Count scans per status, for the metrics endpoint.
pub async fn count_scans_by_status(pool: &PgPool) -> Result<Vec<(String, i64)>> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM scans GROUP BY status")
            .fetch_all(pool)
            .await?;
    Ok(rows)
}
