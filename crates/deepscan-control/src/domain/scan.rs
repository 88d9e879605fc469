// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scan, project, and organization entities.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current state of a scan.
///
/// Transitions form a DAG: queued → running → {completed, failed};
/// queued → cancelled; running → cancelled. Terminal states are
/// completed, failed, and cancelled; nothing transitions out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ScanStatus {
    /// Database/string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse from the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// True for completed, failed, and cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the transition `self` → `next` is legal.
    pub fn can_transition_to(&self, next: ScanStatus) -> bool {
        match self {
            Self::Queued => matches!(
                next,
                Self::Running | Self::Completed | Self::Failed | Self::Cancelled
            ),
            Self::Running => matches!(next, Self::Completed | Self::Failed | Self::Cancelled),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }

    /// The terminal statuses, in the order the cleaner scans them.
    pub fn terminal() -> [ScanStatus; 3] {
        [Self::Completed, Self::Failed, Self::Cancelled]
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of security analysis a workload performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanKind {
    /// Static application security testing
    Sast,
    /// Software composition analysis
    Sca,
    /// Secret detection
    Secrets,
    /// License compliance
    License,
}

impl ScanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sast => "sast",
            Self::Sca => "sca",
            Self::Secrets => "secrets",
            Self::License => "license",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sast" => Some(Self::Sast),
            "sca" => Some(Self::Sca),
            "secrets" => Some(Self::Secrets),
            "license" => Some(Self::License),
            _ => None,
        }
    }

    /// Default scanner tool for findings that arrive without a tool name.
    pub fn default_tool(&self) -> &'static str {
        match self {
            Self::Sast => "semgrep",
            Self::Sca => "trivy",
            Self::Secrets => "gitleaks",
            Self::License => "trivy",
        }
    }
}

impl std::fmt::Display for ScanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A security scan request and its state.
///
/// The central entity of the control plane. Created queued by the request
/// API, advanced by the dispatcher and sweeper, cancelled by the request
/// API, and removed by the cleaner or an explicit delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub project_id: Uuid,
    pub user_id: Option<Uuid>,
    pub status: ScanStatus,
    /// Requested analyses; never empty.
    pub scan_kinds: Vec<ScanKind>,

    // Source snapshot
    pub repository_url: Option<String>,
    pub branch: Option<String>,
    pub commit_sha: Option<String>,
    /// Opaque handle issued by the blob service for uploaded archives.
    pub source_archive_id: Option<String>,

    // Workload execution; set once dispatched.
    pub workload_name: Option<String>,
    pub workload_namespace: Option<String>,

    // Results
    pub findings_count: i32,
    pub critical_count: i32,
    pub high_count: i32,
    pub medium_count: i32,
    pub low_count: i32,
    pub error_message: Option<String>,

    // Timing
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Scan {
    /// True if the scan reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock duration of the scan; zero if it never started.
    pub fn duration(&self) -> Duration {
        match self.started_at {
            Some(started) => self.completed_at.unwrap_or_else(Utc::now) - started,
            None => Duration::zero(),
        }
    }
}

/// A repository registration within an organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub repository_url: Option<String>,
    pub default_branch: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A tenant. Every entity is owned by exactly one organization and all
/// queries are scoped by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
