// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Finding entity and severity levels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ScanKind;

/// Severity of a reported finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            "info" => Some(Self::Info),
            _ => None,
        }
    }

    /// Numeric priority for ordering; higher is more severe.
    pub fn priority(&self) -> i32 {
        match self {
            Self::Critical => 5,
            Self::High => 4,
            Self::Medium => 3,
            Self::Low => 2,
            Self::Info => 1,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single issue reported by a scanner within a scan.
///
/// Findings are immutable once written; they are only ever deleted as a
/// cascade of scan deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: Uuid,
    pub scan_id: Uuid,

    // Scanner provenance
    pub scan_kind: ScanKind,
    pub tool_name: String,

    // Details
    pub title: String,
    pub description: String,
    pub severity: Severity,

    // Location in code
    pub file_path: String,
    pub start_line: i32,
    pub end_line: Option<i32>,
    pub start_column: Option<i32>,
    pub end_column: Option<i32>,
    pub code_snippet: Option<String>,

    // Vulnerability identifiers
    pub rule_id: Option<String>,
    pub cwe_id: Option<String>,
    pub cve_id: Option<String>,
    pub cvss_score: Option<f64>,
    pub cvss_vector: Option<String>,

    // Dependency information (SCA)
    pub package_name: Option<String>,
    pub package_version: Option<String>,
    pub fixed_version: Option<String>,

    // License information
    pub license_name: Option<String>,
    pub license_type: Option<String>,

    // Remediation
    pub remediation: Option<String>,
    pub references: Vec<String>,

    /// Original scanner output, kept verbatim for audits.
    pub raw_output: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Finding {
    /// Tool name, falling back to the scan kind's default scanner.
    pub fn effective_tool_name(&self) -> &str {
        if self.tool_name.is_empty() {
            self.scan_kind.default_tool()
        } else {
            &self.tool_name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical.priority() > Severity::High.priority());
        assert!(Severity::High.priority() > Severity::Medium.priority());
        assert!(Severity::Medium.priority() > Severity::Low.priority());
        assert!(Severity::Low.priority() > Severity::Info.priority());
    }

    #[test]
    fn test_severity_round_trip() {
        for severity in [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
            Severity::Info,
        ] {
            assert_eq!(Severity::parse(severity.as_str()), Some(severity));
        }
        assert_eq!(Severity::parse("none"), None);
    }

    #[test]
    fn test_effective_tool_name() {
        let mut finding = Finding {
            id: Uuid::new_v4(),
            scan_id: Uuid::new_v4(),
            scan_kind: ScanKind::Secrets,
            tool_name: String::new(),
            title: "hardcoded credential".to_string(),
            description: String::new(),
            severity: Severity::High,
            file_path: "src/config.rs".to_string(),
            start_line: 10,
            end_line: None,
            start_column: None,
            end_column: None,
            code_snippet: None,
            rule_id: None,
            cwe_id: None,
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
        };

        assert_eq!(finding.effective_tool_name(), "gitleaks");

        finding.tool_name = "trufflehog".to_string();
        assert_eq!(finding.effective_tool_name(), "trufflehog");
    }
}
