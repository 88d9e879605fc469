// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workload manager trait definitions.
//!
//! Defines the abstract interface to the container-orchestration backend
//! and the workload specification contract supplied to it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::Scan;

/// Errors from workload manager operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkloadError {
    /// Workload was not found.
    #[error("workload not found: {0}")]
    NotFound(String),

    /// The orchestration backend rejected the request.
    #[error("workload API error (status {status}): {message}")]
    Api {
        /// HTTP status returned by the agent.
        status: u16,
        /// Error body, if any.
        message: String,
    },

    /// Transport-level failure reaching the backend.
    #[error("workload transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type for workload operations.
pub type Result<T> = std::result::Result<T, WorkloadError>;

/// Stable prefix for workload names.
const WORKLOAD_NAME_PREFIX: &str = "scan-";

/// Bytes of log tail fetched for failure diagnostics.
pub const LOG_TAIL_BYTES: usize = 2048;

/// Workload name for a scan: stable prefix plus the first 8 characters
/// of the scan id. Must stay DNS-1123 compliant.
pub fn workload_name(scan_id: Uuid) -> String {
    let id = scan_id.to_string();
    format!("{}{}", WORKLOAD_NAME_PREFIX, &id[..8])
}

/// Resource requests and limits for a workload, in orchestrator quantity
/// notation (e.g. "500m", "2Gi").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkloadResources {
    pub requests_cpu: Option<String>,
    pub requests_memory: Option<String>,
    pub limits_cpu: Option<String>,
    pub limits_memory: Option<String>,
}

/// Static configuration applied to every workload spec.
#[derive(Debug, Clone)]
pub struct WorkloadSpecConfig {
    /// Namespace workloads are created in.
    pub namespace: String,
    /// Service account the runner pod uses; empty for the namespace default.
    pub service_account: String,
    /// Runner container image (without version).
    pub runner_image: String,
    /// Runner image version tag.
    pub runner_version: String,
    /// Resource requests/limits for the runner container.
    pub resources: WorkloadResources,
    /// Seconds a finished workload is retained by the orchestrator.
    pub ttl_seconds_after_finished: Option<i32>,
    /// Retry budget for the workload.
    pub backoff_limit: Option<i32>,
    /// Hard wall-clock deadline for the workload.
    pub active_deadline_seconds: Option<i64>,
    /// Endpoint the runner reports progress and findings back to.
    pub orchestrator_endpoint: String,
    /// Endpoint of the blob storage service.
    pub storage_service_endpoint: String,
}

/// Specification of one scan workload, handed to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub name: String,
    pub namespace: String,
    /// Identity labels (app tag, truncated scan id, organization, project).
    pub labels: std::collections::BTreeMap<String, String>,
    /// Container image reference, `image:version`.
    pub image: String,
    /// "IfNotPresent"
    pub image_pull_policy: String,
    /// "Never"
    pub restart_policy: String,
    /// Environment for the runner container, in insertion order.
    pub env: Vec<(String, String)>,
    pub service_account: Option<String>,
    pub resources: WorkloadResources,
    pub ttl_seconds_after_finished: Option<i32>,
    pub backoff_limit: Option<i32>,
    pub active_deadline_seconds: Option<i64>,
}

impl WorkloadSpec {
    /// Build the workload specification for a scan.
    ///
    /// `download_url` is the presigned source download URL obtained by the
    /// dispatcher; it is only present for artifact-based scans.
    pub fn for_scan(scan: &Scan, download_url: Option<&str>, config: &WorkloadSpecConfig) -> Self {
        let scan_kinds = scan
            .scan_kinds
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let mut env = vec![
            ("SCAN_ID".to_string(), scan.id.to_string()),
            (
                "ORGANIZATION_ID".to_string(),
                scan.organization_id.to_string(),
            ),
            ("PROJECT_ID".to_string(), scan.project_id.to_string()),
            ("SCAN_TYPES".to_string(), scan_kinds),
            (
                "SOURCE_ARTIFACT_ID".to_string(),
                scan.source_archive_id.clone().unwrap_or_default(),
            ),
            (
                "REPOSITORY_URL".to_string(),
                scan.repository_url.clone().unwrap_or_default(),
            ),
            (
                "BRANCH".to_string(),
                scan.branch.clone().unwrap_or_default(),
            ),
            (
                "ORCHESTRATOR_ENDPOINT".to_string(),
                config.orchestrator_endpoint.clone(),
            ),
            (
                "STORAGE_SERVICE_ENDPOINT".to_string(),
                config.storage_service_endpoint.clone(),
            ),
        ];

        if let Some(url) = download_url {
            env.push(("SOURCE_DOWNLOAD_URL".to_string(), url.to_string()));
        }

        if let Some(commit) = scan.commit_sha.as_deref()
            && !commit.is_empty()
        {
            env.push(("COMMIT_SHA".to_string(), commit.to_string()));
        }

        let mut labels = std::collections::BTreeMap::new();
        labels.insert("app".to_string(), "deepscan-runner".to_string());
        labels.insert("scan-id".to_string(), scan.id.to_string()[..8].to_string());
        labels.insert(
            "organization-id".to_string(),
            scan.organization_id.to_string(),
        );
        labels.insert("project-id".to_string(), scan.project_id.to_string());

        Self {
            name: workload_name(scan.id),
            namespace: config.namespace.clone(),
            labels,
            image: format!("{}:{}", config.runner_image, config.runner_version),
            image_pull_policy: "IfNotPresent".to_string(),
            restart_policy: "Never".to_string(),
            env,
            service_account: if config.service_account.is_empty() {
                None
            } else {
                Some(config.service_account.clone())
            },
            resources: config.resources.clone(),
            ttl_seconds_after_finished: config.ttl_seconds_after_finished,
            backoff_limit: config.backoff_limit,
            active_deadline_seconds: config.active_deadline_seconds,
        }
    }

    /// Look up an environment variable by name.
    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A created workload, as reported by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workload {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: std::collections::BTreeMap<String, String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A condition in the workload status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadCondition {
    /// Condition type, e.g. "Failed" or "Complete".
    #[serde(rename = "type")]
    pub condition_type: String,
    /// "True", "False", or "Unknown".
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

/// Point-in-time status of a workload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkloadStatus {
    pub name: String,
    pub namespace: String,
    /// Number of actively running pods.
    pub active: i32,
    /// Number of pods that finished successfully.
    pub succeeded: i32,
    /// Number of pods that failed.
    pub failed: i32,
    pub start_time: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub conditions: Vec<WorkloadCondition>,
    #[serde(default)]
    pub pod_name: String,
}

impl WorkloadStatus {
    /// Message of the first `Failed` condition with status "True";
    /// falls back to its reason when the message is empty.
    pub fn failure_message(&self) -> Option<String> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == "Failed" && c.status == "True")
            .map(|c| {
                if c.message.is_empty() {
                    c.reason.clone()
                } else {
                    c.message.clone()
                }
            })
    }
}

/// Client surface of the container-orchestration backend.
///
/// Implementations are pure transport. They do not touch the scan store;
/// status interpretation belongs to the sweeper and handlers.
#[async_trait]
pub trait WorkloadManager: Send + Sync {
    /// Create a workload. Returns the created workload's identity.
    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<Workload>;

    /// Fetch a workload by namespace and name.
    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Workload>;

    /// Delete a workload with background propagation.
    ///
    /// Deleting a workload that is already gone is a success.
    async fn delete_workload(&self, namespace: &str, name: &str) -> Result<()>;

    /// Fetch the current status of a workload.
    async fn get_workload_status(&self, namespace: &str, name: &str) -> Result<WorkloadStatus>;

    /// Fetch a bounded tail of the workload's pod logs.
    async fn get_workload_logs(&self, namespace: &str, name: &str) -> Result<String>;

    /// Cancel a running workload by deleting its pods with foreground
    /// propagation.
    async fn cancel_workload(&self, namespace: &str, name: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ScanKind, ScanStatus};

    fn test_scan() -> Scan {
        let now = Utc::now();
        Scan {
            id: "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee".parse().unwrap(),
            organization_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            user_id: None,
            status: ScanStatus::Queued,
            scan_kinds: vec![ScanKind::Sast, ScanKind::Sca],
            repository_url: Some("https://x/y".to_string()),
            branch: Some("main".to_string()),
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
            created_at: now,
            updated_at: now,
        }
    }

    fn test_config() -> WorkloadSpecConfig {
        WorkloadSpecConfig {
            namespace: "deepscan".to_string(),
            service_account: "deepscan-runner".to_string(),
            runner_image: "deepscan/runner".to_string(),
            runner_version: "1.4.0".to_string(),
            resources: WorkloadResources::default(),
            ttl_seconds_after_finished: Some(3600),
            backoff_limit: Some(1),
            active_deadline_seconds: Some(3600),
            orchestrator_endpoint: "deepscan-control.deepscan.svc:9440".to_string(),
            storage_service_endpoint: "deepscan-storage.deepscan.svc:9441".to_string(),
        }
    }

    #[test]
    fn test_workload_name_format() {
        let id: Uuid = "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee".parse().unwrap();
        let name = workload_name(id);
        assert_eq!(name, "scan-aaaaaaaa");
        assert_eq!(name.len(), 13);
        assert!(name.starts_with("scan-"));
    }

    #[test]
    fn test_spec_env_vars() {
        let scan = test_scan();
        let spec = WorkloadSpec::for_scan(&scan, None, &test_config());

        assert_eq!(spec.env_var("SCAN_ID"), Some(scan.id.to_string().as_str()));
        assert_eq!(spec.env_var("SCAN_TYPES"), Some("sast,sca"));
        assert_eq!(spec.env_var("REPOSITORY_URL"), Some("https://x/y"));
        assert_eq!(spec.env_var("BRANCH"), Some("main"));
        assert_eq!(spec.env_var("SOURCE_ARTIFACT_ID"), Some(""));
        // Empty commit must not be exported
        assert_eq!(spec.env_var("COMMIT_SHA"), None);
        // No artifact, no presigned URL
        assert_eq!(spec.env_var("SOURCE_DOWNLOAD_URL"), None);
    }

    #[test]
    fn test_spec_with_download_url() {
        let mut scan = test_scan();
        scan.source_archive_id = Some("art-123".to_string());
        scan.repository_url = None;

        let spec = WorkloadSpec::for_scan(&scan, Some("https://signed"), &test_config());

        assert_eq!(spec.env_var("SOURCE_ARTIFACT_ID"), Some("art-123"));
        assert_eq!(spec.env_var("SOURCE_DOWNLOAD_URL"), Some("https://signed"));
    }

    #[test]
    fn test_spec_commit_exported_when_set() {
        let mut scan = test_scan();
        scan.commit_sha = Some("deadbeef".to_string());

        let spec = WorkloadSpec::for_scan(&scan, None, &test_config());
        assert_eq!(spec.env_var("COMMIT_SHA"), Some("deadbeef"));
    }

    #[test]
    fn test_spec_identity() {
        let scan = test_scan();
        let spec = WorkloadSpec::for_scan(&scan, None, &test_config());

        assert_eq!(spec.name, "scan-aaaaaaaa");
        assert_eq!(spec.namespace, "deepscan");
        assert_eq!(spec.image, "deepscan/runner:1.4.0");
        assert_eq!(spec.image_pull_policy, "IfNotPresent");
        assert_eq!(spec.restart_policy, "Never");
        assert_eq!(spec.labels.get("app").map(String::as_str), Some("deepscan-runner"));
        assert_eq!(
            spec.labels.get("scan-id").map(String::as_str),
            Some("aaaaaaaa")
        );
        assert_eq!(spec.service_account.as_deref(), Some("deepscan-runner"));
    }

    #[test]
    fn test_failure_message_prefers_message_over_reason() {
        let status = WorkloadStatus {
            failed: 1,
            conditions: vec![WorkloadCondition {
                condition_type: "Failed".to_string(),
                status: "True".to_string(),
                reason: "BackoffLimitExceeded".to_string(),
                message: "OOMKilled".to_string(),
            }],
            ..Default::default()
        };
        assert_eq!(status.failure_message().as_deref(), Some("OOMKilled"));
    }

    #[test]
    fn test_failure_message_falls_back_to_reason() {
        let status = WorkloadStatus {
            failed: 1,
            conditions: vec![WorkloadCondition {
                condition_type: "Failed".to_string(),
                status: "True".to_string(),
                reason: "DeadlineExceeded".to_string(),
                message: String::new(),
            }],
            ..Default::default()
        };
        assert_eq!(
            status.failure_message().as_deref(),
            Some("DeadlineExceeded")
        );
    }

    #[test]
    fn test_failure_message_ignores_other_conditions() {
        let status = WorkloadStatus {
            conditions: vec![WorkloadCondition {
                condition_type: "Complete".to_string(),
                status: "True".to_string(),
                reason: String::new(),
                message: String::new(),
            }],
            ..Default::default()
        };
        assert_eq!(status.failure_message(), None);
    }
}
