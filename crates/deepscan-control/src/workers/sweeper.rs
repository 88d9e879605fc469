// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker that observes workloads and advances scans.
//!
//! The sweeper is the only component that reads workload status. It
//! moves scans toward terminal states and captures failure diagnostics
//! from workload conditions, falling back to a bounded log tail. It
//! never touches scans already in a terminal state.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::domain::{Scan, ScanStatus};
use crate::persistence::{ScanFilter, ScanStore};
use crate::workload::WorkloadManager;

/// Characters of log tail kept as a failure message.
const ERROR_LOG_TAIL_CHARS: usize = 500;

/// Fallback when a failed workload yields no condition and no logs.
const DEFAULT_FAILURE_MESSAGE: &str = "workload failed with unknown error";

/// Configuration for the sweeper worker.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often to check active scans.
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

impl SweeperConfig {
    /// Load configuration from environment variables.
    ///
    /// - `DEEPSCAN_SWEEP_INTERVAL_SECS`: seconds between ticks (default: 30)
    pub fn from_env() -> Self {
        let interval_secs = std::env::var("DEEPSCAN_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Self {
            interval: Duration::from_secs(interval_secs),
        }
    }
}

/// Background worker that tracks workloads to terminal states.
pub struct Sweeper {
    store: Arc<dyn ScanStore>,
    workloads: Arc<dyn WorkloadManager>,
    default_namespace: String,
    config: SweeperConfig,
    shutdown: Arc<Notify>,
}

impl Sweeper {
    /// Create a new sweeper worker.
    pub fn new(
        store: Arc<dyn ScanStore>,
        workloads: Arc<dyn WorkloadManager>,
        default_namespace: String,
        config: SweeperConfig,
    ) -> Self {
        Self {
            store,
            workloads,
            default_namespace,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the sweeper loop until shutdown is signalled.
    pub async fn run(&self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Sweeper worker started"
        );

        self.sweep().await;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Sweeper worker received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.interval) => {
                    self.sweep().await;
                }
            }
        }

        info!("Sweeper worker stopped");
    }

    /// Run a single sweep cycle over all active scans.
    pub async fn sweep(&self) {
        debug!("Starting sweep cycle");

        let mut active = Vec::new();
        for status in [ScanStatus::Queued, ScanStatus::Running] {
            match self.store.list_scans(&ScanFilter::with_status(status)).await {
                Ok(scans) => active.extend(scans),
                Err(e) => {
                    error!(status = %status, error = %e, "Failed to list active scans");
                    return;
                }
            }
        }

        debug!(count = active.len(), "Found active scans to check");

        for scan in &active {
            self.process_scan(scan).await;
        }

        debug!("Sweep cycle completed");
    }

    /// Check one scan's workload and apply the status mapping.
    async fn process_scan(&self, scan: &Scan) {
        let Some(workload_name) = scan.workload_name.as_deref().filter(|n| !n.is_empty()) else {
            debug!(scan_id = %scan.id, "Scan has no workload name, skipping");
            return;
        };

        let namespace = scan
            .workload_namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(&self.default_namespace);

        let status = match self
            .workloads
            .get_workload_status(namespace, workload_name)
            .await
        {
            Ok(status) => status,
            Err(e) => {
                warn!(scan_id = %scan.id, workload = workload_name, error = %e, "Failed to get workload status");
                return;
            }
        };

        debug!(
            scan_id = %scan.id,
            active = status.active,
            succeeded = status.succeeded,
            failed = status.failed,
            "Observed workload status"
        );

        let (new_status, error_message) = if status.succeeded > 0 {
            info!(scan_id = %scan.id, workload = workload_name, "Workload completed successfully");
            (ScanStatus::Completed, None)
        } else if status.failed > 0 {
            let message = match status.failure_message() {
                Some(message) => message,
                None => self.failure_from_logs(namespace, workload_name).await,
            };
            warn!(scan_id = %scan.id, workload = workload_name, error = %message, "Workload failed");
            (ScanStatus::Failed, Some(message))
        } else if status.active > 0 {
            if scan.status == ScanStatus::Running {
                // Already tracked as running, nothing to write.
                return;
            }
            info!(scan_id = %scan.id, workload = workload_name, "Workload is now running");
            (ScanStatus::Running, None)
        } else {
            // No pods at all: the workload is still pending.
            debug!(scan_id = %scan.id, "Workload has no active/succeeded/failed pods, status unchanged");
            return;
        };

        let mut updated = scan.clone();
        updated.status = new_status;
        if let Some(message) = error_message {
            updated.error_message = Some(message);
        }
        if matches!(new_status, ScanStatus::Completed | ScanStatus::Failed) {
            updated.completed_at = Some(Utc::now());
        }

        if let Err(e) = self.store.update_scan(&updated).await {
            error!(scan_id = %scan.id, error = %e, "Failed to update scan status");
            return;
        }

        info!(scan_id = %scan.id, new_status = %new_status, "Updated scan status");
    }

    /// Derive a failure message from the workload's log tail.
    ///
    /// Only ever called on failure; the fetch itself reads a bounded
    /// tail so a chatty scanner cannot blow up memory.
    async fn failure_from_logs(&self, namespace: &str, workload_name: &str) -> String {
        match self.workloads.get_workload_logs(namespace, workload_name).await {
            Ok(logs) if !logs.is_empty() => {
                let chars: Vec<char> = logs.chars().collect();
                if chars.len() > ERROR_LOG_TAIL_CHARS {
                    let tail: String = chars[chars.len() - ERROR_LOG_TAIL_CHARS..]
                        .iter()
                        .collect();
                    format!("...{}", tail)
                } else {
                    logs
                }
            }
            _ => DEFAULT_FAILURE_MESSAGE.to_string(),
        }
    }
}
