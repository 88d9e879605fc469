// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock workload manager for testing.
//!
//! Simulates the orchestration backend without a cluster. Workload
//! statuses are scripted by tests; calls are recorded so loop and
//! teardown behavior can be asserted.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::persistence::memory::CallJournal;

use super::traits::{
    Result, Workload, WorkloadError, WorkloadManager, WorkloadSpec, WorkloadStatus,
};

/// Mock workload manager.
#[derive(Default)]
pub struct MockWorkloadManager {
    workloads: Mutex<HashMap<String, Workload>>,
    statuses: Mutex<HashMap<String, WorkloadStatus>>,
    logs: Mutex<HashMap<String, String>>,
    created: Mutex<Vec<WorkloadSpec>>,
    deleted: Mutex<Vec<String>>,
    cancelled: Mutex<Vec<String>>,
    journal: Mutex<Option<CallJournal>>,
    /// If true, create_workload fails.
    pub fail_create: Mutex<bool>,
    /// If true, cancel_workload fails.
    pub fail_cancel: Mutex<bool>,
}

impl MockWorkloadManager {
    /// Create a new mock workload manager.
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

    /// Make subsequent create_workload calls fail.
    pub fn fail_creates(&self) {
        *self.fail_create.lock().unwrap() = true;
    }

    /// Make subsequent cancel_workload calls fail.
    pub fn fail_cancels(&self) {
        *self.fail_cancel.lock().unwrap() = true;
    }

    /// Script the status returned for a workload name.
    pub fn set_status(&self, name: &str, status: WorkloadStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(name.to_string(), status);
    }

    /// Script the log tail returned for a workload name.
    pub fn set_logs(&self, name: &str, logs: &str) {
        self.logs
            .lock()
            .unwrap()
            .insert(name.to_string(), logs.to_string());
    }

    /// Specs passed to create_workload, in order.
    pub fn created_specs(&self) -> Vec<WorkloadSpec> {
        self.created.lock().unwrap().clone()
    }

    /// Names passed to delete_workload, in order.
    pub fn deleted_names(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    /// Names passed to cancel_workload, in order.
    pub fn cancelled_names(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkloadManager for MockWorkloadManager {
    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<Workload> {
        if *self.fail_create.lock().unwrap() {
            return Err(WorkloadError::Api {
                status: 500,
                message: "mock create failure".to_string(),
            });
        }

        let workload = Workload {
            name: spec.name.clone(),
            namespace: spec.namespace.clone(),
            labels: spec.labels.clone(),
            created_at: Some(Utc::now()),
        };

        self.workloads
            .lock()
            .unwrap()
            .insert(spec.name.clone(), workload.clone());
        self.created.lock().unwrap().push(spec.clone());
        self.record(format!("workload.create {}", spec.name));

        Ok(workload)
    }

    async fn get_workload(&self, _namespace: &str, name: &str) -> Result<Workload> {
        self.workloads
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| WorkloadError::NotFound(name.to_string()))
    }

    async fn delete_workload(&self, _namespace: &str, name: &str) -> Result<()> {
        // Not-found is success, like the real client.
        self.workloads.lock().unwrap().remove(name);
        self.deleted.lock().unwrap().push(name.to_string());
        self.record(format!("workload.delete {}", name));
        Ok(())
    }

    async fn get_workload_status(&self, namespace: &str, name: &str) -> Result<WorkloadStatus> {
        match self.statuses.lock().unwrap().get(name) {
            Some(status) => Ok(status.clone()),
            None => Ok(WorkloadStatus {
                name: name.to_string(),
                namespace: namespace.to_string(),
                ..Default::default()
            }),
        }
    }

    async fn get_workload_logs(&self, _namespace: &str, name: &str) -> Result<String> {
        self.logs
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| WorkloadError::NotFound(name.to_string()))
    }

    async fn cancel_workload(&self, _namespace: &str, name: &str) -> Result<()> {
        if *self.fail_cancel.lock().unwrap() {
            return Err(WorkloadError::Api {
                status: 500,
                message: "mock cancel failure".to_string(),
            });
        }
        self.cancelled.lock().unwrap().push(name.to_string());
        self.record(format!("workload.cancel {}", name));
        Ok(())
    }
}
