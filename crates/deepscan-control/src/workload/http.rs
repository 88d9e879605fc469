// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP workload manager client.
//!
//! Talks to the cluster agent's REST API. The agent owns the actual
//! orchestrator objects; this client only brokers specs and status.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use super::traits::{
    LOG_TAIL_BYTES, Result, Workload, WorkloadError, WorkloadManager, WorkloadSpec, WorkloadStatus,
};

/// Workload manager backed by the cluster agent's HTTP API.
pub struct HttpWorkloadManager {
    client: reqwest::Client,
    base_url: String,
}

impl HttpWorkloadManager {
    /// Create a new client for the agent at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn workload_url(&self, namespace: &str, name: &str) -> String {
        format!(
            "{}/api/v1/namespaces/{}/workloads/{}",
            self.base_url, namespace, name
        )
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(WorkloadError::NotFound(message));
        }
        Err(WorkloadError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl WorkloadManager for HttpWorkloadManager {
    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<Workload> {
        debug!(name = %spec.name, namespace = %spec.namespace, "Creating workload");

        let url = format!(
            "{}/api/v1/namespaces/{}/workloads",
            self.base_url, spec.namespace
        );
        let response = self.client.post(&url).json(spec).send().await?;
        let workload: Workload = Self::check(response).await?.json().await?;

        info!(name = %workload.name, namespace = %workload.namespace, "Workload created");
        Ok(workload)
    }

    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Workload> {
        let response = self
            .client
            .get(self.workload_url(namespace, name))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn delete_workload(&self, namespace: &str, name: &str) -> Result<()> {
        let url = format!(
            "{}?propagation=background",
            self.workload_url(namespace, name)
        );
        let response = self.client.delete(&url).send().await?;

        match Self::check(response).await {
            Ok(_) => {
                info!(namespace = namespace, name = name, "Workload deleted");
                Ok(())
            }
            Err(WorkloadError::NotFound(_)) => {
                // Already gone; deletion is idempotent.
                warn!(namespace = namespace, name = name, "Workload not found, already deleted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn get_workload_status(&self, namespace: &str, name: &str) -> Result<WorkloadStatus> {
        let url = format!("{}/status", self.workload_url(namespace, name));
        let response = self.client.get(&url).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn get_workload_logs(&self, namespace: &str, name: &str) -> Result<String> {
        let url = format!(
            "{}/logs?tail_bytes={}",
            self.workload_url(namespace, name),
            LOG_TAIL_BYTES
        );
        let response = self.client.get(&url).send().await?;
        Ok(Self::check(response).await?.text().await?)
    }

    async fn cancel_workload(&self, namespace: &str, name: &str) -> Result<()> {
        // Verify the workload exists before cancelling, mirroring the
        // orchestrator's own precondition.
        self.get_workload(namespace, name).await?;

        let url = format!(
            "{}/cancel?propagation=foreground",
            self.workload_url(namespace, name)
        );
        let response = self.client.post(&url).send().await?;
        Self::check(response).await?;

        info!(namespace = namespace, name = name, "Workload cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let mgr =
            HttpWorkloadManager::new("http://agent.local:8090/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            mgr.workload_url("deepscan", "scan-aaaaaaaa"),
            "http://agent.local:8090/api/v1/namespaces/deepscan/workloads/scan-aaaaaaaa"
        );
    }
}
