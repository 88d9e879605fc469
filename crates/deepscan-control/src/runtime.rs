// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for the control plane.
//!
//! Wires the store, external clients, background workers, and servers
//! together, and owns their shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::PgPool;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::blobstore::StorageServiceClient;
use crate::config::Config;
use crate::handlers::HandlerState;
use crate::ops::{self, OpsState};
use crate::persistence::PostgresStore;
use crate::server;
use crate::teardown::ScanTeardown;
use crate::workers::{
    Cleaner, CleanerConfig, Dispatcher, DispatcherConfig, Sweeper, SweeperConfig,
};
use crate::workload::{HttpWorkloadManager, WorkloadResources, WorkloadSpecConfig};

/// A started control plane.
pub struct ControlRuntime {
    worker_shutdowns: Vec<Arc<Notify>>,
    worker_tasks: Vec<JoinHandle<()>>,
    server_tasks: Vec<JoinHandle<()>>,
    pool: PgPool,
}

impl ControlRuntime {
    /// Start every component of the control plane.
    pub async fn start(config: Config, pool: PgPool) -> Result<Self> {
        let store = Arc::new(PostgresStore::new(pool.clone()));

        let workloads = Arc::new(HttpWorkloadManager::new(
            &config.workload.agent_endpoint,
            Duration::from_millis(config.workload.agent_timeout_ms),
        )?);

        let blobs = Arc::new(StorageServiceClient::new(
            config.storage.endpoint,
            &config.storage.server_name,
            config.storage.timeout_ms,
            config.storage.skip_cert_verification,
        )?);

        let teardown = Arc::new(ScanTeardown::new(
            store.clone(),
            workloads.clone(),
            blobs.clone(),
            config.workload.namespace.clone(),
        ));

        let spec_config = WorkloadSpecConfig {
            namespace: config.workload.namespace.clone(),
            service_account: config.workload.service_account.clone(),
            runner_image: config.workload.runner_image.clone(),
            runner_version: config.workload.runner_version.clone(),
            resources: WorkloadResources {
                requests_cpu: Some(config.workload.requests_cpu.clone()),
                requests_memory: Some(config.workload.requests_memory.clone()),
                limits_cpu: Some(config.workload.limits_cpu.clone()),
                limits_memory: Some(config.workload.limits_memory.clone()),
            },
            ttl_seconds_after_finished: Some(config.workload.ttl_seconds_after_finished),
            backoff_limit: Some(config.workload.backoff_limit),
            active_deadline_seconds: Some(config.workload.active_deadline_seconds),
            orchestrator_endpoint: config
                .workload
                .resolved_callback_endpoint(config.server.scan_api_port),
            storage_service_endpoint: config.workload.storage_service_endpoint.clone(),
        };

        let mut worker_shutdowns = Vec::new();
        let mut worker_tasks = Vec::new();
        let mut server_tasks = Vec::new();

        // Dispatcher
        let dispatcher = Dispatcher::new(
            store.clone(),
            workloads.clone(),
            blobs.clone(),
            spec_config,
            DispatcherConfig::from_env(),
        );
        worker_shutdowns.push(dispatcher.shutdown_handle());
        worker_tasks.push(tokio::spawn(async move { dispatcher.run().await }));

        // Sweeper
        let sweeper = Sweeper::new(
            store.clone(),
            workloads.clone(),
            config.workload.namespace.clone(),
            SweeperConfig::from_env(),
        );
        worker_shutdowns.push(sweeper.shutdown_handle());
        worker_tasks.push(tokio::spawn(async move { sweeper.run().await }));

        // Cleaner
        let cleaner = Cleaner::new(store.clone(), teardown.clone(), CleanerConfig::from_env());
        worker_shutdowns.push(cleaner.shutdown_handle());
        worker_tasks.push(tokio::spawn(async move { cleaner.run().await }));

        // Scan protocol server
        let handler_state = Arc::new(HandlerState::new(
            store,
            workloads,
            blobs,
            teardown,
            config.workload.namespace.clone(),
        ));
        let scan_api_addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.server.scan_api_port));
        server_tasks.push(tokio::spawn(async move {
            if let Err(e) = server::run_scan_server(scan_api_addr, handler_state).await {
                error!("Scan protocol server error: {}", e);
            }
        }));

        // Ops HTTP server
        let ops_state = Arc::new(OpsState::new(pool.clone()));
        let ops_port = config.server.ops_port;
        server_tasks.push(tokio::spawn(async move {
            if let Err(e) = ops::serve(ops_port, ops_state).await {
                error!("Ops HTTP server error: {}", e);
            }
        }));

        info!("Control plane runtime started");

        Ok(Self {
            worker_shutdowns,
            worker_tasks,
            server_tasks,
            pool,
        })
    }

    /// Gracefully stop workers and servers, then close the pool.
    pub async fn shutdown(self) {
        info!("Shutting down control plane");

        // Workers observe the signal and finish their current per-scan step.
        for shutdown in &self.worker_shutdowns {
            shutdown.notify_one();
        }
        for task in self.worker_tasks {
            if let Err(e) = tokio::time::timeout(Duration::from_secs(30), task).await {
                error!("Worker did not stop within the grace window: {}", e);
            }
        }

        // Servers hold no per-scan state and are simply aborted.
        for task in self.server_tasks {
            task.abort();
        }

        self.pool.close().await;
        info!("Shutdown complete");
    }
}
