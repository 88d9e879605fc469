// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the control plane.
//!
//! Everything comes from environment variables with explicit defaults;
//! only the database password is required. Worker intervals and the
//! retention policy load separately in their own modules.

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// A value could not be parsed.
    #[error("Invalid value for {0}")]
    InvalidValue(&'static str),
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue(key)),
        Err(_) => Ok(default),
    }
}

/// Server ports.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port of the scan protocol (QUIC) server.
    pub scan_api_port: u16,
    /// Port of the operational HTTP server (/health, /ready, /metrics).
    pub ops_port: u16,
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            scan_api_port: env_parse_or("DEEPSCAN_SCAN_API_PORT", 9440)?,
            ops_port: env_parse_or("DEEPSCAN_OPS_PORT", 8081)?,
        })
    }
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub sslmode: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl DatabaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let password = std::env::var("DEEPSCAN_DB_PASSWORD")
            .map_err(|_| ConfigError::MissingEnvVar("DEEPSCAN_DB_PASSWORD"))?;

        Ok(Self {
            host: env_or("DEEPSCAN_DB_HOST", "localhost"),
            port: env_parse_or("DEEPSCAN_DB_PORT", 5432)?,
            user: env_or("DEEPSCAN_DB_USER", "deepscan"),
            password,
            name: env_or("DEEPSCAN_DB_NAME", "deepscan"),
            sslmode: env_or("DEEPSCAN_DB_SSLMODE", "prefer"),
            max_connections: env_parse_or("DEEPSCAN_DB_MAX_CONNS", 25)?,
            min_connections: env_parse_or("DEEPSCAN_DB_MIN_CONNS", 5)?,
        })
    }

    /// PostgreSQL connection URL.
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.name, self.sslmode
        )
    }
}

/// Blob storage service connection settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Socket address of the storage service.
    pub endpoint: std::net::SocketAddr,
    /// TLS server name for the storage connection.
    pub server_name: String,
    /// Connect timeout in milliseconds.
    pub timeout_ms: u64,
    /// Skip certificate verification (development only).
    pub skip_cert_verification: bool,
}

impl StorageConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let endpoint = env_or("DEEPSCAN_STORAGE_ENDPOINT", "127.0.0.1:9441")
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DEEPSCAN_STORAGE_ENDPOINT"))?;

        Ok(Self {
            endpoint,
            server_name: env_or("DEEPSCAN_STORAGE_SERVER_NAME", "localhost"),
            timeout_ms: env_parse_or("DEEPSCAN_STORAGE_TIMEOUT_MS", 30_000)?,
            skip_cert_verification: std::env::var("DEEPSCAN_STORAGE_SKIP_CERT_VERIFICATION")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }
}

/// Workload orchestration settings.
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// Namespace scans run in.
    pub namespace: String,
    /// Base URL of the cluster agent's REST API.
    pub agent_endpoint: String,
    /// Request timeout for the agent, in milliseconds.
    pub agent_timeout_ms: u64,
    /// Service account for runner pods.
    pub service_account: String,
    /// Runner image and version.
    pub runner_image: String,
    pub runner_version: String,
    pub requests_cpu: String,
    pub requests_memory: String,
    pub limits_cpu: String,
    pub limits_memory: String,
    pub ttl_seconds_after_finished: i32,
    pub backoff_limit: i32,
    pub active_deadline_seconds: i64,
    /// Endpoint runners use to call back into this control plane.
    /// Empty means "derive from the namespace and scan API port".
    pub callback_endpoint: String,
    /// Endpoint runners use to reach the storage service.
    pub storage_service_endpoint: String,
}

impl WorkloadConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            namespace: env_or("DEEPSCAN_WORKLOAD_NAMESPACE", "deepscan"),
            agent_endpoint: env_or("DEEPSCAN_AGENT_ENDPOINT", "http://127.0.0.1:8090"),
            agent_timeout_ms: env_parse_or("DEEPSCAN_AGENT_TIMEOUT_MS", 30_000)?,
            service_account: env_or("DEEPSCAN_RUNNER_SERVICE_ACCOUNT", "deepscan-runner"),
            runner_image: env_or("DEEPSCAN_RUNNER_IMAGE", "deepscan/runner"),
            runner_version: env_or("DEEPSCAN_RUNNER_VERSION", "latest"),
            requests_cpu: env_or("DEEPSCAN_RUNNER_REQUESTS_CPU", "500m"),
            requests_memory: env_or("DEEPSCAN_RUNNER_REQUESTS_MEMORY", "512Mi"),
            limits_cpu: env_or("DEEPSCAN_RUNNER_LIMITS_CPU", "2000m"),
            limits_memory: env_or("DEEPSCAN_RUNNER_LIMITS_MEMORY", "2Gi"),
            ttl_seconds_after_finished: env_parse_or("DEEPSCAN_WORKLOAD_TTL_SECONDS", 3600)?,
            backoff_limit: env_parse_or("DEEPSCAN_WORKLOAD_BACKOFF_LIMIT", 1)?,
            active_deadline_seconds: env_parse_or("DEEPSCAN_WORKLOAD_DEADLINE_SECONDS", 3600)?,
            callback_endpoint: env_or("DEEPSCAN_CALLBACK_ENDPOINT", ""),
            storage_service_endpoint: env_or(
                "DEEPSCAN_STORAGE_CALLBACK_ENDPOINT",
                "deepscan-storage.deepscan.svc.cluster.local:9441",
            ),
        })
    }

    /// Callback endpoint handed to runner workloads.
    pub fn resolved_callback_endpoint(&self, scan_api_port: u16) -> String {
        if self.callback_endpoint.is_empty() {
            format!(
                "deepscan-control.{}.svc.cluster.local:{}",
                self.namespace, scan_api_port
            )
        } else {
            self.callback_endpoint.clone()
        }
    }
}

/// Full control plane configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub workload: WorkloadConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            storage: StorageConfig::from_env()?,
            workload: WorkloadConfig::from_env()?,
        })
    }
}
