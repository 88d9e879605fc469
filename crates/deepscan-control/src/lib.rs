// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deepscan Control - Scan Lifecycle Engine
//!
//! The control plane of the deepscan security-scanning platform. It
//! accepts scan requests over the scan protocol, persists them, runs
//! each as an isolated workload on the cluster, tracks workloads to
//! terminal states, ingests findings, and enforces retention.
//!
//! # Architecture
//!
//! ```text
//! request API ──┐
//!               ├─► Scan Store ◄──────┐
//! dispatcher ───┤        │            │
//!               │        ▼            │
//! sweeper ──────┤  Workload Manager   │
//!               │        │            │
//! cleaner ──────┘        ▼            │
//!                  Blob Service ──────┘
//! ```
//!
//! Three background loops cooperate through the store:
//!
//! | Loop | Responsibility |
//! |------|----------------|
//! | dispatcher | queued scans → workloads, scans → running |
//! | sweeper | workload status → completed/failed with diagnostics |
//! | cleaner | retention: teardown of expired terminal scans |
//!
//! The request API (QUIC + protobuf, see `deepscan-protocol`) exposes
//! `CreateScan`, `GetScan`, `ListScans`, `UpdateScan`, `GetFindings`,
//! `CreateFindings`, `CancelScan`, `DeleteScan`, `DeleteProjectScans`.
//!
//! # Scan Status State Machine
//!
//! ```text
//!            ┌────────┐
//!            │ QUEUED │──────────────┐
//!            └───┬────┘              │
//!       dispatch │                   │ cancel
//!                ▼                   ▼
//!            ┌─────────┐       ┌───────────┐
//!            │ RUNNING │──────►│ CANCELLED │
//!            └───┬─────┘ cancel└───────────┘
//!                │
//!        ┌───────┴────────┐
//!        ▼                ▼
//!  ┌───────────┐      ┌────────┐
//!  │ COMPLETED │      │ FAILED │
//!  └───────────┘      └────────┘
//! ```
//!
//! Terminal states never transition again; the cleaner only ever
//! selects terminal scans.

/// Configuration loaded from environment variables.
pub mod config;

/// Domain model: scans, findings, tenants.
pub mod domain;

/// Error types and RPC status classification.
pub mod error;

/// Request API handlers.
pub mod handlers;

/// Operational HTTP endpoints (/health, /ready, /metrics).
pub mod ops;

/// Persistence interfaces and backends.
pub mod persistence;

/// Embeddable runtime wiring workers and servers.
pub mod runtime;

/// Scan protocol QUIC server.
pub mod server;

/// Per-scan resource teardown shared by the cleaner and deletes.
pub mod teardown;

/// Background workers: dispatcher, sweeper, cleaner.
pub mod workers;

/// Workload manager client (cluster agent).
pub mod workload;

/// Blob storage service client.
pub mod blobstore;

pub use config::Config;
pub use error::ControlError;
