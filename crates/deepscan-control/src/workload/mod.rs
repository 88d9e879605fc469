// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workload manager client.
//!
//! The orchestration backend that actually schedules scanner containers
//! is an external system. This module defines the abstract client
//! surface, the HTTP implementation against the cluster agent, and a
//! mock used in tests.

pub mod http;
pub mod mock;
mod traits;

pub use http::HttpWorkloadManager;
pub use mock::MockWorkloadManager;
pub use traits::{
    Workload, WorkloadCondition, WorkloadError, WorkloadManager, WorkloadResources, WorkloadSpec,
    WorkloadSpecConfig, WorkloadStatus, workload_name,
};
