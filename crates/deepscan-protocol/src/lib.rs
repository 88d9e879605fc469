// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deepscan Protocol - QUIC + Protobuf communication layer
//!
//! This crate provides the wire protocol for communication between:
//! - External callers and the control plane (scan protocol)
//! - The control plane and the blob storage service (storage protocol)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    deepscan-protocol                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RPC Layer: Request/Response (one stream per call)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Serialization: Protobuf (prost)                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: QUIC (quinn)                                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocols
//!
//! ## Scan Protocol (`scan_proto`)
//!
//! The request API of the control plane: create/get/list/cancel/update
//! scans, report and fetch findings, delete scans. Error responses carry
//! standard RPC status names (`INVALID_ARGUMENT`, `NOT_FOUND`,
//! `FAILED_PRECONDITION`, `INTERNAL`).
//!
//! ## Storage Protocol (`storage_proto`)
//!
//! The blob service surface used by the control plane: presigned
//! upload/download URLs, batched artifact deletion, and the multipart
//! upload subset.
//!
//! # Usage
//!
//! ```ignore
//! use deepscan_protocol::{ProtocolClient, scan_proto};
//!
//! let client = ProtocolClient::localhost()?;
//! client.connect().await?;
//!
//! let request = scan_proto::RpcRequest {
//!     request: Some(scan_proto::rpc_request::Request::GetScan(
//!         scan_proto::GetScanRequest { id: scan_id },
//!     )),
//! };
//!
//! let response: scan_proto::RpcResponse = client.request(&request).await?;
//! ```

pub mod client;
pub mod frame;
pub mod server;

// Re-export generated protobuf types for the scan protocol (request API)
pub mod scan_proto {
    include!(concat!(env!("OUT_DIR"), "/deepscan.scan.rs"));
}

// Re-export generated protobuf types for the storage protocol (blob service)
pub mod storage_proto {
    include!(concat!(env!("OUT_DIR"), "/deepscan.storage.rs"));
}

// Re-export main types
pub use client::{ClientError, ProtocolClient, ProtocolClientConfig};
pub use frame::{Frame, FrameError, FramedStream, MessageType};
pub use server::{ConnectionHandler, ProtocolServer, ProtocolServerConfig, ServerError, StreamHandler};
