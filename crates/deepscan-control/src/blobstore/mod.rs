// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Blob storage service client.
//!
//! The blob service is a separate microservice that owns object storage
//! and issues presigned URLs. The control plane never moves artifact
//! bytes itself; it brokers artifact ids and signed URLs.

pub mod client;
pub mod mock;

pub use client::StorageServiceClient;
pub use mock::MockBlobStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors from blob service operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Artifact was not found.
    #[error("artifact not found: {0}")]
    NotFound(String),

    /// The blob service returned an error response.
    #[error("storage service error ({code}): {message}")]
    Service {
        /// RPC status name returned by the service.
        code: String,
        /// Error message.
        message: String,
    },

    /// Transport-level failure reaching the blob service.
    #[error("storage transport error: {0}")]
    Transport(String),
}

/// Result type for blob service operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Kind of artifact held by the blob service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactType {
    /// Source code archive
    Source,
    /// Scan results
    Results,
    /// Workload logs
    Logs,
}

/// Upload method for a new artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// Single presigned PUT
    Simple,
    /// Multipart upload session
    Multipart,
}

/// Storage backend protocol behind a presigned URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    S3,
    S3Express,
    Azure,
    Gcs,
}

/// A freshly created artifact with its presigned upload URL.
#[derive(Debug, Clone)]
pub struct CreatedArtifact {
    pub artifact_id: String,
    pub signed_url: String,
    pub expiration: DateTime<Utc>,
    pub protocol: Protocol,
}

/// Download handle for an existing artifact.
#[derive(Debug, Clone)]
pub struct ArtifactDownload {
    pub artifact_id: String,
    pub signed_url: String,
    pub expiration: DateTime<Utc>,
    pub protocol: Protocol,
}

/// Presigned URL for one multipart upload part.
#[derive(Debug, Clone)]
pub struct UploadPart {
    pub part_number: i32,
    pub url: String,
    pub expiration: DateTime<Utc>,
}

/// A completed multipart part, as reported by the uploader.
#[derive(Debug, Clone)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}

/// Result of completing a multipart upload.
#[derive(Debug, Clone)]
pub struct CompletedUpload {
    pub url: String,
    pub expiration: DateTime<Utc>,
}

/// Client surface of the blob storage service.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create an artifact and return a presigned upload URL.
    async fn create_artifact(
        &self,
        filename: &str,
        artifact_type: ArtifactType,
        upload_mode: UploadMode,
    ) -> Result<CreatedArtifact>;

    /// Get a presigned download URL for an artifact.
    async fn get_artifact(&self, artifact_id: &str) -> Result<ArtifactDownload>;

    /// Delete artifacts in a single batched call.
    async fn delete_artifacts(&self, artifact_ids: &[String]) -> Result<u32>;

    /// Start a multipart upload session.
    async fn initiate_multipart_upload(&self, artifact_id: &str) -> Result<String>;

    /// Get presigned URLs for a range of multipart parts.
    async fn get_multipart_upload_parts(
        &self,
        artifact_id: &str,
        upload_id: &str,
        from_part: i32,
        num_parts: i32,
    ) -> Result<Vec<UploadPart>>;

    /// Complete a multipart upload.
    async fn complete_multipart_upload(
        &self,
        artifact_id: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<CompletedUpload>;

    /// Abort a multipart upload.
    async fn abort_multipart_upload(&self, artifact_id: &str, upload_id: &str) -> Result<()>;
}
