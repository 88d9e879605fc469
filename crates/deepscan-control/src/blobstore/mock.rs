// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock blob store for testing.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::persistence::memory::CallJournal;

use super::{
    ArtifactDownload, ArtifactType, BlobStore, CompletedPart, CompletedUpload, CreatedArtifact,
    Protocol, Result, StorageError, UploadMode, UploadPart,
};

/// Mock blob store.
///
/// Artifacts are scripted with `insert_artifact`; deletions are recorded
/// for assertions.
#[derive(Default)]
pub struct MockBlobStore {
    artifacts: Mutex<HashMap<String, String>>,
    deleted: Mutex<Vec<Vec<String>>>,
    journal: Mutex<Option<CallJournal>>,
    /// If true, get_artifact fails with a transport error.
    pub fail_get: Mutex<bool>,
    /// If true, delete_artifacts fails with a transport error.
    pub fail_delete: Mutex<bool>,
}

impl MockBlobStore {
    /// Create a new mock blob store.
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

    /// Script an artifact with its signed download URL.
    pub fn insert_artifact(&self, artifact_id: &str, signed_url: &str) {
        self.artifacts
            .lock()
            .unwrap()
            .insert(artifact_id.to_string(), signed_url.to_string());
    }

    /// Make subsequent get_artifact calls fail.
    pub fn fail_gets(&self) {
        *self.fail_get.lock().unwrap() = true;
    }

    /// Make subsequent delete_artifacts calls fail.
    pub fn fail_deletes(&self) {
        *self.fail_delete.lock().unwrap() = true;
    }

    /// Batches passed to delete_artifacts, in order.
    pub fn deleted_batches(&self) -> Vec<Vec<String>> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn create_artifact(
        &self,
        filename: &str,
        _artifact_type: ArtifactType,
        _upload_mode: UploadMode,
    ) -> Result<CreatedArtifact> {
        let artifact_id = format!("art-{}", Uuid::new_v4());
        let signed_url = format!("https://signed.example.com/{}/{}", artifact_id, filename);
        self.insert_artifact(&artifact_id, &signed_url);

        Ok(CreatedArtifact {
            artifact_id,
            signed_url,
            expiration: Utc::now() + Duration::hours(24),
            protocol: Protocol::S3,
        })
    }

    async fn get_artifact(&self, artifact_id: &str) -> Result<ArtifactDownload> {
        if *self.fail_get.lock().unwrap() {
            return Err(StorageError::Transport("mock get failure".to_string()));
        }

        self.artifacts
            .lock()
            .unwrap()
            .get(artifact_id)
            .map(|url| ArtifactDownload {
                artifact_id: artifact_id.to_string(),
                signed_url: url.clone(),
                expiration: Utc::now() + Duration::hours(1),
                protocol: Protocol::S3,
            })
            .ok_or_else(|| StorageError::NotFound(artifact_id.to_string()))
    }

    async fn delete_artifacts(&self, artifact_ids: &[String]) -> Result<u32> {
        if *self.fail_delete.lock().unwrap() {
            return Err(StorageError::Transport("mock delete failure".to_string()));
        }

        let mut artifacts = self.artifacts.lock().unwrap();
        let mut deleted = 0u32;
        for id in artifact_ids {
            if artifacts.remove(id).is_some() {
                deleted += 1;
            }
        }

        self.deleted.lock().unwrap().push(artifact_ids.to_vec());
        self.record(format!("storage.delete_artifacts {}", artifact_ids.join(",")));
        Ok(deleted)
    }

    async fn initiate_multipart_upload(&self, artifact_id: &str) -> Result<String> {
        Ok(format!("upload-{}", artifact_id))
    }

    async fn get_multipart_upload_parts(
        &self,
        _artifact_id: &str,
        upload_id: &str,
        from_part: i32,
        num_parts: i32,
    ) -> Result<Vec<UploadPart>> {
        Ok((from_part..from_part + num_parts)
            .map(|n| UploadPart {
                part_number: n,
                url: format!("https://signed.example.com/{}/part/{}", upload_id, n),
                expiration: Utc::now() + Duration::hours(1),
            })
            .collect())
    }

    async fn complete_multipart_upload(
        &self,
        artifact_id: &str,
        _upload_id: &str,
        _parts: &[CompletedPart],
    ) -> Result<CompletedUpload> {
        Ok(CompletedUpload {
            url: format!("https://signed.example.com/{}", artifact_id),
            expiration: Utc::now() + Duration::hours(1),
        })
    }

    async fn abort_multipart_upload(&self, _artifact_id: &str, _upload_id: &str) -> Result<()> {
        Ok(())
    }
}
