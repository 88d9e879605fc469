// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Storage service client over the deepscan wire protocol.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use deepscan_protocol::storage_proto::{
    self, RpcRequest, RpcResponse, rpc_request::Request, rpc_response::Response,
};
use deepscan_protocol::{ClientError, ProtocolClient, ProtocolClientConfig};

use super::{
    ArtifactDownload, ArtifactType, BlobStore, CompletedPart, CompletedUpload, CreatedArtifact,
    Protocol, Result, StorageError, UploadMode, UploadPart,
};

/// Blob service client speaking the platform's QUIC protocol.
pub struct StorageServiceClient {
    client: ProtocolClient,
}

impl StorageServiceClient {
    /// Create a client for the blob service at `endpoint`.
    pub fn new(
        endpoint: std::net::SocketAddr,
        server_name: &str,
        timeout_ms: u64,
        dangerous_skip_cert_verification: bool,
    ) -> Result<Self> {
        let config = ProtocolClientConfig {
            server_addr: endpoint,
            server_name: server_name.to_string(),
            dangerous_skip_cert_verification,
            connect_timeout_ms: timeout_ms,
            ..Default::default()
        };

        let client = ProtocolClient::new(config)
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        info!(endpoint = %endpoint, "Storage service client initialized");
        Ok(Self { client })
    }

    async fn call(&self, request: Request) -> Result<Response> {
        let rpc_request = RpcRequest {
            request: Some(request),
        };

        let response: RpcResponse = self
            .client
            .request(&rpc_request)
            .await
            .map_err(map_client_error)?;

        match response.response {
            Some(Response::Error(err)) => {
                if err.code == "NOT_FOUND" {
                    Err(StorageError::NotFound(err.message))
                } else {
                    Err(StorageError::Service {
                        code: err.code,
                        message: err.message,
                    })
                }
            }
            Some(other) => Ok(other),
            None => Err(StorageError::Transport(
                "empty response from storage service".to_string(),
            )),
        }
    }
}

fn map_client_error(err: ClientError) -> StorageError {
    StorageError::Transport(err.to_string())
}

fn timestamp(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

fn artifact_type_to_proto(artifact_type: ArtifactType) -> storage_proto::ArtifactType {
    match artifact_type {
        ArtifactType::Source => storage_proto::ArtifactType::Source,
        ArtifactType::Results => storage_proto::ArtifactType::Results,
        ArtifactType::Logs => storage_proto::ArtifactType::Logs,
    }
}

fn upload_mode_to_proto(mode: UploadMode) -> storage_proto::UploadMode {
    match mode {
        UploadMode::Simple => storage_proto::UploadMode::Simple,
        UploadMode::Multipart => storage_proto::UploadMode::Multipart,
    }
}

fn protocol_from_proto(protocol: i32) -> Protocol {
    match storage_proto::StorageProtocol::try_from(protocol) {
        Ok(storage_proto::StorageProtocol::S3Express) => Protocol::S3Express,
        Ok(storage_proto::StorageProtocol::Azure) => Protocol::Azure,
        Ok(storage_proto::StorageProtocol::Gcs) => Protocol::Gcs,
        _ => Protocol::S3,
    }
}

#[async_trait]
impl BlobStore for StorageServiceClient {
    async fn create_artifact(
        &self,
        filename: &str,
        artifact_type: ArtifactType,
        upload_mode: UploadMode,
    ) -> Result<CreatedArtifact> {
        debug!(filename = filename, "Creating artifact");

        let response = self
            .call(Request::CreateArtifact(storage_proto::CreateArtifactRequest {
                filename: filename.to_string(),
                artifact_type: artifact_type_to_proto(artifact_type) as i32,
                upload_mode: upload_mode_to_proto(upload_mode) as i32,
            }))
            .await?;

        match response {
            Response::CreateArtifact(resp) => Ok(CreatedArtifact {
                artifact_id: resp.artifact_id,
                signed_url: resp.signed_url,
                expiration: timestamp(resp.expires_at_ms),
                protocol: protocol_from_proto(resp.protocol),
            }),
            _ => Err(unexpected_response()),
        }
    }

    async fn get_artifact(&self, artifact_id: &str) -> Result<ArtifactDownload> {
        debug!(artifact_id = artifact_id, "Getting artifact");

        let response = self
            .call(Request::GetArtifact(storage_proto::GetArtifactRequest {
                artifact_id: artifact_id.to_string(),
            }))
            .await?;

        match response {
            Response::GetArtifact(resp) => Ok(ArtifactDownload {
                artifact_id: resp.artifact_id,
                signed_url: resp.signed_url,
                expiration: timestamp(resp.expires_at_ms),
                protocol: protocol_from_proto(resp.protocol),
            }),
            _ => Err(unexpected_response()),
        }
    }

    async fn delete_artifacts(&self, artifact_ids: &[String]) -> Result<u32> {
        debug!(count = artifact_ids.len(), "Deleting artifacts");

        let response = self
            .call(Request::DeleteArtifacts(
                storage_proto::DeleteArtifactsRequest {
                    artifact_ids: artifact_ids.to_vec(),
                },
            ))
            .await?;

        match response {
            Response::DeleteArtifacts(resp) => Ok(resp.deleted_count),
            _ => Err(unexpected_response()),
        }
    }

    async fn initiate_multipart_upload(&self, artifact_id: &str) -> Result<String> {
        let response = self
            .call(Request::InitiateMultipartUpload(
                storage_proto::InitiateMultipartUploadRequest {
                    artifact_id: artifact_id.to_string(),
                },
            ))
            .await?;

        match response {
            Response::InitiateMultipartUpload(resp) => Ok(resp.upload_id),
            _ => Err(unexpected_response()),
        }
    }

    async fn get_multipart_upload_parts(
        &self,
        artifact_id: &str,
        upload_id: &str,
        from_part: i32,
        num_parts: i32,
    ) -> Result<Vec<UploadPart>> {
        let response = self
            .call(Request::GetMultipartUploadParts(
                storage_proto::GetMultipartUploadPartsRequest {
                    artifact_id: artifact_id.to_string(),
                    upload_id: upload_id.to_string(),
                    from_part,
                    num_parts,
                },
            ))
            .await?;

        match response {
            Response::GetMultipartUploadParts(resp) => Ok(resp
                .parts
                .into_iter()
                .map(|p| UploadPart {
                    part_number: p.part_number,
                    url: p.url,
                    expiration: timestamp(p.expires_at_ms),
                })
                .collect()),
            _ => Err(unexpected_response()),
        }
    }

    async fn complete_multipart_upload(
        &self,
        artifact_id: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<CompletedUpload> {
        let response = self
            .call(Request::CompleteMultipartUpload(
                storage_proto::CompleteMultipartUploadRequest {
                    artifact_id: artifact_id.to_string(),
                    upload_id: upload_id.to_string(),
                    parts: parts
                        .iter()
                        .map(|p| storage_proto::CompletedPart {
                            part_number: p.part_number,
                            etag: p.etag.clone(),
                        })
                        .collect(),
                },
            ))
            .await?;

        match response {
            Response::CompleteMultipartUpload(resp) => Ok(CompletedUpload {
                url: resp.url,
                expiration: timestamp(resp.expires_at_ms),
            }),
            _ => Err(unexpected_response()),
        }
    }

    async fn abort_multipart_upload(&self, artifact_id: &str, upload_id: &str) -> Result<()> {
        let response = self
            .call(Request::AbortMultipartUpload(
                storage_proto::AbortMultipartUploadRequest {
                    artifact_id: artifact_id.to_string(),
                    upload_id: upload_id.to_string(),
                },
            ))
            .await?;

        match response {
            Response::AbortMultipartUpload(_) => Ok(()),
            _ => Err(unexpected_response()),
        }
    }
}

fn unexpected_response() -> StorageError {
    StorageError::Transport("unexpected response variant from storage service".to_string())
}
