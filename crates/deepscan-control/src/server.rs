// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scan protocol QUIC server.
//!
//! Accepts connections from external callers and runner workloads,
//! decodes the RPC envelope, and routes each request to a handler.
//! Errors become `RpcError` frames carrying a standard status name.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use deepscan_protocol::frame::Frame;
use deepscan_protocol::scan_proto::{
    self, RpcError, RpcRequest, RpcResponse, rpc_request::Request, rpc_response::Response,
};
use deepscan_protocol::server::{ConnectionHandler, ProtocolServer, StreamHandler};

use crate::domain::{Finding, Scan, ScanKind, ScanStatus, Severity};
use crate::error::ControlError;
use crate::handlers::{
    CreateScanParams, GetFindingsParams, HandlerState, ListScansParams, UpdateScanParams,
    handle_cancel_scan, handle_create_findings, handle_create_scan, handle_delete_project_scans,
    handle_delete_scan, handle_get_findings, handle_get_scan, handle_list_scans,
    handle_update_scan,
};

/// Run the scan protocol server until the endpoint is closed.
pub async fn run_scan_server(bind_addr: SocketAddr, state: Arc<HandlerState>) -> Result<()> {
    let server = ProtocolServer::localhost(bind_addr)?;

    info!(addr = %bind_addr, "Scan protocol server starting");

    server
        .run(move |conn: ConnectionHandler| {
            let state = state.clone();
            async move {
                handle_connection(conn, state).await;
            }
        })
        .await?;

    Ok(())
}

/// Handle a single connection.
async fn handle_connection(conn: ConnectionHandler, state: Arc<HandlerState>) {
    debug!(remote = %conn.remote_address(), "New scan API connection accepted");

    conn.run(move |stream: StreamHandler| {
        let state = state.clone();
        async move {
            if let Err(e) = handle_stream(stream, state).await {
                error!("Stream error: {}", e);
            }
        }
    })
    .await;

    debug!("Scan API connection closed");
}

/// Handle a single stream (one request/response pair).
async fn handle_stream(mut stream: StreamHandler, state: Arc<HandlerState>) -> Result<()> {
    let request_frame = stream.read_frame().await?;
    let rpc_request: RpcRequest = request_frame.decode()?;

    let response = match rpc_request.request {
        Some(request) => route_request(request, &state).await,
        None => {
            warn!("Received empty RpcRequest");
            Response::Error(RpcError {
                code: "INVALID_ARGUMENT".to_string(),
                message: "RpcRequest contained no request".to_string(),
            })
        }
    };

    let rpc_response = RpcResponse {
        response: Some(response),
    };
    stream.write_frame(&Frame::response(&rpc_response)?).await?;
    stream.finish()?;

    Ok(())
}

fn error_response(err: &ControlError) -> Response {
    Response::Error(RpcError {
        code: err.status_code().to_string(),
        message: err.to_string(),
    })
}

/// Route a decoded request to its handler.
async fn route_request(request: Request, state: &HandlerState) -> Response {
    match request {
        Request::CreateScan(req) => {
            let params = CreateScanParams {
                organization_id: req.organization_id,
                project_id: req.project_id,
                user_id: req.user_id,
                scan_kinds: kinds_from_proto(&req.scan_kinds),
                git_url: req.git_url,
                git_branch: req.git_branch,
                git_commit: req.git_commit,
                source_artifact_id: req.source_artifact_id,
            };
            match handle_create_scan(state, params).await {
                Ok(scan) => Response::CreateScan(scan_proto::CreateScanResponse {
                    scan: Some(scan_to_proto(&scan)),
                }),
                Err(e) => error_response(&e),
            }
        }

        Request::GetScan(req) => match handle_get_scan(state, &req.id).await {
            Ok(scan) => Response::GetScan(scan_proto::GetScanResponse {
                scan: Some(scan_to_proto(&scan)),
            }),
            Err(e) => error_response(&e),
        },

        Request::ListScans(req) => {
            let params = ListScansParams {
                organization_id: req.organization_id,
                project_id: req.project_id,
                user_id: req.user_id,
                status: status_from_proto(req.status),
                scan_kinds: kinds_from_proto(&req.scan_kinds),
                created_before: req.created_before_ms.and_then(DateTime::from_timestamp_millis),
                limit: (req.limit > 0).then_some(req.limit as i64),
                offset: (req.offset > 0).then_some(req.offset as i64),
            };
            match handle_list_scans(state, params).await {
                Ok(scans) => Response::ListScans(scan_proto::ListScansResponse {
                    total_count: scans.len() as u32,
                    scans: scans.iter().map(scan_to_proto).collect(),
                }),
                Err(e) => error_response(&e),
            }
        }

        Request::UpdateScan(req) => {
            let params = UpdateScanParams {
                id: req.id,
                status: status_from_proto(req.status),
                total_findings: Some(req.total_findings),
                error_message: Some(req.error_message),
            };
            match handle_update_scan(state, params).await {
                Ok(scan) => Response::UpdateScan(scan_proto::UpdateScanResponse {
                    scan: Some(scan_to_proto(&scan)),
                }),
                Err(e) => error_response(&e),
            }
        }

        Request::GetFindings(req) => {
            let params = GetFindingsParams {
                scan_id: req.scan_id,
                scan_kind: kind_from_proto(req.scan_kind),
                severity: severity_from_proto(req.severity),
                limit: (req.limit > 0).then_some(req.limit as i64),
                offset: (req.offset > 0).then_some(req.offset as i64),
            };
            match handle_get_findings(state, params).await {
                Ok(findings) => Response::GetFindings(scan_proto::GetFindingsResponse {
                    total_count: findings.len() as u32,
                    findings: findings.iter().map(finding_to_proto).collect(),
                }),
                Err(e) => error_response(&e),
            }
        }

        Request::CreateFindings(req) => {
            let findings: std::result::Result<Vec<Finding>, ControlError> =
                req.findings.into_iter().map(finding_from_proto).collect();

            match findings {
                Ok(findings) => {
                    match handle_create_findings(state, &req.scan_id, findings).await {
                        Ok(created_count) => {
                            Response::CreateFindings(scan_proto::CreateFindingsResponse {
                                created_count,
                            })
                        }
                        Err(e) => error_response(&e),
                    }
                }
                Err(e) => error_response(&e),
            }
        }

        Request::CancelScan(req) => match handle_cancel_scan(state, &req.id).await {
            Ok(()) => Response::CancelScan(scan_proto::CancelScanResponse {}),
            Err(e) => error_response(&e),
        },

        Request::DeleteScan(req) => match handle_delete_scan(state, &req.id).await {
            Ok(()) => Response::DeleteScan(scan_proto::DeleteScanResponse {}),
            Err(e) => error_response(&e),
        },

        Request::DeleteProjectScans(req) => {
            match handle_delete_project_scans(state, &req.project_id).await {
                Ok(deleted_count) => {
                    Response::DeleteProjectScans(scan_proto::DeleteProjectScansResponse {
                        deleted_count,
                    })
                }
                Err(e) => error_response(&e),
            }
        }
    }
}

// ============================================================================
// Proto Conversions
// ============================================================================

/// Map a domain scan to its wire representation.
pub fn scan_to_proto(scan: &Scan) -> scan_proto::Scan {
    let mut findings_by_severity = HashMap::new();
    findings_by_severity.insert("critical".to_string(), scan.critical_count);
    findings_by_severity.insert("high".to_string(), scan.high_count);
    findings_by_severity.insert("medium".to_string(), scan.medium_count);
    findings_by_severity.insert("low".to_string(), scan.low_count);

    scan_proto::Scan {
        id: scan.id.to_string(),
        organization_id: scan.organization_id.to_string(),
        project_id: scan.project_id.to_string(),
        user_id: scan.user_id.map(|u| u.to_string()).unwrap_or_default(),
        status: status_to_proto(scan.status) as i32,
        scan_kinds: scan
            .scan_kinds
            .iter()
            .map(|k| kind_to_proto(*k) as i32)
            .collect(),
        git_url: scan.repository_url.clone().unwrap_or_default(),
        git_branch: scan.branch.clone().unwrap_or_default(),
        git_commit: scan.commit_sha.clone().unwrap_or_default(),
        source_artifact_id: scan.source_archive_id.clone().unwrap_or_default(),
        workload_name: scan.workload_name.clone().unwrap_or_default(),
        workload_namespace: scan.workload_namespace.clone().unwrap_or_default(),
        total_findings: scan.findings_count,
        findings_by_severity,
        error_message: scan.error_message.clone().unwrap_or_default(),
        created_at_ms: scan.created_at.timestamp_millis(),
        updated_at_ms: scan.updated_at.timestamp_millis(),
        started_at_ms: scan.started_at.map(|t| t.timestamp_millis()),
        completed_at_ms: scan.completed_at.map(|t| t.timestamp_millis()),
    }
}

/// Map a domain finding to its wire representation.
pub fn finding_to_proto(finding: &Finding) -> scan_proto::Finding {
    scan_proto::Finding {
        id: finding.id.to_string(),
        scan_id: finding.scan_id.to_string(),
        scan_kind: kind_to_proto(finding.scan_kind) as i32,
        tool_name: finding.tool_name.clone(),
        severity: severity_to_proto(finding.severity) as i32,
        title: finding.title.clone(),
        description: finding.description.clone(),
        file_path: finding.file_path.clone(),
        start_line: finding.start_line,
        end_line: finding.end_line.unwrap_or_default(),
        start_column: finding.start_column.unwrap_or_default(),
        end_column: finding.end_column.unwrap_or_default(),
        code_snippet: finding.code_snippet.clone().unwrap_or_default(),
        rule_id: finding.rule_id.clone().unwrap_or_default(),
        cwe_id: finding.cwe_id.clone().unwrap_or_default(),
        cve_id: finding.cve_id.clone().unwrap_or_default(),
        cvss_score: finding.cvss_score.unwrap_or_default(),
        cvss_vector: finding.cvss_vector.clone().unwrap_or_default(),
        package_name: finding.package_name.clone().unwrap_or_default(),
        package_version: finding.package_version.clone().unwrap_or_default(),
        fixed_version: finding.fixed_version.clone().unwrap_or_default(),
        license_name: finding.license_name.clone().unwrap_or_default(),
        license_type: finding.license_type.clone().unwrap_or_default(),
        remediation: finding.remediation.clone().unwrap_or_default(),
        references: finding.references.clone(),
        raw_output: finding.raw_output.clone().unwrap_or_default(),
        created_at_ms: finding.created_at.timestamp_millis(),
    }
}

/// Build a domain finding from its wire representation. The scan
/// reference is assigned by the handler; identifiers are minted here.
pub fn finding_from_proto(
    proto: scan_proto::Finding,
) -> std::result::Result<Finding, ControlError> {
    let scan_kind = kind_from_proto(proto.scan_kind)
        .ok_or_else(|| ControlError::Invalid("finding scan_kind is required".to_string()))?;
    let severity = severity_from_proto(proto.severity)
        .ok_or_else(|| ControlError::Invalid("finding severity is required".to_string()))?;

    let non_empty = |s: String| if s.is_empty() { None } else { Some(s) };
    let non_zero = |v: i32| if v == 0 { None } else { Some(v) };

    Ok(Finding {
        id: Uuid::new_v4(),
        scan_id: Uuid::nil(),
        scan_kind,
        tool_name: proto.tool_name,
        title: proto.title,
        description: proto.description,
        severity,
        file_path: proto.file_path,
        start_line: proto.start_line,
        end_line: non_zero(proto.end_line),
        start_column: non_zero(proto.start_column),
        end_column: non_zero(proto.end_column),
        code_snippet: non_empty(proto.code_snippet),
        rule_id: non_empty(proto.rule_id),
        cwe_id: non_empty(proto.cwe_id),
        cve_id: non_empty(proto.cve_id),
        cvss_score: if proto.cvss_score == 0.0 {
            None
        } else {
            Some(proto.cvss_score)
        },
        cvss_vector: non_empty(proto.cvss_vector),
        package_name: non_empty(proto.package_name),
        package_version: non_empty(proto.package_version),
        fixed_version: non_empty(proto.fixed_version),
        license_name: non_empty(proto.license_name),
        license_type: non_empty(proto.license_type),
        remediation: non_empty(proto.remediation),
        references: proto.references,
        raw_output: non_empty(proto.raw_output),
        created_at: Utc::now(),
    })
}

/// Map a domain status to the wire enum.
pub fn status_to_proto(status: ScanStatus) -> scan_proto::ScanStatus {
    match status {
        ScanStatus::Queued => scan_proto::ScanStatus::Queued,
        ScanStatus::Running => scan_proto::ScanStatus::Running,
        ScanStatus::Completed => scan_proto::ScanStatus::Completed,
        ScanStatus::Failed => scan_proto::ScanStatus::Failed,
        ScanStatus::Cancelled => scan_proto::ScanStatus::Cancelled,
    }
}

/// Map a wire status to the domain; unspecified and unknown values mean
/// "no status".
pub fn status_from_proto(status: i32) -> Option<ScanStatus> {
    match scan_proto::ScanStatus::try_from(status) {
        Ok(scan_proto::ScanStatus::Queued) => Some(ScanStatus::Queued),
        Ok(scan_proto::ScanStatus::Running) => Some(ScanStatus::Running),
        Ok(scan_proto::ScanStatus::Completed) => Some(ScanStatus::Completed),
        Ok(scan_proto::ScanStatus::Failed) => Some(ScanStatus::Failed),
        Ok(scan_proto::ScanStatus::Cancelled) => Some(ScanStatus::Cancelled),
        _ => None,
    }
}

/// Map a domain scan kind to the wire enum.
pub fn kind_to_proto(kind: ScanKind) -> scan_proto::ScanKind {
    match kind {
        ScanKind::Sast => scan_proto::ScanKind::Sast,
        ScanKind::Sca => scan_proto::ScanKind::Sca,
        ScanKind::Secrets => scan_proto::ScanKind::Secrets,
        ScanKind::License => scan_proto::ScanKind::License,
    }
}

/// Map a wire scan kind to the domain.
pub fn kind_from_proto(kind: i32) -> Option<ScanKind> {
    match scan_proto::ScanKind::try_from(kind) {
        Ok(scan_proto::ScanKind::Sast) => Some(ScanKind::Sast),
        Ok(scan_proto::ScanKind::Sca) => Some(ScanKind::Sca),
        Ok(scan_proto::ScanKind::Secrets) => Some(ScanKind::Secrets),
        Ok(scan_proto::ScanKind::License) => Some(ScanKind::License),
        _ => None,
    }
}

/// Map the wire kinds that are actually set, dropping unspecified values.
pub fn kinds_from_proto(kinds: &[i32]) -> Vec<ScanKind> {
    kinds.iter().filter_map(|k| kind_from_proto(*k)).collect()
}

/// Map a domain severity to the wire enum.
pub fn severity_to_proto(severity: Severity) -> scan_proto::Severity {
    match severity {
        Severity::Critical => scan_proto::Severity::Critical,
        Severity::High => scan_proto::Severity::High,
        Severity::Medium => scan_proto::Severity::Medium,
        Severity::Low => scan_proto::Severity::Low,
        Severity::Info => scan_proto::Severity::Info,
    }
}

/// Map a wire severity to the domain.
pub fn severity_from_proto(severity: i32) -> Option<Severity> {
    match scan_proto::Severity::try_from(severity) {
        Ok(scan_proto::Severity::Critical) => Some(Severity::Critical),
        Ok(scan_proto::Severity::High) => Some(Severity::High),
        Ok(scan_proto::Severity::Medium) => Some(Severity::Medium),
        Ok(scan_proto::Severity::Low) => Some(Severity::Low),
        Ok(scan_proto::Severity::Info) => Some(Severity::Info),
        _ => None,
    }
}
