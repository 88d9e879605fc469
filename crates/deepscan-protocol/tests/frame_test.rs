// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Frame encoding/decoding tests for deepscan-protocol.

use bytes::Bytes;
use deepscan_protocol::frame::{Frame, FrameError, HEADER_SIZE, MessageType};
use deepscan_protocol::scan_proto::{
    CancelScanRequest, CreateScanRequest, RpcRequest, ScanKind, rpc_request::Request,
};
use deepscan_protocol::storage_proto::GetArtifactRequest;

#[test]
fn test_message_type_conversions() {
    assert_eq!(MessageType::try_from(1u16).unwrap(), MessageType::Request);
    assert_eq!(MessageType::try_from(2u16).unwrap(), MessageType::Response);
    assert_eq!(MessageType::try_from(3u16).unwrap(), MessageType::Error);

    assert!(MessageType::try_from(0u16).is_err());
    assert!(MessageType::try_from(4u16).is_err());
    assert!(MessageType::try_from(100u16).is_err());
}

#[test]
fn test_frame_header_format() {
    let msg = CancelScanRequest {
        id: "f2b9c1de-0000-0000-0000-000000000000".to_string(),
    };
    let frame = Frame::request(&msg).unwrap();
    let encoded = frame.encode();

    // First 4 bytes are length (big-endian)
    let length = u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]) as usize;
    assert_eq!(length, frame.payload.len());

    // Next 2 bytes are message type (big-endian)
    let msg_type = u16::from_be_bytes([encoded[4], encoded[5]]);
    assert_eq!(msg_type, MessageType::Request as u16);

    assert_eq!(encoded.len(), HEADER_SIZE + frame.payload.len());
}

#[test]
fn test_rpc_request_envelope_roundtrip() {
    let request = RpcRequest {
        request: Some(Request::CreateScan(CreateScanRequest {
            organization_id: "org-1".to_string(),
            project_id: "proj-1".to_string(),
            user_id: String::new(),
            scan_kinds: vec![ScanKind::Sast as i32, ScanKind::Sca as i32],
            git_url: "https://x/y".to_string(),
            git_branch: "main".to_string(),
            git_commit: String::new(),
            source_artifact_id: String::new(),
        })),
    };

    let frame = Frame::request(&request).unwrap();
    let decoded_frame = Frame::decode_from_bytes(frame.encode()).unwrap();
    let decoded: RpcRequest = decoded_frame.decode().unwrap();

    match decoded.request {
        Some(Request::CreateScan(req)) => {
            assert_eq!(req.organization_id, "org-1");
            assert_eq!(req.scan_kinds.len(), 2);
            assert_eq!(req.git_url, "https://x/y");
        }
        other => panic!("unexpected request variant: {:?}", other),
    }
}

#[test]
fn test_storage_proto_roundtrip() {
    let msg = GetArtifactRequest {
        artifact_id: "art-123".to_string(),
    };
    let frame = Frame::request(&msg).unwrap();
    let decoded: GetArtifactRequest = Frame::decode_from_bytes(frame.encode())
        .unwrap()
        .decode()
        .unwrap();
    assert_eq!(decoded.artifact_id, "art-123");
}

#[test]
fn test_frame_decode_incomplete_header() {
    let incomplete = Bytes::from_static(&[0, 0, 0, 10, 0]);
    let result = Frame::decode_from_bytes(incomplete);
    assert!(matches!(result, Err(FrameError::Io(_))));
}

#[test]
fn test_frame_decode_incomplete_payload() {
    let mut data = vec![0, 0, 0, 100]; // length = 100
    data.extend_from_slice(&[0, 1]); // type = Request
    data.extend_from_slice(&[0u8; 10]); // only 10 bytes of payload

    let result = Frame::decode_from_bytes(Bytes::from(data));
    assert!(matches!(result, Err(FrameError::Io(_))));
}

#[test]
fn test_frame_decode_invalid_message_type() {
    let mut data = vec![0, 0, 0, 0]; // length = 0
    data.extend_from_slice(&[0, 99]); // type = 99 (invalid)

    let result = Frame::decode_from_bytes(Bytes::from(data));
    assert!(matches!(result, Err(FrameError::InvalidMessageType(99))));
}
