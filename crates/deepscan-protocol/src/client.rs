// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! QUIC client helpers for connecting to deepscan services.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quinn::{ClientConfig, Connection, Endpoint, TransportConfig};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::frame::{Frame, FrameError};

/// Errors that can occur in the QUIC client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Connection(#[from] quinn::ConnectionError),

    #[error("connect error: {0}")]
    Connect(#[from] quinn::ConnectError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stream closed: {0}")]
    ClosedStream(#[from] quinn::ClosedStream),

    #[error("no connection established")]
    NotConnected,

    #[error("server returned error frame")]
    ErrorFrame,

    #[error("connection timed out after {0}ms")]
    Timeout(u64),
}

/// Configuration for the QUIC client
#[derive(Debug, Clone)]
pub struct ProtocolClientConfig {
    /// Server address to connect to
    pub server_addr: SocketAddr,
    /// Server name for TLS verification (use "localhost" for local dev)
    pub server_name: String,
    /// Skip certificate verification (for development only!)
    pub dangerous_skip_cert_verification: bool,
    /// Keep-alive interval in milliseconds (0 to disable)
    pub keep_alive_interval_ms: u64,
    /// Idle timeout in milliseconds
    pub idle_timeout_ms: u64,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for ProtocolClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:9440".parse().unwrap(),
            server_name: "localhost".to_string(),
            dangerous_skip_cert_verification: false,
            keep_alive_interval_ms: 10_000,
            idle_timeout_ms: 120_000,
            connect_timeout_ms: 10_000,
        }
    }
}

/// QUIC client for deepscan services.
///
/// Connections are established lazily and reused across requests; each
/// request opens a fresh bidirectional stream.
pub struct ProtocolClient {
    endpoint: Endpoint,
    connection: Mutex<Option<Connection>>,
    config: ProtocolClientConfig,
}

impl ProtocolClient {
    /// Create a new client with the given configuration
    pub fn new(config: ProtocolClientConfig) -> Result<Self, ClientError> {
        let mut endpoint = Endpoint::client("0.0.0.0:0".parse().unwrap())?;

        let client_config = Self::build_client_config(&config)?;
        endpoint.set_default_client_config(client_config);

        Ok(Self {
            endpoint,
            connection: Mutex::new(None),
            config,
        })
    }

    /// Create a client with default configuration for local development
    pub fn localhost() -> Result<Self, ClientError> {
        Self::new(ProtocolClientConfig {
            dangerous_skip_cert_verification: true,
            ..Default::default()
        })
    }

    fn build_client_config(config: &ProtocolClientConfig) -> Result<ClientConfig, ClientError> {
        let crypto = if config.dangerous_skip_cert_verification {
            rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(SkipServerVerification))
                .with_no_client_auth()
        } else {
            let mut roots = rustls::RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        };

        let mut transport = TransportConfig::default();
        if config.keep_alive_interval_ms > 0 {
            transport.keep_alive_interval(Some(Duration::from_millis(
                config.keep_alive_interval_ms,
            )));
        }
        transport.max_idle_timeout(Some(
            Duration::from_millis(config.idle_timeout_ms)
                .try_into()
                .map_err(|_| ClientError::Timeout(config.idle_timeout_ms))?,
        ));

        let mut client_config = ClientConfig::new(Arc::new(
            quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
                .map_err(|e| ClientError::Io(std::io::Error::other(e)))?,
        ));
        client_config.transport_config(Arc::new(transport));

        Ok(client_config)
    }

    /// Connect to the server
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<(), ClientError> {
        let mut conn_guard = self.connection.lock().await;

        if let Some(ref conn) = *conn_guard
            && conn.close_reason().is_none()
        {
            debug!("reusing existing connection");
            return Ok(());
        }

        info!(addr = %self.config.server_addr, "connecting");

        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let connecting = self
            .endpoint
            .connect(self.config.server_addr, &self.config.server_name)?;

        let connection = tokio::time::timeout(timeout, connecting)
            .await
            .map_err(|_| ClientError::Timeout(self.config.connect_timeout_ms))??;

        *conn_guard = Some(connection);
        Ok(())
    }

    async fn get_connection(&self) -> Result<Connection, ClientError> {
        self.connect().await?;
        let conn_guard = self.connection.lock().await;
        conn_guard.clone().ok_or(ClientError::NotConnected)
    }

    /// Send a request and receive a response using a new stream
    #[instrument(skip(self, request))]
    pub async fn request<Req: prost::Message, Resp: prost::Message + Default>(
        &self,
        request: &Req,
    ) -> Result<Resp, ClientError> {
        let conn = self.get_connection().await?;
        let (mut send, mut recv) = conn.open_bi().await?;

        let frame = Frame::request(request)?;
        crate::frame::write_frame(&mut send, &frame).await?;
        send.finish()?;

        let response_frame = crate::frame::read_frame(&mut recv).await?;
        match response_frame.message_type {
            crate::frame::MessageType::Response => Ok(response_frame.decode()?),
            _ => Err(ClientError::ErrorFrame),
        }
    }

    /// Close the connection gracefully
    pub async fn close(&self) {
        let mut conn_guard = self.connection.lock().await;
        if let Some(conn) = conn_guard.take() {
            conn.close(0u32.into(), b"client closing");
        }
    }

    /// Check if the client is currently connected
    pub async fn is_connected(&self) -> bool {
        let conn_guard = self.connection.lock().await;
        match *conn_guard {
            Some(ref conn) => conn.close_reason().is_none(),
            None => false,
        }
    }
}

impl Drop for ProtocolClient {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.connection.try_lock()
            && let Some(conn) = guard.take()
        {
            conn.close(0u32.into(), b"client dropped");
        }
    }
}

/// Certificate verifier that skips all verification (for development only!)
#[derive(Debug)]
struct SkipServerVerification;

impl rustls::client::danger::ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProtocolClientConfig::default();
        assert_eq!(config.server_addr, "127.0.0.1:9440".parse().unwrap());
        assert_eq!(config.server_name, "localhost");
        assert!(!config.dangerous_skip_cert_verification);
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = ProtocolClient::localhost();
        assert!(client.is_ok(), "failed to create client: {:?}", client.err());
    }

    #[tokio::test]
    async fn test_client_initial_not_connected() {
        let client = ProtocolClient::localhost().unwrap();
        assert!(!client.is_connected().await);
    }

    #[tokio::test]
    async fn test_client_connect_timeout() {
        let config = ProtocolClientConfig {
            server_addr: "127.0.0.1:59998".parse().unwrap(),
            dangerous_skip_cert_verification: true,
            connect_timeout_ms: 100,
            ..Default::default()
        };
        let client = ProtocolClient::new(config).unwrap();
        assert!(client.connect().await.is_err());
    }

    #[test]
    fn test_build_client_config_with_verification() {
        let config = ProtocolClientConfig::default();
        assert!(ProtocolClient::build_client_config(&config).is_ok());
    }
}
