// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! QUIC server helpers for the control plane.

use std::net::SocketAddr;
use std::sync::Arc;

use quinn::{Endpoint, Incoming, RecvStream, SendStream, ServerConfig, TransportConfig};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::frame::{Frame, FrameError, read_frame, write_frame};

/// Errors that can occur in the QUIC server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bind error: {0}")]
    Bind(#[from] std::io::Error),

    #[error("connection error: {0}")]
    Connection(#[from] quinn::ConnectionError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("TLS error: {0}")]
    Tls(String),
}

/// Configuration for the QUIC server
#[derive(Debug, Clone)]
pub struct ProtocolServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// TLS certificate chain (PEM format)
    pub cert_pem: Vec<u8>,
    /// TLS private key (PEM format)
    pub key_pem: Vec<u8>,
    /// Maximum concurrent bidirectional streams per connection
    pub max_bi_streams: u32,
    /// Idle timeout in milliseconds
    pub idle_timeout_ms: u64,
    /// Server-side keep-alive interval in milliseconds (0 to disable)
    pub keep_alive_interval_ms: u64,
}

impl Default for ProtocolServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9440".parse().unwrap(),
            cert_pem: Vec::new(),
            key_pem: Vec::new(),
            max_bi_streams: 512,
            idle_timeout_ms: 120_000,
            keep_alive_interval_ms: 15_000,
        }
    }
}

/// QUIC server for the deepscan wire protocol.
///
/// One bidirectional stream carries one RPC call. Callers supply a
/// connection handler that routes decoded requests.
pub struct ProtocolServer {
    endpoint: Endpoint,
}

impl ProtocolServer {
    /// Create a new server with the given configuration
    pub fn new(config: ProtocolServerConfig) -> Result<Self, ServerError> {
        let server_config = Self::build_server_config(&config)?;
        let endpoint = Endpoint::server(server_config, config.bind_addr)?;

        info!(
            addr = %config.bind_addr,
            max_bi_streams = config.max_bi_streams,
            idle_timeout_ms = config.idle_timeout_ms,
            "QUIC server bound"
        );

        Ok(Self { endpoint })
    }

    /// Create a server with a self-signed certificate for local development
    pub fn localhost(bind_addr: SocketAddr) -> Result<Self, ServerError> {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .map_err(|e| ServerError::Tls(e.to_string()))?;

        let config = ProtocolServerConfig {
            bind_addr,
            cert_pem: cert.cert.pem().into_bytes(),
            key_pem: cert.key_pair.serialize_pem().into_bytes(),
            ..Default::default()
        };

        Self::new(config)
    }

    fn build_server_config(config: &ProtocolServerConfig) -> Result<ServerConfig, ServerError> {
        let certs = rustls_pemfile::certs(&mut config.cert_pem.as_slice())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ServerError::Tls(format!("failed to parse certificates: {}", e)))?;

        let key = rustls_pemfile::private_key(&mut config.key_pem.as_slice())
            .map_err(|e| ServerError::Tls(format!("failed to parse private key: {}", e)))?
            .ok_or_else(|| ServerError::Tls("no private key found".to_string()))?;

        let crypto = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| ServerError::Tls(e.to_string()))?;

        let mut transport = TransportConfig::default();
        transport.max_idle_timeout(Some(
            std::time::Duration::from_millis(config.idle_timeout_ms)
                .try_into()
                .map_err(|_| ServerError::Tls("idle timeout out of range".to_string()))?,
        ));
        transport.max_concurrent_bidi_streams(config.max_bi_streams.into());
        if config.keep_alive_interval_ms > 0 {
            transport.keep_alive_interval(Some(std::time::Duration::from_millis(
                config.keep_alive_interval_ms,
            )));
        }

        let mut server_config = ServerConfig::with_crypto(Arc::new(
            quinn::crypto::rustls::QuicServerConfig::try_from(crypto)
                .map_err(|e| ServerError::Tls(e.to_string()))?,
        ));
        server_config.transport_config(Arc::new(transport));

        Ok(server_config)
    }

    /// Accept the next incoming connection
    pub async fn accept(&self) -> Option<Incoming> {
        self.endpoint.accept().await
    }

    /// Get the local address the server is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.endpoint.local_addr()?)
    }

    /// Close the server
    pub fn close(&self) {
        self.endpoint.close(0u32.into(), b"server closing");
    }

    /// Run the server with a connection handler
    #[instrument(skip(self, handler))]
    pub async fn run<H, Fut>(&self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(ConnectionHandler) -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        info!("QUIC server running");

        while let Some(incoming) = self.accept().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                match incoming.await {
                    Ok(connection) => {
                        let remote_addr = connection.remote_address();
                        debug!(%remote_addr, "accepted connection");
                        handler(ConnectionHandler::new(connection)).await;
                    }
                    Err(e) => {
                        warn!("failed to accept connection: {}", e);
                    }
                }
            });
        }

        Ok(())
    }
}

/// Handler for an individual QUIC connection
pub struct ConnectionHandler {
    connection: quinn::Connection,
}

impl ConnectionHandler {
    pub fn new(connection: quinn::Connection) -> Self {
        Self { connection }
    }

    /// Get the remote address of the connection
    pub fn remote_address(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    /// Accept the next bidirectional stream
    pub async fn accept_bi(&self) -> Result<(SendStream, RecvStream), ServerError> {
        Ok(self.connection.accept_bi().await?)
    }

    /// Run the connection handler with a stream handler.
    ///
    /// Each accepted bidirectional stream is dispatched to its own task.
    #[instrument(skip(self, handler), fields(remote = %self.remote_address()))]
    pub async fn run<H, Fut>(&self, handler: H)
    where
        H: Fn(StreamHandler) -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        loop {
            match self.accept_bi().await {
                Ok((send, recv)) => {
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        handler(StreamHandler::new(send, recv)).await;
                    });
                }
                Err(ServerError::Connection(quinn::ConnectionError::ApplicationClosed(_)))
                | Err(ServerError::Connection(quinn::ConnectionError::LocallyClosed)) => {
                    debug!("connection closed");
                    break;
                }
                Err(e) => {
                    error!("error accepting stream: {}", e);
                    break;
                }
            }
        }
    }

    /// Check if the connection is still open
    pub fn is_open(&self) -> bool {
        self.connection.close_reason().is_none()
    }

    /// Close the connection
    pub fn close(&self, code: u32, reason: &[u8]) {
        self.connection.close(code.into(), reason);
    }
}

/// Handler for an individual QUIC stream (bidirectional)
pub struct StreamHandler {
    send: SendStream,
    recv: RecvStream,
}

impl StreamHandler {
    pub fn new(send: SendStream, recv: RecvStream) -> Self {
        Self { send, recv }
    }

    /// Read the next frame from the stream
    pub async fn read_frame(&mut self) -> Result<Frame, ServerError> {
        Ok(read_frame(&mut self.recv).await?)
    }

    /// Write a frame to the stream
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), ServerError> {
        Ok(write_frame(&mut self.send, frame).await?)
    }

    /// Finish the send stream (signal no more data)
    pub fn finish(&mut self) -> Result<(), ServerError> {
        self.send
            .finish()
            .map_err(|e| ServerError::Frame(FrameError::Io(std::io::Error::other(e))))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProtocolServerConfig::default();
        assert_eq!(config.bind_addr.port(), 9440);
        assert_eq!(config.max_bi_streams, 512);
        assert_eq!(config.idle_timeout_ms, 120_000);
    }

    #[tokio::test]
    async fn test_localhost_server_binds() {
        let server = ProtocolServer::localhost("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        server.close();
    }

    #[tokio::test]
    async fn test_server_rejects_empty_cert() {
        let config = ProtocolServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        assert!(matches!(
            ProtocolServer::new(config),
            Err(ServerError::Tls(_))
        ));
    }
}
