//! WebSocket Transport Adapter
//!
//! Production [`TransportFactory`] over `tokio-tungstenite`. Control
//! frames are handled inside the adapter: pings are answered in place and
//! never surface through the port; only text frames reach the
//! orchestrator.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{Transport, TransportError, TransportFactory};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for WebSocket connections.
#[derive(Debug, Clone)]
pub struct WsTransportConfig {
    /// Timeout for the TCP + TLS + WebSocket upgrade.
    pub connect_timeout: Duration,
}

impl Default for WsTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(8),
        }
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Opens WebSocket connections to provider endpoints.
#[derive(Debug, Clone, Default)]
pub struct WsTransportFactory {
    config: WsTransportConfig,
}

impl WsTransportFactory {
    /// Create a factory with the given configuration.
    #[must_use]
    pub const fn new(config: WsTransportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TransportFactory for WsTransportFactory {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn Transport>, TransportError> {
        tracing::debug!(endpoint, "opening websocket connection");

        let connect = tokio_tungstenite::connect_async(endpoint);
        let (stream, _response) = tokio::time::timeout(self.config.connect_timeout, connect)
            .await
            .map_err(|_| TransportError::OpenTimeout(endpoint.to_string()))?
            .map_err(|e| TransportError::OpenFailed {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(WsTransport { stream }))
    }
}

// =============================================================================
// Transport
// =============================================================================

/// An open WebSocket connection.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: &str) -> Result<(), TransportError> {
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn receive(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.stream.next().await {
                None => return Ok(None),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.to_string())),
                Some(Ok(Message::Ping(payload))) => {
                    self.stream
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| TransportError::SendFailed(e.to_string()))?;
                }
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(_)) => {
                    // Pong and binary frames carry nothing for this core.
                }
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport").finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_connect_timeout() {
        let config = WsTransportConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(8));
    }

    #[tokio::test]
    async fn open_against_closed_port_errors() {
        let factory = WsTransportFactory::new(WsTransportConfig {
            connect_timeout: Duration::from_secs(2),
        });

        let result = factory.open("ws://127.0.0.1:9/stream").await;
        assert!(matches!(
            result,
            Err(TransportError::OpenFailed { .. } | TransportError::OpenTimeout(_))
        ));
    }
}
