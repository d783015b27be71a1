//! WebSocket Transport
//!
//! [`Connector`] implementation over `tokio-tungstenite`. Supports `ws://`
//! and `wss://` endpoints; TLS uses the rustls stack with WebPKI roots.
//!
//! Only text frames carry protocol data. Binary frames are accepted when
//! they hold UTF-8, pings are answered and pongs ignored.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{Connector, Transport, TransportError};

/// Opens WebSocket connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a new WebSocket connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, TransportError> {
        let (stream, response) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        tracing::debug!(status = %response.status(), "websocket handshake complete");
        Ok(Box::new(WsTransport { stream }))
    }
}

/// An open WebSocket connection.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text.as_str().to_owned())),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => {
                        tracing::warn!(len = data.len(), "ignoring non-UTF-8 binary frame");
                    }
                },
                // tungstenite queues the pong reply itself
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "websocket close frame received");
                    return None;
                }
                Some(Err(e)) => return Some(Err(TransportError::Receive(e.to_string()))),
                None => return None,
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "websocket close failed");
        }
    }
}
