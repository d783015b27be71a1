//! In-Memory Transport
//!
//! A loopback [`Connector`] for tests and local demos. Each accepted
//! connection produces a [`MemoryPeer`] on the [`MemoryServer`] side, which
//! plays the role of the price feed: it reads the client's frames and pushes
//! server frames.
//!
//! Connection outcomes are scripted per attempt. Once the script runs out
//! the fallback outcome applies (accept by default).

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::application::ports::{Connector, Transport, TransportError};
use crate::domain::streaming::OutboundFrame;

/// Result of one scripted connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Open the connection.
    Accept,
    /// Fail the attempt with the given message.
    Refuse(String),
    /// Never complete the handshake.
    Stall,
}

#[derive(Debug)]
struct ConnectorState {
    script: VecDeque<ConnectOutcome>,
    fallback: ConnectOutcome,
    endpoints: Vec<String>,
}

/// Loopback connector.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    state: Arc<Mutex<ConnectorState>>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

/// Server side of a [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryServer {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryConnector {
    /// Create a connector and its server side.
    #[must_use]
    pub fn pair() -> (Self, MemoryServer) {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let connector = Self {
            state: Arc::new(Mutex::new(ConnectorState {
                script: VecDeque::new(),
                fallback: ConnectOutcome::Accept,
                endpoints: Vec::new(),
            })),
            peers: peer_tx,
        };

        (connector, MemoryServer { peers: peer_rx })
    }

    /// Queue outcomes for the next attempts, in order.
    pub fn script(&self, outcomes: impl IntoIterator<Item = ConnectOutcome>) {
        self.state.lock().script.extend(outcomes);
    }

    /// Set the outcome used once the script is exhausted.
    pub fn set_fallback(&self, outcome: ConnectOutcome) {
        self.state.lock().fallback = outcome;
    }

    /// Number of connection attempts made so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.state.lock().endpoints.len()
    }

    /// Endpoints of all attempts, in order.
    #[must_use]
    pub fn endpoints(&self) -> Vec<String> {
        self.state.lock().endpoints.clone()
    }

    fn next_outcome(&self, endpoint: &str) -> ConnectOutcome {
        let mut state = self.state.lock();
        state.endpoints.push(endpoint.to_string());
        match state.script.pop_front() {
            Some(outcome) => outcome,
            None => state.fallback.clone(),
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, TransportError> {
        match self.next_outcome(endpoint) {
            ConnectOutcome::Accept => {
                let (to_server, from_client) = mpsc::unbounded_channel();
                let (to_client, from_server) = mpsc::unbounded_channel();

                self.peers
                    .send(MemoryPeer {
                        to_client: Some(to_client),
                        from_client,
                    })
                    .map_err(|_| TransportError::Connect("memory server dropped".to_string()))?;

                Ok(Box::new(MemoryTransport {
                    to_server: Some(to_server),
                    from_server,
                }))
            }
            ConnectOutcome::Refuse(message) => Err(TransportError::Connect(message)),
            ConnectOutcome::Stall => std::future::pending().await,
        }
    }
}

impl MemoryServer {
    /// Wait for the next accepted connection.
    ///
    /// Returns `None` once every connector clone has been dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }

    /// Take an already accepted connection without waiting.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.peers.try_recv().ok()
    }
}

/// Server end of one loopback connection.
#[derive(Debug)]
pub struct MemoryPeer {
    to_client: Option<mpsc::UnboundedSender<String>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Push a raw text frame to the client. Returns `false` if the client is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client
            .as_ref()
            .is_some_and(|tx| tx.send(text.into()).is_ok())
    }

    /// Push a JSON frame to the client. Returns `false` if the client is gone
    /// or the value cannot be serialized.
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> bool {
        serde_json::to_string(value).is_ok_and(|text| self.send_text(text))
    }

    /// Wait for the next frame from the client. `None` once the client closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Take the next frame from the client without waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Wait for the next frame and decode it as a subscription frame.
    pub async fn recv_frame(&mut self) -> Option<OutboundFrame> {
        let text = self.recv().await?;
        serde_json::from_str(&text).ok()
    }

    /// Close the connection from the server side.
    pub fn close(&mut self) {
        self.to_client = None;
    }
}

struct MemoryTransport {
    to_server: Option<mpsc::UnboundedSender<String>>,
    from_server: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let tx = self.to_server.as_ref().ok_or(TransportError::Closed)?;
        tx.send(text).map_err(|_| TransportError::Send("peer dropped".to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.from_server.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.to_server = None;
        self.from_server.close();
    }
}
