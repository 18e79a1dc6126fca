//! Transport abstraction for the signaling socket.
//!
//! Mirrors the data-source seam used elsewhere in the crate: the client is
//! written against [`SignalingTransport`] and production code plugs in
//! [`WsTransport`], while tests and demos use [`ChannelTransport`] or
//! [`PendingTransport`].

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Errors surfaced by a signaling transport.
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Failed to establish the connection.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The established socket errored.
    #[error("socket error: {0}")]
    Socket(String),
}

/// Factory for signaling connections.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn SignalingConnection>, SignalingError>;
}

/// One established signaling connection.
#[async_trait]
pub trait SignalingConnection: Send {
    /// Send one text frame.
    async fn send(&mut self, text: String) -> Result<(), SignalingError>;

    /// Receive the next inbound text frame.
    ///
    /// Returns `None` when the peer closed the connection cleanly.
    async fn recv(&mut self) -> Option<Result<String, SignalingError>>;
}

/// Production transport over a WebSocket.
#[derive(Debug, Default)]
pub struct WsTransport;

#[async_trait]
impl SignalingTransport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn SignalingConnection>, SignalingError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| SignalingError::Connect(e.to_string()))?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl SignalingConnection for WsConnection {
    async fn send(&mut self, text: String) -> Result<(), SignalingError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| SignalingError::Socket(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, SignalingError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                // Pings are answered by the library; other frames carry no
                // signaling payload.
                Ok(_) => continue,
                Err(e) => return Some(Err(SignalingError::Socket(e.to_string()))),
            }
        }
    }
}

/// In-memory transport backed by channels.
///
/// [`ChannelTransport::pair`] returns the transport plus a [`ChannelRemote`]
/// acting as the far side of the socket. The transport hands out its single
/// connection on the first `connect`; later attempts fail as if the relay
/// went away, until [`refill`](ChannelTransport::refill) installs a new one.
#[derive(Debug)]
pub struct ChannelTransport {
    connection: parking_lot::Mutex<Option<ChannelConnection>>,
}

/// The relay side of a [`ChannelTransport`].
#[derive(Debug)]
pub struct ChannelRemote {
    /// Frames delivered to the client as inbound text.
    pub to_client: mpsc::UnboundedSender<String>,
    /// Frames the client sent outbound.
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl ChannelTransport {
    pub fn pair() -> (Self, ChannelRemote) {
        let transport = Self {
            connection: parking_lot::Mutex::new(None),
        };
        let remote = transport.refill();
        (transport, remote)
    }

    /// Install a fresh connection, as if the relay came back up. Returns the
    /// new remote side; the next `connect` hands out this connection.
    pub fn refill(&self) -> ChannelRemote {
        let (to_client, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, from_client) = mpsc::unbounded_channel();
        *self.connection.lock() = Some(ChannelConnection {
            inbound: inbound_rx,
            outbound: outbound_tx,
        });
        ChannelRemote {
            to_client,
            from_client,
        }
    }
}

#[async_trait]
impl SignalingTransport for ChannelTransport {
    async fn connect(&self, _url: &str) -> Result<Box<dyn SignalingConnection>, SignalingError> {
        match self.connection.lock().take() {
            Some(connection) => Ok(Box::new(connection)),
            None => Err(SignalingError::Connect("relay unavailable".to_string())),
        }
    }
}

#[derive(Debug)]
struct ChannelConnection {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl SignalingConnection for ChannelConnection {
    async fn send(&mut self, text: String) -> Result<(), SignalingError> {
        self.outbound
            .send(text)
            .map_err(|_| SignalingError::Socket("remote dropped".to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, SignalingError>> {
        self.inbound.recv().await.map(Ok)
    }
}

/// Transport whose `connect` never completes. Models a relay that accepts
/// the TCP handshake but never finishes the upgrade, leaving the client in
/// the connecting state.
#[derive(Debug, Default)]
pub struct PendingTransport;

#[async_trait]
impl SignalingTransport for PendingTransport {
    async fn connect(&self, _url: &str) -> Result<Box<dyn SignalingConnection>, SignalingError> {
        std::future::pending().await
    }
}

/// Transport whose `connect` always fails immediately.
#[derive(Debug, Default)]
pub struct UnreachableTransport;

#[async_trait]
impl SignalingTransport for UnreachableTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn SignalingConnection>, SignalingError> {
        Err(SignalingError::Connect(format!("no route to {}", url)))
    }
}
