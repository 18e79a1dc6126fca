//! Signaling relay client.
//!
//! Owns the single signaling socket connection, parses inbound protocol
//! envelopes, and routes them:
//!
//! ```text
//! ┌────────────┐  text frames  ┌──────────────────┐
//! │ relay (ws) │──────────────▶│ SignalingClient   │
//! └────────────┘               │  pump task        │
//!       ▲                      │   ├─ heartbeat ──▶ fact cell (state/error/heartbeat)
//!       │ send()               │   ├─ offer ──────▶ peer channel
//!       └──────────────────────│   └─ candidate ──▶ peer channel
//!                              └──────────────────┘
//! ```
//!
//! Inbound frames are processed as they arrive, independent of the engine's
//! tick clock; their effects become visible to the next tick's checkers.

mod envelope;
mod transport;

pub use envelope::{CameraStatus, Envelope};
pub use transport::{
    ChannelRemote, ChannelTransport, PendingTransport, SignalingConnection, SignalingError,
    SignalingTransport, UnreachableTransport, WsTransport,
};

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::data::{BlockGraph, BlockId, HistoryLevel};

/// Lifecycle state of the signaling socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketState {
    /// No connection attempt has been made yet.
    #[default]
    Idle,
    Connecting,
    Open,
    Closed,
    Failed,
}

/// The most recent publisher heartbeat.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    pub received_at: Instant,
    pub camera: Option<CameraStatus>,
}

/// A signaling message bound for the peer negotiator.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerBound {
    Offer { sdp: String },
    Candidate(serde_json::Value),
}

#[derive(Debug, Default)]
struct SignalingShared {
    state: SocketState,
    last_error: Option<String>,
    last_heartbeat: Option<Heartbeat>,
}

/// Client owning the single signaling socket connection.
///
/// The connection itself lives in a spawned pump task; the client records
/// socket state, the last error, and the last heartbeat in a shared fact
/// cell read by the checkers on the next tick.
pub struct SignalingClient {
    url: String,
    transport: Arc<dyn SignalingTransport>,
    graph: Arc<Mutex<BlockGraph>>,
    peer_tx: Mutex<mpsc::UnboundedSender<PeerBound>>,
    shared: Arc<Mutex<SignalingShared>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SignalingClient {
    pub fn new(
        url: String,
        transport: Arc<dyn SignalingTransport>,
        graph: Arc<Mutex<BlockGraph>>,
        peer_tx: mpsc::UnboundedSender<PeerBound>,
    ) -> Self {
        Self {
            url,
            transport,
            graph,
            peer_tx: Mutex::new(peer_tx),
            shared: Arc::new(Mutex::new(SignalingShared::default())),
            outbound: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Ensure a signaling connection exists.
    ///
    /// No-op when the socket is already open or still connecting; otherwise
    /// drops any stale handle and spawns a fresh connect-and-pump task. One
    /// attempt per call; the poll interval provides the retry spacing.
    pub fn ensure_connection(&self) {
        {
            let shared = self.shared.lock();
            if matches!(shared.state, SocketState::Open | SocketState::Connecting) {
                return;
            }
        }

        if let Some(stale) = self.task.lock().take() {
            stale.abort();
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        *self.outbound.lock() = Some(out_tx);
        self.shared.lock().state = SocketState::Connecting;

        info!(url = %self.url, "connecting to signaling relay");
        self.graph.lock().append_history(
            BlockId::SignalingRelayReachable,
            HistoryLevel::Info,
            format!("connecting to {}", self.url),
        );

        let handle = tokio::spawn(run_connection(
            self.url.clone(),
            Arc::clone(&self.transport),
            Arc::clone(&self.shared),
            self.peer_tx.lock().clone(),
            out_rx,
        ));
        *self.task.lock() = Some(handle);
    }

    /// Replace the peer-bound message sender.
    ///
    /// Connections spawned afterwards route offers/candidates to the new
    /// receiver; used when the owning engine re-creates its dispatch channel
    /// on restart.
    pub(crate) fn set_peer_sender(&self, peer_tx: mpsc::UnboundedSender<PeerBound>) {
        *self.peer_tx.lock() = peer_tx;
    }

    /// Send an envelope over the socket. No-op unless the socket is open.
    pub fn send(&self, envelope: &Envelope) {
        if self.shared.lock().state != SocketState::Open {
            trace!(?envelope, "dropping outbound envelope, socket not open");
            return;
        }
        let text = match serde_json::to_string(envelope) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "failed to encode outbound envelope");
                return;
            }
        };
        if let Some(tx) = self.outbound.lock().as_ref() {
            let _ = tx.send(text);
        }
    }

    pub fn state(&self) -> SocketState {
        self.shared.lock().state
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().last_error.clone()
    }

    pub fn last_heartbeat(&self) -> Option<Heartbeat> {
        self.shared.lock().last_heartbeat.clone()
    }

    /// Age of the most recent heartbeat, if any was ever received.
    pub fn heartbeat_age(&self) -> Option<Duration> {
        self.shared
            .lock()
            .last_heartbeat
            .as_ref()
            .map(|hb| hb.received_at.elapsed())
    }

    /// Close the connection and stop the pump task.
    pub fn close(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        *self.outbound.lock() = None;
        let mut shared = self.shared.lock();
        if shared.state != SocketState::Idle {
            shared.state = SocketState::Closed;
        }
    }

    #[cfg(test)]
    pub(crate) fn inject_heartbeat(&self, camera: Option<CameraStatus>, age: Duration) {
        self.shared.lock().last_heartbeat = Some(Heartbeat {
            received_at: Instant::now() - age,
            camera,
        });
    }
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

/// Connect and pump the socket until it closes or errors.
async fn run_connection(
    url: String,
    transport: Arc<dyn SignalingTransport>,
    shared: Arc<Mutex<SignalingShared>>,
    peer_tx: mpsc::UnboundedSender<PeerBound>,
    mut out_rx: mpsc::UnboundedReceiver<String>,
) {
    let mut conn = match transport.connect(&url).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(url = %url, error = %e, "signaling connect failed");
            let mut shared = shared.lock();
            shared.state = SocketState::Failed;
            shared.last_error = Some(e.to_string());
            return;
        }
    };

    info!(url = %url, "signaling socket open");
    {
        let mut shared = shared.lock();
        shared.state = SocketState::Open;
        shared.last_error = None;
    }

    loop {
        tokio::select! {
            outbound = out_rx.recv() => match outbound {
                Some(text) => {
                    if let Err(e) = conn.send(text).await {
                        warn!(error = %e, "signaling send failed");
                        let mut shared = shared.lock();
                        shared.state = SocketState::Failed;
                        shared.last_error = Some(e.to_string());
                        break;
                    }
                }
                // Client dropped its sender; we are shutting down.
                None => break,
            },
            frame = conn.recv() => match frame {
                Some(Ok(text)) => handle_frame(&text, &shared, &peer_tx),
                Some(Err(e)) => {
                    warn!(error = %e, "signaling socket error");
                    let mut shared = shared.lock();
                    shared.state = SocketState::Failed;
                    shared.last_error = Some(e.to_string());
                    break;
                }
                None => {
                    debug!("signaling socket closed by remote");
                    let mut shared = shared.lock();
                    shared.state = SocketState::Closed;
                    shared.last_error = Some("connection closed".to_string());
                    break;
                }
            },
        }
    }
}

/// Parse and route one inbound text frame. Unparseable frames are dropped.
fn handle_frame(
    text: &str,
    shared: &Mutex<SignalingShared>,
    peer_tx: &mpsc::UnboundedSender<PeerBound>,
) {
    let envelope = match serde_json::from_str::<Envelope>(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            trace!(error = %e, "dropping unparseable signaling frame");
            return;
        }
    };

    match envelope {
        Envelope::PublisherHeartbeat { camera } => {
            trace!(?camera, "publisher heartbeat");
            shared.lock().last_heartbeat = Some(Heartbeat {
                received_at: Instant::now(),
                camera,
            });
        }
        Envelope::Offer { sdp } => {
            debug!("offer received from publisher");
            let _ = peer_tx.send(PeerBound::Offer { sdp });
        }
        Envelope::Candidate { candidate } => {
            trace!("remote candidate received");
            let _ = peer_tx.send(PeerBound::Candidate(candidate));
        }
        // The monitor is the answering side; an echoed answer carries no
        // new information.
        Envelope::Answer { .. } => trace!("ignoring answer frame"),
    }
}
