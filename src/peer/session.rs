//! Peer-session seam.
//!
//! The negotiator drives an abstract [`PeerSession`] so the monitor's
//! negotiation logic is independent of the WebRTC stack behind it. The
//! `native-rtc` feature plugs in a real peer connection; tests script the
//! seam directly.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors raised by a peer session.
#[derive(Debug, Error)]
pub enum PeerError {
    /// A session description was rejected.
    #[error("sdp rejected: {0}")]
    Sdp(String),

    /// A negotiation step failed (create/set answer, send).
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// An ICE candidate was rejected.
    #[error("candidate rejected: {0}")]
    Candidate(String),
}

/// Overall peer-connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerConnectionState {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// ICE transport connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IceConnectionState {
    #[default]
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for PeerConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeerConnectionState::New => "new",
            PeerConnectionState::Connecting => "connecting",
            PeerConnectionState::Connected => "connected",
            PeerConnectionState::Disconnected => "disconnected",
            PeerConnectionState::Failed => "failed",
            PeerConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

impl fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IceConnectionState::New => "new",
            IceConnectionState::Checking => "checking",
            IceConnectionState::Connected => "connected",
            IceConnectionState::Completed => "completed",
            IceConnectionState::Disconnected => "disconnected",
            IceConnectionState::Failed => "failed",
            IceConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Kind of a received media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A remote media track observed on the session.
#[derive(Debug, Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: TrackKind,
    /// True when the track reports a live ready-state.
    pub live: bool,
}

/// Events emitted by a session back to the negotiator.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A locally gathered ICE candidate to forward over signaling.
    LocalCandidate(serde_json::Value),
    /// A remote media track arrived.
    RemoteTrack(RemoteTrack),
}

/// One peer connection, driven by the negotiator.
#[async_trait]
pub trait PeerSession: Send + Sync {
    /// Apply a remote offer: set the remote description, create and set the
    /// local answer, and return the answer SDP.
    async fn apply_offer(&self, sdp: &str) -> Result<String, PeerError>;

    /// Consume a remote ICE candidate.
    async fn add_candidate(&self, candidate: serde_json::Value) -> Result<(), PeerError>;

    fn connection_state(&self) -> PeerConnectionState;

    fn ice_state(&self) -> IceConnectionState;

    async fn close(&self);
}

/// Creates one [`PeerSession`] per monitoring session.
pub trait PeerSessionFactory: Send + Sync {
    fn create(
        &self,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerSession>, PeerError>;
}

/// Factory for builds without a peer-connection backend.
///
/// Session creation fails, so an inbound offer records a negotiation failure
/// instead of answering. Enable the `native-rtc` feature for a real backend.
#[derive(Debug, Default)]
pub struct UnsupportedSessionFactory;

impl PeerSessionFactory for UnsupportedSessionFactory {
    fn create(
        &self,
        _events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerSession>, PeerError> {
        Err(PeerError::Negotiation(
            "no peer session backend configured".to_string(),
        ))
    }
}
