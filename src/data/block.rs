//! Core data model: monitored blocks, their states, and snapshots.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::history::HistoryLog;

/// Identifier for one monitored pipeline stage.
///
/// The pipeline forms two independent chains:
///
/// ```text
/// signaling-relay-reachable
///   ├─▶ publisher-page-loaded ─▶ camera-active
///   └─▶ offer-answer-completed ─▶ peer-connection-connected
///         ─▶ remote-track-received ─▶ video-rendering
///
/// backend-healthy        (standalone)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockId {
    SignalingRelayReachable,
    PublisherPageLoaded,
    CameraActive,
    OfferAnswerCompleted,
    PeerConnectionConnected,
    RemoteTrackReceived,
    VideoRendering,
    BackendHealthy,
}

impl BlockId {
    /// All block ids in evaluation order (parents before children).
    ///
    /// The signaling checker must run first within a tick; it alone mutates
    /// the signaling connection.
    pub const CHECK_ORDER: [BlockId; 8] = [
        BlockId::SignalingRelayReachable,
        BlockId::PublisherPageLoaded,
        BlockId::CameraActive,
        BlockId::OfferAnswerCompleted,
        BlockId::PeerConnectionConnected,
        BlockId::RemoteTrackReceived,
        BlockId::VideoRendering,
        BlockId::BackendHealthy,
    ];

    /// Human-readable title, used in block details when a dependency blocks
    /// a downstream stage.
    pub fn title(&self) -> &'static str {
        match self {
            BlockId::SignalingRelayReachable => "Signaling Relay Reachable",
            BlockId::PublisherPageLoaded => "Publisher Page Loaded",
            BlockId::CameraActive => "Camera Active",
            BlockId::OfferAnswerCompleted => "Offer/Answer Completed",
            BlockId::PeerConnectionConnected => "Peer Connection Connected",
            BlockId::RemoteTrackReceived => "Remote Track Received",
            BlockId::VideoRendering => "Video Rendering",
            BlockId::BackendHealthy => "Backend Healthy",
        }
    }

    /// Declared dependencies, in the order they are scanned.
    pub fn dependencies(&self) -> &'static [BlockId] {
        match self {
            BlockId::SignalingRelayReachable => &[],
            BlockId::PublisherPageLoaded => &[BlockId::SignalingRelayReachable],
            BlockId::CameraActive => &[BlockId::PublisherPageLoaded],
            BlockId::OfferAnswerCompleted => &[BlockId::SignalingRelayReachable],
            BlockId::PeerConnectionConnected => &[BlockId::OfferAnswerCompleted],
            BlockId::RemoteTrackReceived => &[BlockId::PeerConnectionConnected],
            BlockId::VideoRendering => &[BlockId::RemoteTrackReceived],
            BlockId::BackendHealthy => &[],
        }
    }

    /// Stable kebab-case name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockId::SignalingRelayReachable => "signaling-relay-reachable",
            BlockId::PublisherPageLoaded => "publisher-page-loaded",
            BlockId::CameraActive => "camera-active",
            BlockId::OfferAnswerCompleted => "offer-answer-completed",
            BlockId::PeerConnectionConnected => "peer-connection-connected",
            BlockId::RemoteTrackReceived => "remote-track-received",
            BlockId::VideoRendering => "video-rendering",
            BlockId::BackendHealthy => "backend-healthy",
        }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a monitored block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitorState {
    /// Initial value, and the forced value when a dependency is unhealthy.
    NotStarted,
    Checking,
    Ok,
    Fail,
    /// Reserved for future manual pause; never produced by checkers.
    Disabled,
}

impl MonitorState {
    pub fn symbol(&self) -> &'static str {
        match self {
            MonitorState::NotStarted => "NOT_STARTED",
            MonitorState::Checking => "CHECKING",
            MonitorState::Ok => "OK",
            MonitorState::Fail => "FAIL",
            MonitorState::Disabled => "DISABLED",
        }
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Outcome of one checker invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub state: MonitorState,
    pub detail: String,
    pub error: Option<String>,
}

impl CheckResult {
    pub fn new(state: MonitorState, detail: impl Into<String>) -> Self {
        Self {
            state,
            detail: detail.into(),
            error: None,
        }
    }

    pub fn ok(detail: impl Into<String>) -> Self {
        Self::new(MonitorState::Ok, detail)
    }

    pub fn checking(detail: impl Into<String>) -> Self {
        Self::new(MonitorState::Checking, detail)
    }

    pub fn not_started(detail: impl Into<String>) -> Self {
        Self::new(MonitorState::NotStarted, detail)
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self::new(MonitorState::Fail, detail)
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Derived key over `(state, detail, error)` used to suppress duplicate
    /// consecutive history entries.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}|{}|{}",
            self.state,
            self.detail,
            self.error.as_deref().unwrap_or("")
        )
    }
}

/// One monitored pipeline stage and its bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub title: String,
    pub state: MonitorState,
    pub detail: String,
    pub dependencies: Vec<BlockId>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_ok_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub history: HistoryLog,
}

impl Block {
    /// Create a block in its initial state.
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            title: id.title().to_string(),
            state: MonitorState::NotStarted,
            detail: String::new(),
            dependencies: id.dependencies().to_vec(),
            last_checked_at: None,
            last_ok_at: None,
            last_error: None,
            history: HistoryLog::new(),
        }
    }
}

/// Complete mapping from every [`BlockId`] to its current [`Block`].
///
/// Always has exactly 8 entries; handed to consumers as a deep copy so the
/// engine's live state cannot be mutated externally.
pub type Snapshot = BTreeMap<BlockId, Block>;
