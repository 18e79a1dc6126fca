//! Wire envelopes exchanged over the signaling relay.
//!
//! Every frame is a JSON object tagged by a `type` field. Frames that do not
//! parse into a recognized envelope are dropped by the client.

use serde::{Deserialize, Serialize};

/// Camera status carried inside a publisher heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraStatus {
    #[serde(default)]
    pub active: bool,
    #[serde(rename = "trackReadyState", default)]
    pub track_ready_state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl CameraStatus {
    /// True when the publisher reports an active camera with a live track.
    pub fn is_live(&self) -> bool {
        self.active && self.track_ready_state == "live"
    }
}

/// Tagged signaling envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Periodic liveness message from the publishing device.
    PublisherHeartbeat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        camera: Option<CameraStatus>,
    },
    /// Session description offered by the publisher.
    Offer { sdp: String },
    /// Session description answered by this monitor.
    Answer { sdp: String },
    /// ICE candidate from either side; kept opaque and forwarded verbatim.
    Candidate { candidate: serde_json::Value },
}
