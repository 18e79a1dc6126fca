//! Peer session backend over a real WebRTC stack (`native-rtc` feature).
//!
//! Creates the underlying peer connection lazily on the first offer, wires
//! its ICE-candidate and track callbacks into [`PeerEvent`]s, and answers
//! offers with a recvonly video transceiver.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

use super::session::{
    IceConnectionState, PeerConnectionState, PeerError, PeerEvent, PeerSession,
    PeerSessionFactory, RemoteTrack, TrackKind,
};

/// Factory producing sessions backed by a real peer connection.
#[derive(Debug, Clone)]
pub struct NativeRtcFactory {
    /// STUN server URLs handed to the ICE agent.
    pub stun_servers: Vec<String>,
}

impl Default for NativeRtcFactory {
    fn default() -> Self {
        Self {
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
        }
    }
}

impl PeerSessionFactory for NativeRtcFactory {
    fn create(
        &self,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerSession>, PeerError> {
        Ok(Arc::new(NativeSession {
            stun_servers: self.stun_servers.clone(),
            events,
            pc: Mutex::new(None),
        }))
    }
}

struct NativeSession {
    stun_servers: Vec<String>,
    events: mpsc::UnboundedSender<PeerEvent>,
    pc: Mutex<Option<Arc<RTCPeerConnection>>>,
}

impl NativeSession {
    async fn ensure_pc(&self) -> Result<Arc<RTCPeerConnection>, PeerError> {
        if let Some(pc) = self.pc.lock().clone() {
            return Ok(pc);
        }

        let mut media = MediaEngine::default();
        media
            .register_default_codecs()
            .map_err(|e| PeerError::Negotiation(e.to_string()))?;
        let registry = register_default_interceptors(Registry::new(), &mut media)
            .map_err(|e| PeerError::Negotiation(e.to_string()))?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: self.stun_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(|e| PeerError::Negotiation(e.to_string()))?,
        );
        pc.add_transceiver_from_kind(RTPCodecType::Video, None)
            .await
            .map_err(|e| PeerError::Negotiation(e.to_string()))?;

        let events = self.events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = events.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                let Ok(init) = candidate.to_json() else { return };
                if let Ok(value) = serde_json::to_value(&init) {
                    let _ = events.send(PeerEvent::LocalCandidate(value));
                }
            })
        }));

        let events = self.events.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let events = events.clone();
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Video => TrackKind::Video,
                    _ => TrackKind::Audio,
                };
                // A track delivered by the stack is live by construction.
                let _ = events.send(PeerEvent::RemoteTrack(RemoteTrack {
                    id: track.id(),
                    kind,
                    live: true,
                }));
            })
        }));

        *self.pc.lock() = Some(Arc::clone(&pc));
        Ok(pc)
    }
}

#[async_trait]
impl PeerSession for NativeSession {
    async fn apply_offer(&self, sdp: &str) -> Result<String, PeerError> {
        let pc = self.ensure_pc().await?;

        let offer = RTCSessionDescription::offer(sdp.to_string())
            .map_err(|e| PeerError::Sdp(e.to_string()))?;
        pc.set_remote_description(offer)
            .await
            .map_err(|e| PeerError::Negotiation(format!("set remote: {}", e)))?;

        let answer = pc
            .create_answer(None)
            .await
            .map_err(|e| PeerError::Negotiation(format!("create answer: {}", e)))?;
        pc.set_local_description(answer)
            .await
            .map_err(|e| PeerError::Negotiation(format!("set local: {}", e)))?;

        let local = pc
            .local_description()
            .await
            .ok_or_else(|| PeerError::Negotiation("no local description".to_string()))?;
        Ok(local.sdp)
    }

    async fn add_candidate(&self, candidate: serde_json::Value) -> Result<(), PeerError> {
        let pc = self
            .pc
            .lock()
            .clone()
            .ok_or_else(|| PeerError::Candidate("no peer connection".to_string()))?;
        let init: RTCIceCandidateInit = serde_json::from_value(candidate)
            .map_err(|e| PeerError::Candidate(e.to_string()))?;
        pc.add_ice_candidate(init)
            .await
            .map_err(|e| PeerError::Candidate(e.to_string()))
    }

    fn connection_state(&self) -> PeerConnectionState {
        let Some(pc) = self.pc.lock().clone() else {
            return PeerConnectionState::New;
        };
        match pc.connection_state() {
            RTCPeerConnectionState::Connecting => PeerConnectionState::Connecting,
            RTCPeerConnectionState::Connected => PeerConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => PeerConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => PeerConnectionState::Failed,
            RTCPeerConnectionState::Closed => PeerConnectionState::Closed,
            _ => PeerConnectionState::New,
        }
    }

    fn ice_state(&self) -> IceConnectionState {
        let Some(pc) = self.pc.lock().clone() else {
            return IceConnectionState::New;
        };
        match pc.ice_connection_state() {
            RTCIceConnectionState::Checking => IceConnectionState::Checking,
            RTCIceConnectionState::Connected => IceConnectionState::Connected,
            RTCIceConnectionState::Completed => IceConnectionState::Completed,
            RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
            RTCIceConnectionState::Failed => IceConnectionState::Failed,
            RTCIceConnectionState::Closed => IceConnectionState::Closed,
            _ => IceConnectionState::New,
        }
    }

    async fn close(&self) {
        let pc = self.pc.lock().take();
        if let Some(pc) = pc {
            if let Err(e) = pc.close().await {
                debug!(error = %e, "peer connection close failed");
            }
        }
    }
}
