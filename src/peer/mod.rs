//! Peer negotiation.
//!
//! The negotiator answers inbound offers, forwards/consumes ICE candidates,
//! and exposes two facts the checkers read: negotiation progress
//! (offer-seen / answer-sent) and whether a live remote video track has been
//! observed. One peer session is created lazily per monitoring session, not
//! per negotiation.

pub mod render;
pub mod session;

#[cfg(feature = "native-rtc")]
pub mod native;

pub use render::{ManualRenderTarget, NullRenderTarget, RenderReadiness, RenderTarget};
pub use session::{
    IceConnectionState, PeerConnectionState, PeerError, PeerEvent, PeerSession,
    PeerSessionFactory, RemoteTrack, TrackKind, UnsupportedSessionFactory,
};

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::data::{BlockGraph, BlockId, HistoryLevel};
use crate::signaling::{Envelope, SignalingClient};

/// Negotiation progress flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NegotiationFlags {
    pub offer_seen: bool,
    pub answer_sent: bool,
}

#[derive(Debug, Default)]
struct PeerShared {
    flags: NegotiationFlags,
    remote_track_live: bool,
    last_render_error: Option<String>,
}

/// Owns the single peer session and the offer/answer/candidate flow.
pub struct PeerNegotiator {
    factory: Arc<dyn PeerSessionFactory>,
    signaling: Arc<SignalingClient>,
    graph: Arc<Mutex<BlockGraph>>,
    render: Arc<dyn RenderTarget>,
    shared: Arc<Mutex<PeerShared>>,
    session: Mutex<Option<Arc<dyn PeerSession>>>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl PeerNegotiator {
    pub fn new(
        factory: Arc<dyn PeerSessionFactory>,
        signaling: Arc<SignalingClient>,
        graph: Arc<Mutex<BlockGraph>>,
        render: Arc<dyn RenderTarget>,
    ) -> Self {
        Self {
            factory,
            signaling,
            graph,
            render,
            shared: Arc::new(Mutex::new(PeerShared::default())),
            session: Mutex::new(None),
            event_task: Mutex::new(None),
        }
    }

    /// Handle an inbound offer: ensure the session, apply the offer, send
    /// the answer, flip the answer-sent flag.
    ///
    /// Any failure records a FAIL history entry on the offer/answer block
    /// and leaves negotiation incomplete; it is retried only when a new
    /// offer arrives.
    pub async fn handle_offer(&self, sdp: String) {
        self.shared.lock().flags.offer_seen = true;

        let session = match self.ensure_session() {
            Ok(session) => session,
            Err(e) => {
                self.record_negotiation_failure("session creation", &e);
                return;
            }
        };

        match session.apply_offer(&sdp).await {
            Ok(answer) => {
                self.signaling.send(&Envelope::Answer { sdp: answer });
                self.shared.lock().flags.answer_sent = true;
                info!("answered publisher offer");
            }
            Err(e) => self.record_negotiation_failure("offer/answer", &e),
        }
    }

    /// Consume a remote ICE candidate. Candidates arriving before a peer
    /// connection exists are dropped.
    pub async fn add_candidate(&self, candidate: serde_json::Value) {
        let session = match self.session.lock().clone() {
            Some(session) => session,
            None => {
                debug!("dropping candidate, no peer connection yet");
                return;
            }
        };
        if let Err(e) = session.add_candidate(candidate).await {
            debug!(error = %e, "remote candidate rejected");
        }
    }

    /// Lazily create the single session for this monitoring run.
    fn ensure_session(&self) -> Result<Arc<dyn PeerSession>, PeerError> {
        let mut guard = self.session.lock();
        if let Some(session) = guard.as_ref() {
            return Ok(Arc::clone(session));
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let session = self.factory.create(event_tx)?;
        *guard = Some(Arc::clone(&session));

        let handle = tokio::spawn(run_events(
            event_rx,
            Arc::clone(&self.signaling),
            Arc::clone(&self.shared),
            Arc::clone(&self.render),
        ));
        *self.event_task.lock() = Some(handle);

        Ok(session)
    }

    fn record_negotiation_failure(&self, step: &str, error: &PeerError) {
        warn!(step, error = %error, "negotiation failed");
        self.graph.lock().append_history(
            BlockId::OfferAnswerCompleted,
            HistoryLevel::Fail,
            format!("{} failed: {}", step, error),
        );
    }

    pub fn flags(&self) -> NegotiationFlags {
        self.shared.lock().flags
    }

    #[cfg(test)]
    pub(crate) fn set_flags(&self, flags: NegotiationFlags) {
        self.shared.lock().flags = flags;
    }

    pub fn has_session(&self) -> bool {
        self.session.lock().is_some()
    }

    /// True once a live remote video track has been observed.
    pub fn remote_track_live(&self) -> bool {
        self.shared.lock().remote_track_live
    }

    /// Attach/playback failure recorded by the event pump, if any.
    pub fn last_render_error(&self) -> Option<String> {
        self.shared.lock().last_render_error.clone()
    }

    pub fn connection_state(&self) -> Option<PeerConnectionState> {
        self.session.lock().as_ref().map(|s| s.connection_state())
    }

    pub fn ice_state(&self) -> Option<IceConnectionState> {
        self.session.lock().as_ref().map(|s| s.ice_state())
    }

    /// Close the session and stop the event pump.
    pub async fn close(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            session.close().await;
        }
        if let Some(task) = self.event_task.lock().take() {
            task.abort();
        }
    }
}

/// Pump session events: forward local candidates over signaling, record
/// remote tracks, and hand media to the render target.
async fn run_events(
    mut events: mpsc::UnboundedReceiver<PeerEvent>,
    signaling: Arc<SignalingClient>,
    shared: Arc<Mutex<PeerShared>>,
    render: Arc<dyn RenderTarget>,
) {
    while let Some(event) = events.recv().await {
        match event {
            PeerEvent::LocalCandidate(candidate) => {
                signaling.send(&Envelope::Candidate { candidate });
            }
            PeerEvent::RemoteTrack(track) => {
                info!(id = %track.id, kind = ?track.kind, live = track.live, "remote track");
                if track.kind == TrackKind::Video && track.live {
                    shared.lock().remote_track_live = true;
                }
                match render.attach(&track) {
                    Ok(()) => shared.lock().last_render_error = None,
                    // Surfaces as a detail on the video-rendering block.
                    Err(e) => {
                        warn!(error = %e, "render attach failed");
                        shared.lock().last_render_error = Some(e);
                    }
                }
            }
        }
    }
}
