//! Per-block evaluation functions.
//!
//! Each checker reduces currently-known facts (socket state, heartbeat,
//! negotiation flags, session states, render progress, health probe) to a
//! [`CheckResult`]. Checkers convert every failure they can encounter into a
//! FAIL result; none is allowed to error past its own boundary. The engine
//! keeps a second catch-all per invocation as a safety net.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;

use crate::data::{BlockId, CheckResult};
use crate::health::BackendHealth;
use crate::peer::{
    IceConnectionState, PeerConnectionState, PeerNegotiator, RenderReadiness, RenderTarget,
};
use crate::signaling::{SignalingClient, SocketState};

/// The eight checkers, one per block.
pub struct CheckerSet {
    signaling: Arc<SignalingClient>,
    negotiator: Arc<PeerNegotiator>,
    render: Arc<dyn RenderTarget>,
    health: BackendHealth,
    heartbeat_stale_after: Duration,
    /// Playback position recorded on the previous tick; the rendering
    /// checker is the only one that depends on its own prior invocation.
    last_position: Mutex<Option<f64>>,
}

impl CheckerSet {
    pub fn new(
        signaling: Arc<SignalingClient>,
        negotiator: Arc<PeerNegotiator>,
        render: Arc<dyn RenderTarget>,
        health: BackendHealth,
        heartbeat_stale_after: Duration,
    ) -> Self {
        Self {
            signaling,
            negotiator,
            render,
            health,
            heartbeat_stale_after,
            last_position: Mutex::new(None),
        }
    }

    /// Evaluate one block. Dependencies are the engine's concern; this is
    /// only called when they are all OK.
    pub async fn check(&self, id: BlockId) -> Result<CheckResult> {
        let result = match id {
            BlockId::SignalingRelayReachable => self.check_signaling(),
            BlockId::PublisherPageLoaded => self.check_publisher(),
            BlockId::CameraActive => self.check_camera(),
            BlockId::OfferAnswerCompleted => self.check_offer_answer(),
            BlockId::PeerConnectionConnected => self.check_peer_connection(),
            BlockId::RemoteTrackReceived => self.check_remote_track(),
            BlockId::VideoRendering => self.check_rendering(),
            BlockId::BackendHealthy => self.health.probe().await,
        };
        Ok(result)
    }

    /// The one checker allowed to mutate the connection.
    fn check_signaling(&self) -> CheckResult {
        self.signaling.ensure_connection();
        match self.signaling.state() {
            SocketState::Idle | SocketState::Connecting => {
                CheckResult::checking("connecting to signaling relay")
            }
            SocketState::Open => CheckResult::ok("socket open"),
            SocketState::Closed | SocketState::Failed => {
                let error = self
                    .signaling
                    .last_error()
                    .unwrap_or_else(|| "socket closed".to_string());
                CheckResult::fail(error.clone()).with_error(error)
            }
        }
    }

    fn check_publisher(&self) -> CheckResult {
        match self.signaling.heartbeat_age() {
            None => CheckResult::fail("no heartbeat seen"),
            Some(age) if age > self.heartbeat_stale_after => {
                CheckResult::fail(format!("heartbeat stale ({}ms)", age.as_millis()))
            }
            Some(age) => CheckResult::ok(format!("heartbeat {}ms ago", age.as_millis())),
        }
    }

    fn check_camera(&self) -> CheckResult {
        let camera = self.signaling.last_heartbeat().and_then(|hb| hb.camera);
        match camera {
            Some(camera) if camera.is_live() => {
                let detail = match (camera.width, camera.height) {
                    (Some(w), Some(h)) => format!("camera live ({}x{})", w, h),
                    _ => "camera live".to_string(),
                };
                CheckResult::ok(detail)
            }
            _ => CheckResult::fail("camera inactive/not live"),
        }
    }

    /// Pure function of the two negotiation flags; failures surface on the
    /// peer-connection block instead, so this never FAILs.
    fn check_offer_answer(&self) -> CheckResult {
        let flags = self.negotiator.flags();
        match (flags.offer_seen, flags.answer_sent) {
            (false, false) => CheckResult::not_started("waiting for offer"),
            (true, false) => CheckResult::checking("offer seen, answer pending"),
            (false, true) => CheckResult::checking("answer sent, offer unseen"),
            (true, true) => CheckResult::ok("offer answered"),
        }
    }

    fn check_peer_connection(&self) -> CheckResult {
        let (Some(connection), Some(ice)) =
            (self.negotiator.connection_state(), self.negotiator.ice_state())
        else {
            return CheckResult::not_started("no peer connection yet");
        };

        let connected = connection == PeerConnectionState::Connected
            || ice == IceConnectionState::Connected
            || ice == IceConnectionState::Completed;
        let failed =
            connection == PeerConnectionState::Failed || ice == IceConnectionState::Failed;

        let detail = format!("connection {} / ice {}", connection, ice);
        if connected {
            CheckResult::ok(detail)
        } else if failed {
            CheckResult::fail(detail).with_error("peer connection failed")
        } else {
            CheckResult::checking(detail)
        }
    }

    /// Absence just means "not yet", so this never FAILs on its own.
    fn check_remote_track(&self) -> CheckResult {
        if self.negotiator.remote_track_live() {
            CheckResult::ok("live video track received")
        } else {
            CheckResult::not_started("no remote track yet")
        }
    }

    fn check_rendering(&self) -> CheckResult {
        if let Some(error) = self.negotiator.last_render_error() {
            return CheckResult::fail(format!("playback failed: {}", error)).with_error(error);
        }

        match self.render.readiness() {
            RenderReadiness::NoSource => CheckResult::not_started("no media source attached"),
            RenderReadiness::Buffering => CheckResult::checking("buffering"),
            RenderReadiness::Ready => {
                let position = self.render.position();
                let previous = self.last_position.lock().replace(position);
                let advanced = previous.is_some_and(|prev| position > prev);
                if advanced || position > 0.0 {
                    CheckResult::ok(format!("playing at {:.1}s", position))
                } else {
                    CheckResult::checking("waiting for frames")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BlockGraph, MonitorState};
    use crate::health::testing::StubFetcher;
    use crate::health::HealthFetcher;
    use crate::peer::fake::FakeSessionFactory;
    use crate::peer::{ManualRenderTarget, NegotiationFlags, PeerSessionFactory};
    use crate::signaling::{CameraStatus, ChannelTransport, PendingTransport, SignalingTransport};
    use tokio::sync::mpsc;

    struct Fixture {
        checkers: CheckerSet,
        signaling: Arc<SignalingClient>,
        negotiator: Arc<PeerNegotiator>,
        factory: Arc<FakeSessionFactory>,
        render: Arc<ManualRenderTarget>,
    }

    fn fixture(transport: Arc<dyn SignalingTransport>) -> Fixture {
        let (peer_tx, _peer_rx) = mpsc::unbounded_channel();
        let graph = Arc::new(Mutex::new(BlockGraph::new()));
        let signaling = Arc::new(SignalingClient::new(
            "mem://relay".to_string(),
            transport,
            Arc::clone(&graph),
            peer_tx,
        ));
        let factory = Arc::new(FakeSessionFactory::default());
        let render = Arc::new(ManualRenderTarget::new());
        let negotiator = Arc::new(PeerNegotiator::new(
            Arc::clone(&factory) as Arc<dyn PeerSessionFactory>,
            Arc::clone(&signaling),
            graph,
            Arc::clone(&render) as Arc<dyn RenderTarget>,
        ));
        let health = BackendHealth::new(
            Arc::new(StubFetcher::json_ok()) as Arc<dyn HealthFetcher>,
            Some("http://backend".to_string()),
        );
        let checkers = CheckerSet::new(
            Arc::clone(&signaling),
            Arc::clone(&negotiator),
            Arc::clone(&render) as Arc<dyn RenderTarget>,
            health,
            Duration::from_millis(5000),
        );
        Fixture {
            checkers,
            signaling,
            negotiator,
            factory,
            render,
        }
    }

    fn pending_fixture() -> Fixture {
        fixture(Arc::new(PendingTransport))
    }

    fn live_camera() -> CameraStatus {
        CameraStatus {
            active: true,
            track_ready_state: "live".to_string(),
            width: Some(640),
            height: Some(480),
        }
    }

    #[tokio::test]
    async fn test_signaling_checker_maps_socket_lifecycle() {
        let fx = pending_fixture();
        let result = fx.checkers.check(BlockId::SignalingRelayReachable).await.unwrap();
        assert_eq!(result.state, MonitorState::Checking);

        let (transport, _remote) = ChannelTransport::pair();
        let fx = fixture(Arc::new(transport));
        fx.checkers.check(BlockId::SignalingRelayReachable).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let result = fx.checkers.check(BlockId::SignalingRelayReachable).await.unwrap();
        assert_eq!(result.state, MonitorState::Ok);
    }

    #[tokio::test]
    async fn test_publisher_heartbeat_staleness() {
        let fx = pending_fixture();

        // Never seen a heartbeat.
        let result = fx.checkers.check(BlockId::PublisherPageLoaded).await.unwrap();
        assert_eq!(result.state, MonitorState::Fail);
        assert!(result.detail.contains("no heartbeat"));

        // Fresh heartbeat.
        fx.signaling
            .inject_heartbeat(Some(live_camera()), Duration::from_millis(100));
        let result = fx.checkers.check(BlockId::PublisherPageLoaded).await.unwrap();
        assert_eq!(result.state, MonitorState::Ok);

        // Stale heartbeat.
        fx.signaling
            .inject_heartbeat(Some(live_camera()), Duration::from_millis(5001));
        let result = fx.checkers.check(BlockId::PublisherPageLoaded).await.unwrap();
        assert_eq!(result.state, MonitorState::Fail);
        assert!(result.detail.contains("stale"));
    }

    #[tokio::test]
    async fn test_camera_checker_requires_active_and_live() {
        let fx = pending_fixture();

        fx.signaling
            .inject_heartbeat(Some(live_camera()), Duration::ZERO);
        let result = fx.checkers.check(BlockId::CameraActive).await.unwrap();
        assert_eq!(result.state, MonitorState::Ok);
        assert!(result.detail.contains("640x480"));

        let mut ended = live_camera();
        ended.track_ready_state = "ended".to_string();
        fx.signaling.inject_heartbeat(Some(ended), Duration::ZERO);
        let result = fx.checkers.check(BlockId::CameraActive).await.unwrap();
        assert_eq!(result.state, MonitorState::Fail);

        // Heartbeat without a camera payload.
        fx.signaling.inject_heartbeat(None, Duration::ZERO);
        let result = fx.checkers.check(BlockId::CameraActive).await.unwrap();
        assert_eq!(result.state, MonitorState::Fail);
        assert!(result.detail.contains("inactive"));
    }

    #[tokio::test]
    async fn test_offer_answer_truth_table() {
        let fx = pending_fixture();
        let cases = [
            ((false, false), MonitorState::NotStarted),
            ((true, false), MonitorState::Checking),
            ((false, true), MonitorState::Checking),
            ((true, true), MonitorState::Ok),
        ];
        for ((offer_seen, answer_sent), expected) in cases {
            fx.negotiator.set_flags(NegotiationFlags {
                offer_seen,
                answer_sent,
            });
            let result = fx.checkers.check(BlockId::OfferAnswerCompleted).await.unwrap();
            assert_eq!(
                result.state, expected,
                "flags ({}, {})",
                offer_seen, answer_sent
            );
        }
    }

    #[tokio::test]
    async fn test_peer_connection_states() {
        let fx = pending_fixture();

        let result = fx.checkers.check(BlockId::PeerConnectionConnected).await.unwrap();
        assert_eq!(result.state, MonitorState::NotStarted);

        fx.negotiator.handle_offer("v=0".to_string()).await;
        let session = fx.factory.session();

        // Fake session starts connecting/checking after the offer.
        let result = fx.checkers.check(BlockId::PeerConnectionConnected).await.unwrap();
        assert_eq!(result.state, MonitorState::Checking);

        session.state.lock().ice = IceConnectionState::Completed;
        let result = fx.checkers.check(BlockId::PeerConnectionConnected).await.unwrap();
        assert_eq!(result.state, MonitorState::Ok);

        session.state.lock().ice = IceConnectionState::Failed;
        let result = fx.checkers.check(BlockId::PeerConnectionConnected).await.unwrap();
        assert_eq!(result.state, MonitorState::Fail);
        assert_eq!(result.error.as_deref(), Some("peer connection failed"));
    }

    #[tokio::test]
    async fn test_remote_track_never_fails_on_its_own() {
        let fx = pending_fixture();
        let result = fx.checkers.check(BlockId::RemoteTrackReceived).await.unwrap();
        assert_eq!(result.state, MonitorState::NotStarted);
    }

    #[tokio::test]
    async fn test_rendering_progress_delta() {
        let fx = pending_fixture();

        let result = fx.checkers.check(BlockId::VideoRendering).await.unwrap();
        assert_eq!(result.state, MonitorState::NotStarted);

        fx.render.set_readiness(RenderReadiness::Buffering);
        let result = fx.checkers.check(BlockId::VideoRendering).await.unwrap();
        assert_eq!(result.state, MonitorState::Checking);

        // Ready but stuck at zero: waiting for frames.
        fx.render.set_readiness(RenderReadiness::Ready);
        let result = fx.checkers.check(BlockId::VideoRendering).await.unwrap();
        assert_eq!(result.state, MonitorState::Checking);
        assert!(result.detail.contains("waiting for frames"));

        // Position advanced since the previous tick.
        fx.render.advance(0.5);
        let result = fx.checkers.check(BlockId::VideoRendering).await.unwrap();
        assert_eq!(result.state, MonitorState::Ok);
    }

    #[tokio::test]
    async fn test_rendering_surfaces_playback_failure() {
        let fx = pending_fixture();
        fx.negotiator.handle_offer("v=0".to_string()).await;
        fx.render.fail_attach_with("autoplay rejected");
        fx.factory
            .session()
            .emit(crate::peer::PeerEvent::RemoteTrack(crate::peer::RemoteTrack {
                id: "cam-0".to_string(),
                kind: crate::peer::TrackKind::Video,
                live: true,
            }));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let result = fx.checkers.check(BlockId::VideoRendering).await.unwrap();
        assert_eq!(result.state, MonitorState::Fail);
        assert!(result.detail.contains("autoplay rejected"));
    }
}
