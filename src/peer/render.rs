//! Render target: where the received media ends up.
//!
//! The negotiator is the only writer (attach/detach); checkers only read
//! render-progress facts.

use parking_lot::Mutex;

use super::session::RemoteTrack;

/// Readiness of the attached media source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderReadiness {
    /// No media source attached.
    #[default]
    NoSource,
    /// A source is attached but has not buffered enough data yet.
    Buffering,
    /// Enough data buffered to sample playback progress.
    Ready,
}

/// Abstract media sink for the incoming remote track.
pub trait RenderTarget: Send + Sync {
    /// Attach the incoming media and attempt playback.
    ///
    /// An error here surfaces as a detail on the video-rendering block; it
    /// is never propagated further.
    fn attach(&self, track: &RemoteTrack) -> Result<(), String>;

    /// Detach any attached media source.
    fn detach(&self);

    fn readiness(&self) -> RenderReadiness;

    /// Current playback position in seconds.
    fn position(&self) -> f64;
}

/// Render target with no real sink behind it.
///
/// Used by the headless CLI: media is accepted but never buffers, so the
/// video-rendering block reports the attach state only.
#[derive(Debug, Default)]
pub struct NullRenderTarget;

impl RenderTarget for NullRenderTarget {
    fn attach(&self, _track: &RemoteTrack) -> Result<(), String> {
        Ok(())
    }

    fn detach(&self) {}

    fn readiness(&self) -> RenderReadiness {
        RenderReadiness::NoSource
    }

    fn position(&self) -> f64 {
        0.0
    }
}

/// Manually scriptable render target for tests and demos.
#[derive(Debug, Default)]
pub struct ManualRenderTarget {
    inner: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    readiness: RenderReadiness,
    position: f64,
    attached: Option<String>,
    fail_attach: Option<String>,
}

impl ManualRenderTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `attach` fail with the given message.
    pub fn fail_attach_with(&self, message: impl Into<String>) {
        self.inner.lock().fail_attach = Some(message.into());
    }

    pub fn set_readiness(&self, readiness: RenderReadiness) {
        self.inner.lock().readiness = readiness;
    }

    pub fn set_position(&self, position: f64) {
        self.inner.lock().position = position;
    }

    /// Advance the playback position, as a playing video element would.
    pub fn advance(&self, seconds: f64) {
        self.inner.lock().position += seconds;
    }

    pub fn attached_track(&self) -> Option<String> {
        self.inner.lock().attached.clone()
    }
}

impl RenderTarget for ManualRenderTarget {
    fn attach(&self, track: &RemoteTrack) -> Result<(), String> {
        let mut inner = self.inner.lock();
        if let Some(message) = inner.fail_attach.take() {
            return Err(message);
        }
        inner.attached = Some(track.id.clone());
        if inner.readiness == RenderReadiness::NoSource {
            inner.readiness = RenderReadiness::Buffering;
        }
        Ok(())
    }

    fn detach(&self) {
        let mut inner = self.inner.lock();
        inner.attached = None;
        inner.readiness = RenderReadiness::NoSource;
        inner.position = 0.0;
    }

    fn readiness(&self) -> RenderReadiness {
        self.inner.lock().readiness
    }

    fn position(&self) -> f64 {
        self.inner.lock().position
    }
}
