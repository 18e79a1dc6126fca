//! The monitor engine façade.
//!
//! Owns the block graph, the signaling client, the peer negotiator, and the
//! checker set; runs the polling loop; applies the dependency-override rule;
//! and publishes immutable snapshots to the caller-supplied sink.
//!
//! ```text
//! tick ──▶ signaling checker (may mutate the connection)
//!      ──▶ remaining checkers in CHECK_ORDER, each first asked
//!          "is a dependency unhealthy?" and short-circuited if so
//!      ──▶ BlockGraph transitions + history
//!      ──▶ deep-copied Snapshot ──▶ on_update sink
//! ```
//!
//! Side channel: inbound signaling messages (heartbeat, offer, candidate)
//! are handled by spawned tasks as they arrive; their effects are visible to
//! the next tick's checkers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::checkers::CheckerSet;
use crate::config::MonitorConfig;
use crate::data::{BlockGraph, BlockId, CheckResult, HistoryLevel, Snapshot};
use crate::health::{BackendHealth, HealthFetcher, HttpFetcher};
use crate::peer::{PeerNegotiator, PeerSessionFactory, RenderTarget};
use crate::signaling::{PeerBound, SignalingClient, SignalingTransport, WsTransport};

/// Maximum length of a compacted checker error string.
const MAX_ERROR_CHARS: usize = 160;

/// Snapshot consumer.
pub type UpdateSink = Arc<dyn Fn(Snapshot) + Send + Sync>;

/// Builder for [`Engine`].
///
/// Defaults: WebSocket signaling transport, reqwest health fetcher, a null
/// render target, and the native peer backend when the `native-rtc` feature
/// is enabled (otherwise sessions cannot be created and inbound offers
/// record a negotiation failure).
pub struct EngineBuilder {
    config: MonitorConfig,
    on_update: Option<UpdateSink>,
    render: Option<Arc<dyn RenderTarget>>,
    transport: Option<Arc<dyn SignalingTransport>>,
    session_factory: Option<Arc<dyn PeerSessionFactory>>,
    fetcher: Option<Arc<dyn HealthFetcher>>,
}

impl EngineBuilder {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            on_update: None,
            render: None,
            transport: None,
            session_factory: None,
            fetcher: None,
        }
    }

    pub fn on_update(mut self, sink: impl Fn(Snapshot) + Send + Sync + 'static) -> Self {
        self.on_update = Some(Arc::new(sink));
        self
    }

    pub fn render_target(mut self, render: Arc<dyn RenderTarget>) -> Self {
        self.render = Some(render);
        self
    }

    pub fn signaling_transport(mut self, transport: Arc<dyn SignalingTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn session_factory(mut self, factory: Arc<dyn PeerSessionFactory>) -> Self {
        self.session_factory = Some(factory);
        self
    }

    pub fn health_fetcher(mut self, fetcher: Arc<dyn HealthFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn build(self) -> Engine {
        let config = self.config;
        let graph = Arc::new(Mutex::new(BlockGraph::new()));
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(WsTransport) as Arc<dyn SignalingTransport>);
        let signaling = Arc::new(SignalingClient::new(
            config.signaling_url.clone(),
            transport,
            Arc::clone(&graph),
            peer_tx,
        ));

        let render = self
            .render
            .unwrap_or_else(|| Arc::new(crate::peer::NullRenderTarget) as Arc<dyn RenderTarget>);

        let session_factory = self.session_factory.unwrap_or_else(default_session_factory);
        let negotiator = Arc::new(PeerNegotiator::new(
            session_factory,
            Arc::clone(&signaling),
            Arc::clone(&graph),
            Arc::clone(&render),
        ));

        let fetcher = self
            .fetcher
            .unwrap_or_else(|| {
                Arc::new(HttpFetcher::new(config.health_timeout())) as Arc<dyn HealthFetcher>
            });
        let health = BackendHealth::new(fetcher, config.backend_base_url.clone());

        let checkers = Arc::new(CheckerSet::new(
            Arc::clone(&signaling),
            Arc::clone(&negotiator),
            Arc::clone(&render),
            health,
            config.heartbeat_stale_after(),
        ));

        Engine {
            config,
            graph,
            signaling,
            negotiator,
            checkers,
            render,
            on_update: self.on_update.unwrap_or_else(|| Arc::new(|_| {})),
            running: AtomicBool::new(false),
            tick_task: Mutex::new(None),
            dispatch_task: Mutex::new(None),
            peer_rx: Mutex::new(Some(peer_rx)),
        }
    }
}

fn default_session_factory() -> Arc<dyn PeerSessionFactory> {
    #[cfg(feature = "native-rtc")]
    {
        Arc::new(crate::peer::native::NativeRtcFactory::default())
    }
    #[cfg(not(feature = "native-rtc"))]
    {
        Arc::new(crate::peer::UnsupportedSessionFactory)
    }
}

/// Connectivity monitor engine.
pub struct Engine {
    config: MonitorConfig,
    graph: Arc<Mutex<BlockGraph>>,
    signaling: Arc<SignalingClient>,
    negotiator: Arc<PeerNegotiator>,
    checkers: Arc<CheckerSet>,
    render: Arc<dyn RenderTarget>,
    on_update: UpdateSink,
    running: AtomicBool,
    tick_task: Mutex<Option<JoinHandle<()>>>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
    peer_rx: Mutex<Option<mpsc::UnboundedReceiver<PeerBound>>>,
}

impl Engine {
    pub fn builder(config: MonitorConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Start the polling loop. Idempotent: a second call while already
    /// running is a no-op. Runs one tick immediately, then on the fixed
    /// poll interval. Restarting after [`stop`](Engine::stop) resumes
    /// monitoring and negotiation.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(interval_ms = self.config.poll_interval_ms, "monitor started");

        // Route inbound signaling messages to the negotiator from a single
        // dispatch task rather than from arbitrary callback contexts. On a
        // restart the previous receiver died with its task, so a fresh
        // channel is threaded back into the signaling client.
        let mut peer_rx = match self.peer_rx.lock().take() {
            Some(peer_rx) => peer_rx,
            None => {
                let (peer_tx, peer_rx) = mpsc::unbounded_channel();
                self.signaling.set_peer_sender(peer_tx);
                peer_rx
            }
        };
        let negotiator = Arc::clone(&self.negotiator);
        let handle = tokio::spawn(async move {
            while let Some(message) = peer_rx.recv().await {
                match message {
                    PeerBound::Offer { sdp } => negotiator.handle_offer(sdp).await,
                    PeerBound::Candidate(candidate) => negotiator.add_candidate(candidate).await,
                }
            }
        });
        *self.dispatch_task.lock() = Some(handle);

        let engine = Arc::clone(self);
        let interval = self.config.poll_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                // The first tick fires immediately.
                ticker.tick().await;
                engine.run_once().await;
            }
        });
        *self.tick_task.lock() = Some(handle);
    }

    /// Stop the polling loop and release long-lived resources. Idempotent.
    ///
    /// An in-flight checker is not forcibly cancelled; the health fetch
    /// carries its own timeout.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.tick_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.dispatch_task.lock().take() {
            task.abort();
        }
        self.signaling.close();
        self.negotiator.close().await;
        self.render.detach();
        info!("monitor stopped");
    }

    /// Run a single evaluation pass over all blocks and publish a snapshot.
    pub async fn run_once(&self) {
        for id in BlockId::CHECK_ORDER {
            // The override decision sees the freshly updated state of blocks
            // evaluated earlier in this same tick.
            let blocked = self.graph.lock().failed_dependency(id);
            let result = match blocked {
                Some(title) => {
                    CheckResult::not_started(format!("blocked by dependency: {}", title))
                }
                None => match self.checkers.check(id).await {
                    Ok(result) => result,
                    // Safety net: a misbehaving checker never aborts the tick.
                    Err(e) => {
                        let compacted = compact_error(&e.to_string());
                        debug!(block = %id, error = %compacted, "checker errored");
                        CheckResult::fail(format!("checker error: {}", compacted))
                            .with_error(compacted)
                    }
                },
            };
            self.graph.lock().transition(id, result);
        }
        self.publish();
    }

    /// Deep copy of the current state, outside the tick cadence.
    pub fn get_snapshot(&self) -> Snapshot {
        self.graph.lock().snapshot()
    }

    /// Empty one block's history log and republish a snapshot.
    pub fn clear_history(&self, id: BlockId) {
        self.graph.lock().clear_history(id);
        self.publish();
    }

    /// Append a history entry directly. Intended for tests and manual
    /// diagnostics.
    pub fn add_history_entry(&self, id: BlockId, level: HistoryLevel, message: impl Into<String>) {
        self.graph.lock().append_history(id, level, message);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn publish(&self) {
        let snapshot = self.graph.lock().snapshot();
        (self.on_update)(snapshot);
    }
}

/// Collapse whitespace and cap the length of an error string.
fn compact_error(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(MAX_ERROR_CHARS) {
        Some((idx, _)) => collapsed[..idx].to_string(),
        None => collapsed,
    }
}
