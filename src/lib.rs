//! # camwatch
//!
//! A dependency-ordered connectivity monitor for a WebRTC camera pipeline.
//!
//! The monitor periodically re-evaluates the health of a multi-stage
//! pipeline (signaling relay → publisher heartbeat → camera activity →
//! offer/answer negotiation → peer connection → remote media track → render
//! progress, plus an independent backend health probe). Each stage is a
//! "block" with declared dependencies; an unhealthy dependency overrides the
//! downstream block's own checker result.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │  ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌──────────┐ │
//! │  │ tick loop│──▶│ checkers │──▶│ BlockGraph│──▶│ Snapshot │─┼─▶ on_update
//! │  └────┬─────┘   └──────────┘   └───────────┘   └──────────┘ │
//! │       │ reads facts from                                     │
//! │  ┌────▼──────────┐   ┌────────────────┐   ┌───────────────┐ │
//! │  │SignalingClient│◀─▶│ PeerNegotiator │──▶│ RenderTarget  │ │
//! │  │ (ws relay)    │   │ (offer/answer) │   │ (media sink)  │ │
//! │  └───────────────┘   └────────────────┘   └───────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`data`]**: block model, dependency graph, bounded de-duplicating
//!   history
//! - **[`signaling`]**: the signaling-socket client and wire envelopes
//! - **[`peer`]**: offer/answer negotiation over a pluggable session seam
//! - **[`checkers`]**: the eight per-block evaluation functions
//! - **[`health`]**: the backend `/health` probe with error classification
//! - **[`engine`]**: the façade that runs the polling loop and publishes
//!   snapshots
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use camwatch::{Engine, MonitorConfig};
//!
//! # tokio_test::block_on(async {
//! let config = MonitorConfig::default();
//! let engine = Arc::new(
//!     Engine::builder(config)
//!         .on_update(|snapshot| {
//!             for (id, block) in &snapshot {
//!                 println!("{}: {}", id, block.state);
//!             }
//!         })
//!         .build(),
//! );
//! engine.start();
//! # engine.stop().await;
//! # });
//! ```

pub mod checkers;
pub mod config;
pub mod data;
pub mod engine;
pub mod health;
pub mod peer;
pub mod signaling;

// Re-export main types for convenience
pub use config::MonitorConfig;
pub use data::{Block, BlockId, CheckResult, HistoryEntry, HistoryLevel, MonitorState, Snapshot};
pub use engine::{Engine, EngineBuilder, UpdateSink};
pub use health::{BackendHealth, FetchError, HealthFetcher, HttpFetcher};
pub use peer::{
    ManualRenderTarget, NullRenderTarget, PeerNegotiator, RenderReadiness, RenderTarget,
};
pub use signaling::{CameraStatus, Envelope, SignalingClient, SocketState};
