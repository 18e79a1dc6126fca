//! Data models for the connectivity monitor.
//!
//! ## Submodules
//!
//! - [`block`]: core model - block identifiers, states, check results, and
//!   the snapshot map handed to consumers
//! - [`graph`]: the [`BlockGraph`] that owns the blocks and applies
//!   edge-triggered state transitions
//! - [`history`]: bounded, de-duplicating per-block event log
//!
//! ## Data Flow
//!
//! ```text
//! CheckResult (from a checker)
//!        │
//!        ▼
//! BlockGraph::transition()
//!        │
//!        ├──▶ Block (state/detail/timestamps updated)
//!        │
//!        └──▶ HistoryLog (entry appended on state edge only)
//! ```

pub mod block;
pub mod graph;
pub mod history;

pub use block::{Block, BlockId, CheckResult, MonitorState, Snapshot};
pub use graph::BlockGraph;
pub use history::{HistoryEntry, HistoryLevel, HistoryLog};
