//! Block graph: owns the monitored blocks and applies state transitions.

use chrono::Utc;

use super::block::{Block, BlockId, CheckResult, MonitorState, Snapshot};
use super::history::HistoryLevel;

/// Fixed set of monitored blocks with their declared dependency edges and the
/// current best-known state of each.
///
/// All 8 blocks are created once and live for the owning engine's lifetime.
/// The graph itself is not synchronized; callers guard it with a mutex and
/// never hold the lock across an await point.
#[derive(Debug, Clone)]
pub struct BlockGraph {
    blocks: Snapshot,
}

impl Default for BlockGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockGraph {
    pub fn new() -> Self {
        let mut blocks = Snapshot::new();
        for id in BlockId::CHECK_ORDER {
            blocks.insert(id, Block::new(id));
        }
        Self { blocks }
    }

    pub fn block(&self, id: BlockId) -> &Block {
        // Every id is inserted at construction.
        &self.blocks[&id]
    }

    /// Scan `id`'s dependencies in declaration order and return the title of
    /// the first whose state is not OK, or None if all are OK.
    pub fn failed_dependency(&self, id: BlockId) -> Option<&'static str> {
        id.dependencies()
            .iter()
            .find(|dep| self.blocks[*dep].state != MonitorState::Ok)
            .map(|dep| dep.title())
    }

    /// Apply a checker result to a block.
    ///
    /// Writes state/detail/last_checked_at/last_error, updates last_ok_at on
    /// OK, and appends a history entry only when the state changed since the
    /// previous transition (edge-triggered, so an unchanging FAIL does not
    /// spam the history even while volatile details like heartbeat ages or
    /// playback positions vary tick to tick). The fingerprint additionally
    /// suppresses consecutive duplicates.
    pub fn transition(&mut self, id: BlockId, result: CheckResult) {
        let block = self.blocks.get_mut(&id).expect("block exists");
        let previous = block.state;
        let now = Utc::now();

        block.state = result.state;
        block.detail = result.detail.clone();
        block.last_checked_at = Some(now);
        block.last_error = result.error.clone();
        if result.state == MonitorState::Ok {
            block.last_ok_at = Some(now);
        }

        if result.state == previous {
            return;
        }
        let level = match result.state {
            MonitorState::Ok => HistoryLevel::Ok,
            MonitorState::Fail => HistoryLevel::Fail,
            _ => HistoryLevel::Info,
        };
        let message = if result.detail.is_empty() {
            format!("{} -> {}", previous, result.state)
        } else {
            format!("{} -> {}: {}", previous, result.state, result.detail)
        };
        block
            .history
            .record_fingerprinted(result.fingerprint(), level, message);
    }

    /// Append a history entry directly, outside the transition path.
    ///
    /// Used for connection-attempt and negotiation-failure notes.
    pub fn append_history(&mut self, id: BlockId, level: HistoryLevel, message: impl Into<String>) {
        self.blocks
            .get_mut(&id)
            .expect("block exists")
            .history
            .push(level, message);
    }

    /// Empty one block's history log.
    pub fn clear_history(&mut self, id: BlockId) {
        self.blocks.get_mut(&id).expect("block exists").history.clear();
    }

    /// Deep copy of every block, keyed by id. Always exactly 8 entries.
    pub fn snapshot(&self) -> Snapshot {
        self.blocks.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_has_exactly_eight_entries() {
        let graph = BlockGraph::new();
        assert_eq!(graph.snapshot().len(), 8);
    }

    #[test]
    fn test_snapshot_is_a_deep_copy() {
        let mut graph = BlockGraph::new();
        let snapshot = graph.snapshot();
        graph.transition(BlockId::BackendHealthy, CheckResult::ok("healthy"));
        // The earlier snapshot is unaffected by the transition.
        assert_eq!(
            snapshot[&BlockId::BackendHealthy].state,
            MonitorState::NotStarted
        );
    }

    #[test]
    fn test_failed_dependency_returns_first_unhealthy_title() {
        let mut graph = BlockGraph::new();
        // Signaling starts NOT_STARTED, so publisher is blocked by it.
        assert_eq!(
            graph.failed_dependency(BlockId::PublisherPageLoaded),
            Some("Signaling Relay Reachable")
        );

        graph.transition(BlockId::SignalingRelayReachable, CheckResult::ok("open"));
        assert_eq!(graph.failed_dependency(BlockId::PublisherPageLoaded), None);

        // No dependencies means never blocked.
        assert_eq!(graph.failed_dependency(BlockId::BackendHealthy), None);
    }

    #[test]
    fn test_transition_updates_bookkeeping() {
        let mut graph = BlockGraph::new();
        graph.transition(
            BlockId::BackendHealthy,
            CheckResult::fail("probe failed").with_error("timeout"),
        );

        let block = graph.block(BlockId::BackendHealthy);
        assert_eq!(block.state, MonitorState::Fail);
        assert_eq!(block.detail, "probe failed");
        assert_eq!(block.last_error.as_deref(), Some("timeout"));
        assert!(block.last_checked_at.is_some());
        assert!(block.last_ok_at.is_none());

        graph.transition(BlockId::BackendHealthy, CheckResult::ok("healthy"));
        let block = graph.block(BlockId::BackendHealthy);
        assert!(block.last_ok_at.is_some());
        assert!(block.last_error.is_none());
    }

    #[test]
    fn test_transition_history_is_edge_triggered() {
        let mut graph = BlockGraph::new();
        let result = CheckResult::fail("relay down").with_error("connection refused");

        graph.transition(BlockId::SignalingRelayReachable, result.clone());
        graph.transition(BlockId::SignalingRelayReachable, result.clone());
        graph.transition(BlockId::SignalingRelayReachable, result);
        // Identical results produce exactly one entry.
        assert_eq!(graph.block(BlockId::SignalingRelayReachable).history.len(), 1);

        graph.transition(BlockId::SignalingRelayReachable, CheckResult::ok("open"));
        assert_eq!(graph.block(BlockId::SignalingRelayReachable).history.len(), 2);
        let last = graph
            .block(BlockId::SignalingRelayReachable)
            .history
            .last()
            .unwrap()
            .clone();
        assert_eq!(last.level, HistoryLevel::Ok);
        assert!(last.message.contains("FAIL -> OK"));
    }

    #[test]
    fn test_unchanging_state_with_volatile_detail_records_once() {
        let mut graph = BlockGraph::new();
        // A stale heartbeat reports a different age every tick.
        for age in [5001, 5050, 5100, 5150, 5200] {
            graph.transition(
                BlockId::PublisherPageLoaded,
                CheckResult::fail(format!("heartbeat stale ({}ms)", age)),
            );
        }
        assert_eq!(graph.block(BlockId::PublisherPageLoaded).history.len(), 1);

        // Same for a playback position that advances while staying OK.
        graph.transition(BlockId::VideoRendering, CheckResult::ok("playing at 1.5s"));
        graph.transition(BlockId::VideoRendering, CheckResult::ok("playing at 2.0s"));
        graph.transition(BlockId::VideoRendering, CheckResult::ok("playing at 2.5s"));
        assert_eq!(graph.block(BlockId::VideoRendering).history.len(), 1);
    }

    #[test]
    fn test_clear_history() {
        let mut graph = BlockGraph::new();
        graph.append_history(BlockId::CameraActive, HistoryLevel::Debug, "note");
        assert_eq!(graph.block(BlockId::CameraActive).history.len(), 1);
        graph.clear_history(BlockId::CameraActive);
        assert!(graph.block(BlockId::CameraActive).history.is_empty());
    }
}
