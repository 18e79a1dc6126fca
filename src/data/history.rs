//! Bounded, de-duplicating history log kept per monitored block.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of history entries retained per block.
const MAX_HISTORY_SIZE: usize = 200;

/// Maximum length of a single history message, in characters.
const MAX_MESSAGE_CHARS: usize = 220;

/// Severity of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HistoryLevel {
    Info,
    Ok,
    Fail,
    Debug,
}

/// A single timestamped event recorded against a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub level: HistoryLevel,
    pub message: String,
}

/// Bounded FIFO log of [`HistoryEntry`] values.
///
/// Entries beyond [`MAX_HISTORY_SIZE`] are evicted oldest-first. Consecutive
/// duplicate check results are suppressed via a fingerprint over
/// `(state, detail, error)` recorded by the caller (see
/// [`record_fingerprinted`](HistoryLog::record_fingerprinted)).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryLog {
    entries: VecDeque<HistoryEntry>,
    /// Fingerprint of the last recorded check result, used to suppress
    /// duplicate consecutive entries.
    #[serde(skip)]
    last_fingerprint: Option<String>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry unconditionally, evicting the oldest past the cap.
    pub fn push(&mut self, level: HistoryLevel, message: impl Into<String>) {
        let message = truncate_chars(&message.into(), MAX_MESSAGE_CHARS);
        self.entries.push_back(HistoryEntry {
            timestamp: Utc::now(),
            level,
            message,
        });
        while self.entries.len() > MAX_HISTORY_SIZE {
            self.entries.pop_front();
        }
    }

    /// Append an entry only if `fingerprint` differs from the fingerprint of
    /// the previous fingerprinted append.
    ///
    /// Returns true if an entry was recorded.
    pub fn record_fingerprinted(
        &mut self,
        fingerprint: String,
        level: HistoryLevel,
        message: impl Into<String>,
    ) -> bool {
        if self.last_fingerprint.as_deref() == Some(fingerprint.as_str()) {
            return false;
        }
        self.last_fingerprint = Some(fingerprint);
        self.push(level, message);
        true
    }

    /// Remove all entries and forget the duplicate-suppression fingerprint.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_fingerprint = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Most recent entry, if any.
    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }
}

/// Truncate a string to at most `max` characters on a char boundary.
fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_evicts_oldest() {
        let mut log = HistoryLog::new();
        for i in 0..205 {
            log.push(HistoryLevel::Info, format!("message {}", i));
        }
        assert_eq!(log.len(), 200);
        // The oldest 5 were evicted; entries remain in arrival order.
        assert_eq!(log.entries().next().unwrap().message, "message 5");
        assert_eq!(log.last().unwrap().message, "message 204");
    }

    #[test]
    fn test_message_truncated_to_220_chars() {
        let mut log = HistoryLog::new();
        log.push(HistoryLevel::Fail, "x".repeat(500));
        assert_eq!(log.last().unwrap().message.chars().count(), 220);
    }

    #[test]
    fn test_fingerprint_suppresses_duplicates() {
        let mut log = HistoryLog::new();
        assert!(log.record_fingerprinted("FAIL|down|io".into(), HistoryLevel::Fail, "down"));
        assert!(!log.record_fingerprinted("FAIL|down|io".into(), HistoryLevel::Fail, "down"));
        assert_eq!(log.len(), 1);

        // A different result records again.
        assert!(log.record_fingerprinted("OK|up|".into(), HistoryLevel::Ok, "up"));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_clear_resets_fingerprint() {
        let mut log = HistoryLog::new();
        log.record_fingerprinted("FAIL|down|".into(), HistoryLevel::Fail, "down");
        log.clear();
        assert!(log.is_empty());
        // Same fingerprint records again after a clear.
        assert!(log.record_fingerprinted("FAIL|down|".into(), HistoryLevel::Fail, "down"));
    }
}
