//! Bounded history of recent probe outcomes.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::probe::ProbeOutcome;

/// Number of outcomes retained.
pub const HISTORY_CAPACITY: usize = 5;

/// An outcome together with the time it was captured.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub outcome: ProbeOutcome,
    pub captured_at: DateTime<Utc>,
}

/// FIFO ring of the last [`HISTORY_CAPACITY`] outcomes, oldest first.
///
/// Once full, each insert drops the oldest entry.
#[derive(Debug, Clone)]
pub struct HistoryRing {
    entries: VecDeque<HistoryEntry>,
}

impl Default for HistoryRing {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryRing {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    /// Append an outcome, evicting the oldest entry if at capacity.
    pub fn record(&mut self, outcome: ProbeOutcome, captured_at: DateTime<Utc>) {
        if self.entries.len() >= HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            outcome,
            captured_at,
        });
    }

    /// Entries in insertion order, oldest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Most recent entry: the current outcome and when it was checked.
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
