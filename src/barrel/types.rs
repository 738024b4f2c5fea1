use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single search hit, as shipped back to clients.
///
/// `relevance` is the number of known backlinks at search time; it is
/// recomputed on every query and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub relevance: u32,
}

/// Stored metadata for an indexed page. Overwritten wholesale whenever the
/// page is re-indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub title: String,
    pub snippet: String,
}

/// Point-in-time copy of the dispatcher's URL queue, replicated to every
/// barrel so a restarted dispatcher can pick up where it left off.
///
/// `pending` preserves FIFO order; `visited` is pure membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub pending: Vec<String>,
    pub visited: HashSet<String>,
}

impl QueueSnapshot {
    /// Total number of URLs covered; the dispatcher restores the snapshot
    /// that maximizes this.
    pub fn coverage(&self) -> usize {
        self.pending.len() + self.visited.len()
    }
}
