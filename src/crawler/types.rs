use std::collections::HashSet;
use std::time::SystemTime;

use crate::barrel::protocol::UpdateIndexRequest;

/// Parsed content of one fetched page, as produced by a [`PageFetcher`].
///
/// `tokens` is the page's token stream in document order, lower-cased; the
/// worker derives both the term set and the snippet from it. `links` holds
/// the absolute URLs of outgoing anchors.
///
/// [`PageFetcher`]: super::fetch::PageFetcher
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub title: String,
    pub tokens: Vec<String>,
    pub links: HashSet<String>,
}

/// An index update that could not be delivered to a specific barrel.
/// Queued FIFO per barrel and replayed in order once the barrel is back.
#[derive(Debug, Clone)]
pub struct PendingUpdate {
    pub update: UpdateIndexRequest,
    pub queued_at: SystemTime,
}

impl PendingUpdate {
    pub fn new(update: UpdateIndexRequest) -> Self {
        Self {
            update,
            queued_at: SystemTime::now(),
        }
    }
}
