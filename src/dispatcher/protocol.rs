//! Dispatcher wire protocol.
//!
//! Endpoints for clients (search, backlinks, statistics, subscriptions) and
//! crawlers (URL submission and handout). Search and backlink responses
//! reuse the barrel DTOs since the dispatcher only reorders them.

use serde::{Deserialize, Serialize};

// --- API Endpoints ---

/// Submit a URL for indexing; duplicates are silently accepted and dropped.
pub const ENDPOINT_SUBMIT_URL: &str = "/url/submit";
/// Full-text search across the cluster.
pub const ENDPOINT_SEARCH: &str = "/search";
/// Backlink lookup, routed to one barrel.
pub const ENDPOINT_BACKLINKS: &str = "/backlinks";
/// Current statistics digest, built synchronously.
pub const ENDPOINT_STATISTICS: &str = "/statistics";
/// Crawler work handout: pops the queue head.
pub const ENDPOINT_NEXT_URL: &str = "/crawl/next";
/// Register a callback URL for pushed digest updates.
pub const ENDPOINT_SUBSCRIBE: &str = "/stats/subscribe";
/// Remove a previously registered callback URL.
pub const ENDPOINT_UNSUBSCRIBE: &str = "/stats/unsubscribe";

// --- Data Transfer Objects ---

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitUrlRequest {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Raw query string; the dispatcher lower-cases and splits it.
    pub q: String,
}

/// Reply to a crawler's work request. `None` means the queue is empty and
/// the crawler should back off.
#[derive(Debug, Serialize, Deserialize)]
pub struct NextUrlResponse {
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatisticsResponse {
    pub digest: String,
}

/// A subscriber is identified by the HTTP URL its callback listens on;
/// registering the same URL twice is a no-op.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub callback_url: String,
}

/// Body POSTed to a subscriber's callback URL whenever the digest changes.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsPush {
    pub digest: String,
}
