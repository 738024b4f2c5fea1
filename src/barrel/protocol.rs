//! Barrel wire protocol.
//!
//! Endpoint paths and the DTOs exchanged between barrels, the dispatcher and
//! crawlers. Everything is JSON over HTTP; a transport-level failure is the
//! only error a peer ever observes.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::types::{PageRecord, SearchResult};

// --- API Endpoints ---

/// Conjunctive term search.
pub const ENDPOINT_SEARCH: &str = "/search";
/// Crawler multicast target: apply one crawled page.
pub const ENDPOINT_UPDATE_INDEX: &str = "/index/update";
/// Backlink lookup for a single URL.
pub const ENDPOINT_BACKLINKS: &str = "/backlinks";
/// One-line index/Bloom statistics for the dispatcher digest.
pub const ENDPOINT_STATS: &str = "/stats";
/// Full inverted-index export (peer sync only).
pub const ENDPOINT_EXPORT_INDEX: &str = "/export/index";
/// Full backlink-map export (peer sync only).
pub const ENDPOINT_EXPORT_BACKLINKS: &str = "/export/backlinks";
/// Full page-metadata export (peer sync only).
pub const ENDPOINT_EXPORT_PAGES: &str = "/export/pages";
/// Dispatcher pushes its URL-queue snapshot here.
pub const ENDPOINT_QUEUE_BACKUP: &str = "/queue/backup";
/// A restarting dispatcher pulls the last snapshot from here.
pub const ENDPOINT_QUEUE_RESTORE: &str = "/queue/restore";

// --- Data Transfer Objects ---

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchTermsRequest {
    /// Lower-cased query terms; order is preserved but irrelevant.
    pub terms: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

/// One crawled page, fanned out to every barrel by a crawler.
///
/// Applying the same request twice is indistinguishable from applying it
/// once, which is what makes the multicast retry loop safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateIndexRequest {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub terms: HashSet<String>,
    pub outgoing_links: HashSet<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BacklinksQuery {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BacklinksResponse {
    pub links: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BarrelStatsResponse {
    pub stats: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IndexExportResponse {
    pub entries: HashMap<String, HashSet<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PageExportResponse {
    pub entries: HashMap<String, PageRecord>,
}
