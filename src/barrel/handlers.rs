//! Barrel API handlers.
//!
//! Translate HTTP requests into `BarrelStore`/`BarrelNode` calls. Apart from
//! transport failures these endpoints never error: unknown terms and URLs
//! produce empty results.

use axum::extract::Query;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use std::sync::Arc;

use super::protocol::*;
use super::service::BarrelNode;
use super::types::QueueSnapshot;

/// Assembles the full barrel service surface.
pub fn router(node: Arc<BarrelNode>) -> Router {
    Router::new()
        .route(ENDPOINT_SEARCH, post(handle_search))
        .route(ENDPOINT_UPDATE_INDEX, post(handle_update_index))
        .route(ENDPOINT_BACKLINKS, get(handle_backlinks))
        .route(ENDPOINT_STATS, get(handle_stats))
        .route(ENDPOINT_EXPORT_INDEX, get(handle_export_index))
        .route(ENDPOINT_EXPORT_BACKLINKS, get(handle_export_backlinks))
        .route(ENDPOINT_EXPORT_PAGES, get(handle_export_pages))
        .route(ENDPOINT_QUEUE_BACKUP, post(handle_queue_backup))
        .route(ENDPOINT_QUEUE_RESTORE, get(handle_queue_restore))
        .layer(Extension(node))
}

async fn handle_search(
    Extension(node): Extension<Arc<BarrelNode>>,
    Json(req): Json<SearchTermsRequest>,
) -> Json<SearchResponse> {
    tracing::debug!("[{}] Search for {:?}", node.name, req.terms);
    Json(SearchResponse {
        results: node.store.search(&req.terms),
    })
}

async fn handle_update_index(
    Extension(node): Extension<Arc<BarrelNode>>,
    Json(req): Json<UpdateIndexRequest>,
) -> Json<AckResponse> {
    tracing::info!("[{}] Indexing {}", node.name, req.url);
    node.store.update_index(
        &req.url,
        &req.title,
        &req.snippet,
        &req.terms,
        &req.outgoing_links,
    );
    Json(AckResponse { success: true })
}

async fn handle_backlinks(
    Extension(node): Extension<Arc<BarrelNode>>,
    Query(query): Query<BacklinksQuery>,
) -> Json<BacklinksResponse> {
    Json(BacklinksResponse {
        links: node.store.backlinks_of(&query.url),
    })
}

async fn handle_stats(Extension(node): Extension<Arc<BarrelNode>>) -> Json<BarrelStatsResponse> {
    Json(BarrelStatsResponse {
        stats: node.store.stats_line(),
    })
}

async fn handle_export_index(
    Extension(node): Extension<Arc<BarrelNode>>,
) -> Json<IndexExportResponse> {
    Json(IndexExportResponse {
        entries: node.store.export_index(),
    })
}

async fn handle_export_backlinks(
    Extension(node): Extension<Arc<BarrelNode>>,
) -> Json<IndexExportResponse> {
    Json(IndexExportResponse {
        entries: node.store.export_backlinks(),
    })
}

async fn handle_export_pages(
    Extension(node): Extension<Arc<BarrelNode>>,
) -> Json<PageExportResponse> {
    Json(PageExportResponse {
        entries: node.store.export_pages(),
    })
}

async fn handle_queue_backup(
    Extension(node): Extension<Arc<BarrelNode>>,
    Json(snapshot): Json<QueueSnapshot>,
) -> Json<AckResponse> {
    tracing::debug!(
        "[{}] Queue backup: {} pending, {} visited",
        node.name,
        snapshot.pending.len(),
        snapshot.visited.len()
    );
    node.store_queue_backup(snapshot);
    Json(AckResponse { success: true })
}

async fn handle_queue_restore(Extension(node): Extension<Arc<BarrelNode>>) -> Json<QueueSnapshot> {
    Json(node.restore_queue())
}
