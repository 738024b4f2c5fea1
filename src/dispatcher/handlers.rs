//! Dispatcher API handlers.

use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use crate::barrel::protocol::{AckResponse, BacklinksQuery, BacklinksResponse, SearchResponse};

use super::protocol::*;
use super::service::Dispatcher;

/// Assembles the full dispatcher service surface.
pub fn router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route(ENDPOINT_SUBMIT_URL, post(handle_submit_url))
        .route(ENDPOINT_SEARCH, get(handle_search))
        .route(ENDPOINT_BACKLINKS, get(handle_backlinks))
        .route(ENDPOINT_STATISTICS, get(handle_statistics))
        .route(ENDPOINT_NEXT_URL, post(handle_next_url))
        .route(ENDPOINT_SUBSCRIBE, post(handle_subscribe))
        .route(ENDPOINT_UNSUBSCRIBE, post(handle_unsubscribe))
        .layer(Extension(dispatcher))
}

async fn handle_submit_url(
    Extension(dispatcher): Extension<Dispatcher>,
    Json(req): Json<SubmitUrlRequest>,
) -> Json<AckResponse> {
    dispatcher.submit_url(&req.url);
    Json(AckResponse { success: true })
}

async fn handle_search(
    Extension(dispatcher): Extension<Dispatcher>,
    Query(query): Query<SearchQuery>,
) -> (StatusCode, Json<SearchResponse>) {
    match dispatcher.search(&query.q).await {
        Ok(results) => (StatusCode::OK, Json(SearchResponse { results })),
        Err(e) => {
            tracing::error!("Search failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(SearchResponse {
                    results: Vec::new(),
                }),
            )
        }
    }
}

async fn handle_backlinks(
    Extension(dispatcher): Extension<Dispatcher>,
    Query(query): Query<BacklinksQuery>,
) -> (StatusCode, Json<BacklinksResponse>) {
    match dispatcher.get_backlinks(&query.url).await {
        Ok(links) => (StatusCode::OK, Json(BacklinksResponse { links })),
        Err(e) => {
            tracing::error!("Backlink lookup failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(BacklinksResponse { links: Vec::new() }),
            )
        }
    }
}

async fn handle_statistics(
    Extension(dispatcher): Extension<Dispatcher>,
) -> Json<StatisticsResponse> {
    Json(StatisticsResponse {
        digest: dispatcher.build_statistics().await,
    })
}

async fn handle_next_url(
    Extension(dispatcher): Extension<Dispatcher>,
) -> Json<NextUrlResponse> {
    Json(NextUrlResponse {
        url: dispatcher.next_url(),
    })
}

async fn handle_subscribe(
    Extension(dispatcher): Extension<Dispatcher>,
    Json(req): Json<SubscribeRequest>,
) -> Json<AckResponse> {
    dispatcher.subscribe(&req.callback_url).await;
    Json(AckResponse { success: true })
}

async fn handle_unsubscribe(
    Extension(dispatcher): Extension<Dispatcher>,
    Json(req): Json<SubscribeRequest>,
) -> Json<AckResponse> {
    dispatcher.unsubscribe(&req.callback_url);
    Json(AckResponse { success: true })
}
