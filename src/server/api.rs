//! JSON API over the image pipeline.
//!
//! - GET /health
//! - GET /v1/resolve?uri=..&tier=..
//! - POST /v1/images/render
//! - POST /v1/images/detail
//! - POST /v1/preload
//! - DELETE /v1/cache
//! - GET /v1/cache/stats
//! - GET /metrics

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::cache::tier::{QualityRequest, Tier};
use crate::cache::tier_cache::CacheStats;
use crate::detail::{DetailProps, DetailVisual};
use crate::pipeline::{ClearReport, ImagePipeline, PreloadReport};
use crate::view::{Attempt, ImageProps, Visual};

/// Application state shared across handlers.
pub struct AppState {
    pub pipeline: Arc<ImagePipeline>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(pipeline: Arc<ImagePipeline>) -> Self {
        Self {
            pipeline,
            start_time: Instant::now(),
        }
    }
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/resolve", get(resolve))
        .route("/v1/images/render", post(render))
        .route("/v1/images/detail", post(detail))
        .route("/v1/preload", post(preload))
        .route("/v1/cache", delete(clear_cache))
        .route("/v1/cache/stats", get(cache_stats))
        .route("/metrics", get(metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

// ─── Request/Response Types ────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolvedTier {
    pub tier: Tier,
    pub uri: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub uri: String,
    pub tier: Tier,
    pub resolved: String,
    /// Requested tier followed by every cheaper tier.
    pub chain: Vec<ResolvedTier>,
}

#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub request_id: String,
    pub cache_key: String,
    pub visual: Visual,
    pub loader_state: &'static str,
    pub attempts: Vec<Attempt>,
}

#[derive(Debug, Serialize)]
pub struct DetailResponse {
    pub request_id: String,
    pub full_uri: String,
    pub visual: DetailVisual,
    pub thumbnail: Visual,
    pub loader_state: &'static str,
    /// Full-image attempts.
    pub attempts: Vec<Attempt>,
}

#[derive(Debug, Deserialize)]
pub struct PreloadRequest {
    pub uris: Vec<String>,
    #[serde(default)]
    pub tier: Option<Tier>,
}

#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    pub enabled: bool,
    pub ttl_secs: u64,
    #[serde(flatten)]
    pub stats: CacheStats,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn resolve(
    State(state): State<Arc<AppState>>,
    Query(request): Query<QualityRequest>,
) -> Json<ResolveResponse> {
    let chain: Vec<ResolvedTier> = state
        .pipeline
        .resolver()
        .resolve_chain(&request)
        .into_iter()
        .map(|(tier, uri)| ResolvedTier { tier, uri })
        .collect();
    let resolved = chain.first().map(|t| t.uri.clone()).unwrap_or_default();

    Json(ResolveResponse {
        uri: request.canonical_uri,
        tier: request.tier,
        resolved,
        chain,
    })
}

async fn render(
    State(state): State<Arc<AppState>>,
    Json(props): Json<ImageProps>,
) -> Json<RenderResponse> {
    let request_id = Uuid::new_v4().to_string();
    info!(
        request_id = request_id,
        uri = props.canonical_uri(),
        cache_key = props.cache_key(),
        "Render request"
    );

    let view = state.pipeline.render(props).await;
    Json(RenderResponse {
        request_id,
        cache_key: view.props().cache_key().to_string(),
        visual: view.visual(),
        loader_state: view.loader_state().name(),
        attempts: view.attempts().to_vec(),
    })
}

/// Open a detail view and load its full image.
async fn detail(
    State(state): State<Arc<AppState>>,
    Json(props): Json<DetailProps>,
) -> Json<DetailResponse> {
    let request_id = Uuid::new_v4().to_string();
    info!(
        request_id = request_id,
        thumbnail = props.thumbnail.canonical_uri(),
        full_uri = props.full_uri.as_deref().unwrap_or(""),
        "Detail request"
    );

    let mut view = state.pipeline.render_detail(props).await;
    let visual = view.load_full().await;
    Json(DetailResponse {
        request_id,
        full_uri: view.full_uri().to_string(),
        visual,
        thumbnail: view.thumbnail().visual(),
        loader_state: view.loader_state().name(),
        attempts: view.attempts().to_vec(),
    })
}

async fn preload(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PreloadRequest>,
) -> Json<PreloadReport> {
    let request_id = Uuid::new_v4().to_string();
    info!(request_id = request_id, uris = req.uris.len(), "Preload request");
    Json(state.pipeline.preload(&req.uris, req.tier).await)
}

async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<ClearReport> {
    Json(state.pipeline.clear_cache().await)
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheStatsResponse> {
    let cache = state.pipeline.cache();
    Json(CacheStatsResponse {
        enabled: cache.is_enabled(),
        ttl_secs: cache.ttl().as_secs(),
        stats: cache.stats(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, StatusCode> {
    let body = state.pipeline.metrics().encode().map_err(|e| {
        error!(error = %e, "Failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
