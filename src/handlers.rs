use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::aggregation::AggregationPipeline;
use crate::errors::AppError;
use crate::models::{CompInput, CompRecord, HomeInput, HomeRecord, RangeToken, ResolvedPoint};

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Aggregation and record operations over the configured store and geocoder.
    pub pipeline: AggregationPipeline,
}

/// Routes behind the rate limiter. Health is mounted separately.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/homes", get(list_homes))
        .route("/sold-homes", get(list_sold_homes).post(create_sold_home))
        .route("/api/comps", get(list_comps).post(create_comp))
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "hawthorn-map-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

#[derive(Debug, Deserialize)]
pub struct HomesQuery {
    pub range: Option<String>,
}

/// GET /api/homes?range={all|6months|1year|2years}
///
/// Map points for sold homes inside the window. Homes that cannot be geocoded
/// are left out; the call only fails when the records cannot be read.
pub async fn list_homes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HomesQuery>,
) -> Result<Json<Vec<ResolvedPoint>>, AppError> {
    let range = RangeToken::from_query(params.range.as_deref());
    tracing::info!("GET /api/homes - range: {}", range);

    let points = state.pipeline.list_homes(range).await?;
    Ok(Json(points))
}

/// GET /sold-homes
pub async fn list_sold_homes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<HomeRecord>>, AppError> {
    let homes = state.pipeline.list_raw_homes().await?;
    Ok(Json(homes))
}

/// POST /sold-homes
///
/// 201 with the stored record, 400 when the body is not a JSON object or a
/// required field is missing or malformed.
pub async fn create_sold_home(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<HomeInput>, JsonRejection>,
) -> Result<(StatusCode, Json<HomeRecord>), AppError> {
    let Json(input) = payload?;
    let home = state.pipeline.save_home(input).await.map_err(|e| {
        tracing::warn!("Rejected home: {}", e);
        e
    })?;

    tracing::info!("Created home {}", home.id);
    Ok((StatusCode::CREATED, Json(home)))
}

/// GET /api/comps
pub async fn list_comps(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ResolvedPoint>>, AppError> {
    tracing::info!("GET /api/comps");

    let points = state.pipeline.list_comps().await?;
    Ok(Json(points))
}

/// POST /api/comps
///
/// Non-numeric optional fields are stored as absent rather than rejected.
pub async fn create_comp(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CompInput>, JsonRejection>,
) -> Result<(StatusCode, Json<CompRecord>), AppError> {
    let Json(input) = payload?;
    let comp = state.pipeline.save_comp(input).await?;

    tracing::info!("Created comp {}", comp.id);
    Ok((StatusCode::CREATED, Json(comp)))
}
