//! HTTP read API.
//!
//! | Route | Response |
//! |-------|----------|
//! | `GET /news[?limit=N]` | Latest stored articles, newest first |
//! | `GET /yahoofinance?...` | Filtered, sorted, paginated fund snapshots (see [`crate::query`]) |
//! | `GET /health` | Health verdict, request metrics and loop statuses |
//! | `GET /metrics` | Prometheus text exposition, comment lines removed |
//! | `GET /metrics_json` | Every exposed series plus derived counters, as flat JSON |
//!
//! Errors use one body shape:
//!
//! ```json
//! { "code": "INVALID_FILTER", "message": "unknown sort field `nonexistent_field`" }
//! ```
//!
//! The API never writes. It reads through the same [`Store`] the collection
//! loops write to, and never waits on a loop.

use crate::error::QueryError;
use crate::health::{HealthStatus, HealthTracker, MetricsSnapshot, samples, track_requests};
use crate::models::{StoredFundSnapshot, StoredNewsArticle};
use crate::query::{FundQuery, news_limit};
use crate::scheduler::{SourceStatus, StatusBoard};
use crate::store::Store;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router, middleware};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, instrument};

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub health: Arc<HealthTracker>,
    pub statuses: StatusBoard,
    /// `GET /news` page size when no `limit` is given.
    pub news_limit: i64,
}

/// A request that could not be served.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    InvalidFilter(#[from] QueryError),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::InvalidFilter(e) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "INVALID_FILTER",
                    message: e.to_string(),
                },
            ),
            ApiError::Storage(e) => {
                error!(error = %e, "Read query failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "STORAGE_ERROR",
                        message: "stored records are temporarily unavailable".to_string(),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
    pub sources: Vec<SourceStatus>,
}

/// Build the router with request tracking and tracing layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/news", get(latest_news))
        .route("/yahoofinance", get(query_funds))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/metrics_json", get(metrics_json))
        .layer(middleware::from_fn_with_state(
            state.health.clone(),
            track_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[instrument(level = "debug", skip_all)]
async fn latest_news(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<StoredNewsArticle>>, ApiError> {
    let limit = news_limit(params.get("limit").map(String::as_str), state.news_limit)?;
    Ok(Json(state.store.latest_news(limit).await?))
}

#[instrument(level = "debug", skip_all)]
async fn query_funds(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<StoredFundSnapshot>>, ApiError> {
    let query = FundQuery::from_params(&params)?;
    Ok(Json(state.store.query_funds(&query).await?))
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let metrics = state.health.snapshot();
    Json(HealthReport {
        status: metrics.status(),
        metrics,
        sources: state.statuses.snapshot(),
    })
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.health.render(),
    )
}

async fn metrics_json(State(state): State<AppState>) -> Json<Map<String, Value>> {
    let mut flat: Map<String, Value> = samples(&state.health.render())
        .map(|(series, value)| (series.to_string(), json!(value)))
        .collect();

    let metrics = state.health.snapshot();
    flat.insert("request_count".into(), json!(metrics.request_count));
    flat.insert("error_count".into(), json!(metrics.error_count));
    flat.insert("error_rate".into(), json!(metrics.error_rate));
    flat.insert(
        "median_latency_seconds".into(),
        json!(metrics.median_latency_seconds),
    );
    for status in state.statuses.snapshot() {
        flat.insert(
            format!("{}_completed_cycles", status.source),
            json!(status.completed_cycles),
        );
        flat.insert(
            format!("{}_failed_cycles", status.source),
            json!(status.failed_cycles),
        );
        flat.insert(
            format!("{}_last_inserted", status.source),
            json!(status.last_inserted),
        );
    }
    Json(flat)
}
