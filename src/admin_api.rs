// =============================================================================
// Operator-facing admin API — Axum 0.7
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::auth::AuthBearer;
use crate::engine::Engine;
use crate::model::{BookSnap, Candle, Plan};

/// Shared engine handle. A `tokio::sync::RwLock` (not `parking_lot`) because
/// the tick-ingestion handlers hold the write guard across the engine's
/// async `evaluate_*_tick` calls, which themselves `.await` signal delivery.
pub type SharedEngine = Arc<RwLock<Engine>>;

pub fn router(engine: SharedEngine) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/plans", post(add_plan))
        .route("/api/v1/plans/:plan_id", get(get_plan_state))
        .route("/api/v1/plans/:plan_id", axum::routing::delete(remove_plan))
        .route("/api/v1/stats", get(runtime_stats))
        .route("/api/v1/instruments/:instrument_id/candle", post(ingest_candle))
        .route("/api/v1/instruments/:instrument_id/book", post(ingest_book))
        .layer(cors)
        .with_state(engine)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    server_time: i64,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

async fn add_plan(
    _auth: AuthBearer,
    State(engine): State<SharedEngine>,
    Json(plan): Json<Plan>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let plan_id = plan.id.clone();
    let mut eng = engine.write().await;
    match eng.add_plan(plan) {
        Ok(()) => {
            info!(plan_id = %plan_id, "plan admitted");
            Ok(Json(serde_json::json!({ "plan_id": plan_id, "status": "admitted" })))
        }
        Err(e) => {
            warn!(plan_id = %plan_id, error = %e, "plan admission rejected");
            Err((StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": e.to_string() }))))
        }
    }
}

async fn remove_plan(
    _auth: AuthBearer,
    State(engine): State<SharedEngine>,
    Path(plan_id): Path<String>,
) -> impl IntoResponse {
    let mut eng = engine.write().await;
    match eng.remove_plan(&plan_id) {
        Some(_) => Json(serde_json::json!({ "plan_id": plan_id, "status": "removed" })).into_response(),
        None => (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "plan not found" }))).into_response(),
    }
}

async fn get_plan_state(
    _auth: AuthBearer,
    State(engine): State<SharedEngine>,
    Path(plan_id): Path<String>,
) -> impl IntoResponse {
    let eng = engine.read().await;
    match eng.plan_state(&plan_id) {
        Some(state) => Json(state).into_response(),
        None => (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "plan not found" }))).into_response(),
    }
}

async fn runtime_stats(_auth: AuthBearer, State(engine): State<SharedEngine>) -> impl IntoResponse {
    let eng = engine.read().await;
    let stats = eng.runtime_stats();
    Json(serde_json::json!({
        "total_plans": stats.total_plans,
        "pending": stats.pending,
        "armed": stats.armed,
        "triggered": stats.triggered,
        "invalid": stats.invalid,
        "expired": stats.expired,
    }))
}

#[derive(serde::Deserialize)]
struct CandleIngestRequest {
    timeframe: String,
    candle: Candle,
}

async fn ingest_candle(
    _auth: AuthBearer,
    State(engine): State<SharedEngine>,
    Path(instrument_id): Path<String>,
    Json(req): Json<CandleIngestRequest>,
) -> impl IntoResponse {
    let mut eng = engine.write().await;
    let signals = eng
        .evaluate_candle_tick(&instrument_id, &req.timeframe, req.candle, Utc::now())
        .await;
    Json(serde_json::json!({ "signals_emitted": signals.len(), "signals": signals }))
}

async fn ingest_book(
    _auth: AuthBearer,
    State(engine): State<SharedEngine>,
    Path(instrument_id): Path<String>,
    Json(book): Json<BookSnap>,
) -> impl IntoResponse {
    let mut eng = engine.write().await;
    let signals = eng.evaluate_book_tick(&instrument_id, book, Utc::now()).await;
    Json(serde_json::json!({ "signals_emitted": signals.len(), "signals": signals }))
}
