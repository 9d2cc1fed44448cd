use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

const DB_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/live", get(live))
        .route("/info", get(info))
}

async fn root(State(state): State<AppState>) -> Response {
    let db_connected = database_check(&state).await;
    let redis_connected = redis_check(&state).await;

    let response = HealthResponse {
        status: if db_connected { "ok" } else { "degraded" },
        database: if db_connected {
            "connected"
        } else {
            "disconnected"
        },
        redis: if redis_connected {
            "connected"
        } else {
            "disconnected"
        },
        timestamp: now_iso(),
    };

    let status_code = if db_connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(response)).into_response()
}

async fn live(State(state): State<AppState>) -> Response {
    Json(LivenessResponse {
        status: "alive",
        uptime: state.uptime_seconds(),
        timestamp: now_iso(),
    })
    .into_response()
}

async fn info(State(state): State<AppState>) -> Response {
    Json(InfoResponse {
        service: "wordquiz-backend",
        version: env!("CARGO_PKG_VERSION"),
        environment: std::env::var("NODE_ENV")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "development".to_string()),
        uptime: state.uptime_seconds(),
    })
    .into_response()
}

async fn database_check(state: &AppState) -> bool {
    let Some(db) = state.db() else {
        return false;
    };
    tokio::time::timeout(DB_CHECK_TIMEOUT, db.ping())
        .await
        .unwrap_or(false)
}

async fn redis_check(state: &AppState) -> bool {
    let Some(cache) = state.cache() else {
        return false;
    };
    tokio::time::timeout(DB_CHECK_TIMEOUT, cache.is_connected())
        .await
        .unwrap_or(false)
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
    redis: &'static str,
    timestamp: String,
}

#[derive(Serialize)]
struct LivenessResponse {
    status: &'static str,
    uptime: u64,
    timestamp: String,
}

#[derive(Serialize)]
struct InfoResponse {
    service: &'static str,
    version: &'static str,
    environment: String,
    uptime: u64,
}
