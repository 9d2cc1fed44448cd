pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod logging;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;

use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::cache::RedisCache;
use crate::state::AppState;

/// Builds the full application router against whatever backing services the
/// environment provides. Used by main and by integration tests.
pub async fn create_app() -> axum::Router {
    let db = db::Database::from_env().await.ok();

    let cache = match std::env::var("REDIS_URL") {
        Ok(url) if !url.trim().is_empty() => RedisCache::connect(&url).await.ok().map(Arc::new),
        _ => None,
    };

    let state = AppState::new(db, cache);

    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
