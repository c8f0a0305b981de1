//! Liveness check for load balancers and operator scripts

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    /// Which durable backend submissions go to ("sqlite" or "google-sheets")
    pub durable_backend: String,
    pub live_sessions: usize,
}

/// GET /health, open to everyone
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "pqa-ui".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        durable_backend: state.stores.durable.backend_name().to_string(),
        live_sessions: state.sessions.len().await,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
