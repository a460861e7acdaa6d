//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use sonic_common::events::ModelReadiness;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok", or "degraded" once the model failed)
    pub status: String,
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Git hash and build time baked in by build.rs
    pub build: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    pub model_readiness: ModelReadiness,
    pub sessions: usize,
    /// Last error message if any (for diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let model_readiness = state.loader.readiness();
    let status = match model_readiness {
        ModelReadiness::Failed => "degraded",
        _ => "ok",
    };

    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        status: status.to_string(),
        module: "sonic-scribe".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: crate::build_info(),
        uptime_seconds,
        model_readiness,
        sessions: state.sessions.len().await,
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
