//! sonic-scribe library interface
//!
//! Audio/MIDI → note sequence transcription sessions, their renderers and
//! exporters, and the HTTP service hosting them.

pub mod api;
pub mod audio;
pub mod codec;
pub mod error;
pub mod intake;
pub mod model;
pub mod presenter;
pub mod producer;
pub mod session;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use sonic_common::config::TomlConfig;
use sonic_common::events::EventBus;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::model::{ModelLoader, TranscriptionEngine};
use crate::producer::Producers;
use crate::session::SessionRegistry;

/// Version, git hash, build time and profile
pub fn build_info() -> String {
    format!(
        "v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    )
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Process-wide model and its readiness
    pub loader: Arc<ModelLoader>,
    pub producers: Producers,
    pub sessions: SessionRegistry,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub settings: Arc<TomlConfig>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(settings: TomlConfig, engine: Arc<dyn TranscriptionEngine>) -> Self {
        let event_bus = EventBus::new(settings.events.capacity);
        let loader = Arc::new(ModelLoader::new(engine, event_bus.clone()));
        let producers = Producers::new(Arc::clone(&loader), settings.model.serialize_calls)
            .with_max_duration(settings.intake.max_duration_seconds);
        Self {
            loader,
            producers,
            sessions: SessionRegistry::new(),
            event_bus,
            settings: Arc::new(settings),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Remember an error for `/health`
    pub async fn record_error(&self, message: String) {
        *self.last_error.write().await = Some(message);
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    let body_limit = state.settings.server.max_upload_bytes;

    Router::new()
        .merge(api::ui_routes())
        .merge(api::session_routes())
        .merge(api::export_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
