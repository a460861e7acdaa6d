//! Session endpoints
//!
//! A page opening the service creates a session, uploads files into it and
//! follows its progress over SSE.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::intake::UploadedFile;
use crate::presenter::ViewMode;
use crate::session::{SessionController, SessionSnapshot};
use crate::AppState;

/// Query for PUT /sessions/:id/file
#[derive(Debug, Deserialize)]
pub struct FileQuery {
    /// Original file name; drives producer selection
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ViewModeResponse {
    pub view_mode: ViewMode,
}

/// Look up a live session
pub(crate) async fn find_session(state: &AppState, id: Uuid) -> ApiResult<Arc<SessionController>> {
    state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session {} not found", id)))
}

/// POST /sessions
pub async fn create_session(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<SessionSnapshot>)> {
    let session = SessionController::new(
        state.producers.clone(),
        state.settings.intake.extension_rule,
        state.event_bus.clone(),
    );
    state.sessions.insert(Arc::clone(&session)).await;
    // Initialization continues in the background
    let _init = session.mount().await;

    info!(session_id = %session.id(), "Session created");
    Ok((StatusCode::CREATED, Json(session.snapshot().await)))
}

/// GET /sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionSnapshot>> {
    let session = find_session(&state, id).await?;
    Ok(Json(session.snapshot().await))
}

/// DELETE /sessions/:id
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let session = state
        .sessions
        .remove(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session {} not found", id)))?;
    session.close().await;
    info!(session_id = %id, "Session closed");
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /sessions/:id/file?name=...
///
/// Body is the raw file content.
pub async fn upload_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<FileQuery>,
    body: Bytes,
) -> ApiResult<Json<SessionSnapshot>> {
    let session = find_session(&state, id).await?;
    if query.name.trim().is_empty() {
        return Err(ApiError::BadRequest("File name must not be empty".to_string()));
    }

    info!(
        session_id = %id,
        file = %query.name,
        bytes = body.len(),
        "File uploaded"
    );
    session
        .select_file(UploadedFile::from_bytes(query.name, body.to_vec()))
        .await;
    Ok(Json(session.snapshot().await))
}

/// POST /sessions/:id/retry
pub async fn retry_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionSnapshot>> {
    let session = find_session(&state, id).await?;
    session.retry().await?;
    Ok(Json(session.snapshot().await))
}

/// POST /sessions/:id/reset
pub async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionSnapshot>> {
    let session = find_session(&state, id).await?;
    session.reset().await;
    Ok(Json(session.snapshot().await))
}

/// POST /sessions/:id/view/toggle
pub async fn toggle_view(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ViewModeResponse>> {
    let session = find_session(&state, id).await?;
    let view_mode = session.toggle_view().await;
    Ok(Json(ViewModeResponse { view_mode }))
}

/// GET /sessions/:id/view
pub async fn get_view(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let session = find_session(&state, id).await?;
    let svg = session
        .render_view()
        .await?
        .ok_or_else(|| ApiError::Conflict("No note sequence to display".to_string()))?;
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg))
}

/// GET /sessions/:id/note-sequence
pub async fn get_note_sequence(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let session = find_session(&state, id).await?;
    let seq = session
        .note_sequence()
        .await
        .ok_or_else(|| ApiError::Conflict("No note sequence available".to_string()))?;
    Ok(Json(seq.as_ref().clone()))
}

/// Build session routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/file", put(upload_file))
        .route("/sessions/:id/retry", post(retry_session))
        .route("/sessions/:id/reset", post(reset_session))
        .route("/sessions/:id/view/toggle", post(toggle_view))
        .route("/sessions/:id/view", get(get_view))
        .route("/sessions/:id/note-sequence", get(get_note_sequence))
}
