//! Download endpoints
//!
//! Both downloads are attachments of type `application/octet-stream`.
//! Without a note sequence the export is a no-op, reported as 409.
//! Encoding runs on the blocking pool.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use tracing::{error, info};
use uuid::Uuid;

use super::sessions::find_session;
use crate::error::{ApiError, ApiResult};
use crate::presenter::{export_midi, export_musicxml, Download};
use crate::AppState;

fn attachment(download: Download) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, download.mime_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", download.file_name),
            ),
        ],
        download.bytes,
    )
}

fn nothing_to_export() -> ApiError {
    ApiError::Conflict("No note sequence to export".to_string())
}

/// GET /sessions/:id/export/musicxml
pub async fn export_musicxml_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let session = find_session(&state, id).await?;
    let seq = session.note_sequence().await;
    let download = tokio::task::spawn_blocking(move || export_musicxml(seq.as_deref()))
        .await?
        .ok_or_else(nothing_to_export)?;
    info!(session_id = %id, bytes = download.bytes.len(), "MusicXML exported");
    Ok(attachment(download))
}

/// GET /sessions/:id/export/midi
pub async fn export_midi_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let session = find_session(&state, id).await?;
    let seq = session.note_sequence().await;
    let download = match tokio::task::spawn_blocking(move || export_midi(seq.as_deref())).await? {
        Ok(download) => download.ok_or_else(nothing_to_export)?,
        Err(e) => {
            error!(session_id = %id, error = %e, "MIDI export failed");
            state.record_error(format!("MIDI export failed: {}", e)).await;
            return Err(e.into());
        }
    };
    info!(session_id = %id, bytes = download.bytes.len(), "MIDI exported");
    Ok(attachment(download))
}

/// Build export routes
pub fn export_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions/:id/export/musicxml", get(export_musicxml_file))
        .route("/sessions/:id/export/midi", get(export_midi_file))
}
