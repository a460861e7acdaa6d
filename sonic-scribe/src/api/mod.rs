//! HTTP API handlers
//!
//! REST endpoints for sessions and downloads, plus the SSE event stream
//! and the upload page.

pub mod exports;
pub mod health;
pub mod sessions;
pub mod sse;
pub mod ui;

pub use exports::export_routes;
pub use health::health_routes;
pub use sessions::session_routes;
pub use sse::event_stream;
pub use ui::ui_routes;
