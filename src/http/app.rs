//! Built-in demo application.
//!
//! The server wraps whatever `axum::Router` it is handed; this one exists
//! so a bare `promfront` run has something to front.

use axum::{routing::get, Json, Router};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub version: &'static str,
    pub timestamp: String,
}

/// Application with a single `GET /ping` route.
pub fn demo_app() -> Router {
    Router::new().route("/ping", get(ping))
}

async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
