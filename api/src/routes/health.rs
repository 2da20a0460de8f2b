use axum::extract::State;
use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// `ok` when configuration loaded, the lock can be opened, and a state
/// record exists; `degraded` otherwise. Always HTTP 200 so the status code
/// says nothing to outside callers.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let healthy = match state.gateway.clone() {
        Some(gateway) => tokio::task::spawn_blocking(move || {
            let switch = gateway.switch();
            switch.lock().try_acquire().is_ok() && switch.store().load().is_some()
        })
        .await
        .unwrap_or(false),
        None => false,
    };

    let status = if healthy { "ok" } else { "degraded" };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
