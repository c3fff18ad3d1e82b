// HTTP request handlers
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// All published states, keyed like `data_1h.rainStartsAt`
pub async fn list_states(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.states.snapshot().await)
}

pub async fn get_state(
    Path(key): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    match state.states.get(&key).await {
        Some(stored) => Json(stored).into_response(),
        None => (StatusCode::NOT_FOUND, format!("no state {}", key)).into_response(),
    }
}
