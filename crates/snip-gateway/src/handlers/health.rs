use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::error;

/// `GET /ping`: reports whether the storage backend is reachable.
pub async fn ping_handler(State(state): State<AppState>) -> (StatusCode, &'static str) {
    match state.store().check_connect().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(err) => {
            error!(backend = %state.store().backend(), error = %err, "storage health check failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable")
        }
    }
}
