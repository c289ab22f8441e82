use crate::handlers::{
    ping_handler, redirect_handler, shorten_batch_handler, shorten_json_handler,
    shorten_text_handler, user_urls_handler,
};
use crate::identity::identify;
use crate::model::ErrorResponse;
use crate::state::AppState;
use axum::extract::Request;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;

pub struct App {}

impl App {
    pub fn router(state: AppState) -> Router {
        let text = Router::new()
            .route("/", post(shorten_text_handler))
            .route_layer(middleware::from_fn(require_text));

        let json = Router::new()
            .route("/api/shorten", post(shorten_json_handler))
            .route("/api/shorten/batch", post(shorten_batch_handler))
            .route_layer(middleware::from_fn(require_json));

        Router::new()
            .merge(text)
            .merge(json)
            .route("/api/user/urls", get(user_urls_handler))
            .route("/ping", get(ping_handler))
            .route("/{id}", get(redirect_handler))
            .layer(middleware::from_fn_with_state(state.clone(), identify))
            .layer(RequestDecompressionLayer::new())
            .layer(CompressionLayer::new())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

/// The media type of a request, without parameters, lowercased.
fn media_type(request: &Request) -> Option<String> {
    let value = request.headers().get(CONTENT_TYPE)?.to_str().ok()?;
    let essence = value.split(';').next().unwrap_or_default().trim();
    Some(essence.to_ascii_lowercase())
}

async fn require_media_type(expected: &str, request: Request, next: Next) -> Response {
    match media_type(&request) {
        Some(found) if found == expected => next.run(request).await,
        found => (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Json(ErrorResponse {
                error: format!(
                    "expected content type {expected}, got {}",
                    found.as_deref().unwrap_or("none")
                ),
            }),
        )
            .into_response(),
    }
}

async fn require_text(request: Request, next: Next) -> Response {
    require_media_type("text/plain", request, next).await
}

async fn require_json(request: Request, next: Next) -> Response {
    require_media_type("application/json", request, next).await
}
