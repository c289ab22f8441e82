use crate::error::{AppError, Result};
use crate::identity::Identity;
use crate::model::{ShortenRequest, ShortenResponse};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use snip_core::{BatchEntry, BatchResult, SaveOutcome, ShortCode};
use tracing::{info, warn};
use url::Url;

/// Accepts absolute http(s) URLs with a host.
pub fn validate_url(raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(AppError::BadRequest("url required".to_string()));
    }

    let url = Url::parse(raw).map_err(|_| AppError::BadRequest("only valid url required".to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
        return Err(AppError::BadRequest("only valid url required".to_string()));
    }

    Ok(())
}

fn created_or_conflict(outcome: &SaveOutcome) -> StatusCode {
    if outcome.is_existing() {
        StatusCode::CONFLICT
    } else {
        StatusCode::CREATED
    }
}

/// `POST /` with the URL as a plain-text body.
pub async fn shorten_text_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    body: String,
) -> Result<Response> {
    let url = body.trim();
    validate_url(url)?;

    let outcome = state.store().save_url(url, identity.owner_id()).await?;
    let short_url = outcome.code().to_url(state.base_url());

    Ok((
        created_or_conflict(&outcome),
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        short_url,
    )
        .into_response())
}

/// `POST /api/shorten` with `{"url": ...}`.
pub async fn shorten_json_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: std::result::Result<Json<ShortenRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    validate_url(&request.url)?;

    let outcome = state
        .store()
        .save_url(&request.url, identity.owner_id())
        .await?;

    Ok((
        created_or_conflict(&outcome),
        Json(ShortenResponse {
            result: outcome.code().to_url(state.base_url()),
        }),
    )
        .into_response())
}

/// `POST /api/shorten/batch`.
///
/// Every URL is validated before anything is stored. Entries the backend
/// fails on are left out of the response and logged.
pub async fn shorten_batch_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: std::result::Result<Json<Vec<BatchEntry>>, JsonRejection>,
) -> Result<(StatusCode, Json<Vec<BatchResult>>)> {
    let Json(entries) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    if entries.is_empty() {
        return Err(AppError::BadRequest("batch is empty".to_string()));
    }
    for entry in &entries {
        validate_url(&entry.original_url).map_err(|_| {
            AppError::BadRequest(format!(
                "invalid url for correlation id '{}'",
                entry.correlation_id
            ))
        })?;
    }

    let report = state
        .store()
        .save_batch_url(state.base_url(), &entries, identity.owner_id())
        .await?;

    for failure in &report.failures {
        warn!(
            correlation_id = %failure.correlation_id,
            error = %failure.error,
            "batch entry not stored"
        );
    }
    if report.results.is_empty() {
        return Err(AppError::BadRequest("no batch entry could be stored".to_string()));
    }

    Ok((StatusCode::CREATED, Json(report.results)))
}

/// `GET /{id}`.
pub async fn redirect_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let code = ShortCode::new(id).map_err(|_| AppError::NotFound)?;
    let original_url = state.store().get_url(&code).await?;

    Ok((StatusCode::TEMPORARY_REDIRECT, [(LOCATION, original_url)]).into_response())
}

/// `GET /api/user/urls`.
pub async fn user_urls_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Response> {
    if !identity.is_verified() {
        return Err(AppError::Unauthorized);
    }

    let urls = state
        .store()
        .get_user_urls(state.base_url(), identity.user_id())
        .await?;
    if urls.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    info!(count = urls.len(), "listing user urls");
    Ok(Json(urls).into_response())
}
