//! Cookie based user identity.
//!
//! Every request gets an [`Identity`] in its extensions. A valid `token`
//! cookie yields the sealed user id. Otherwise the request acts as the
//! anonymous owner and a newly minted id is sent back in `Set-Cookie`.

use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use snip_core::ANONYMOUS_OWNER;
use tracing::{debug, error};
use uuid::Uuid;

pub const TOKEN_COOKIE: &str = "token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Opened from the request cookie.
    Cookie,
    /// The request carried no cookie.
    Issued,
    /// The request cookie could not be opened and was replaced.
    Replaced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    user_id: String,
    origin: Origin,
}

impl Identity {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// True when the caller proved this identity with a cookie we issued.
    pub fn is_verified(&self) -> bool {
        self.origin == Origin::Cookie
    }

    /// Owner recorded on saves. Unverified callers share the anonymous owner
    /// until they come back with the cookie issued to them.
    pub fn owner_id(&self) -> &str {
        if self.is_verified() {
            &self.user_id
        } else {
            ANONYMOUS_OWNER
        }
    }
}

fn token_from(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .map(|(_, value)| value.trim_matches('"'))
}

fn resolve(state: &AppState, headers: &HeaderMap) -> Identity {
    let Some(token) = token_from(headers) else {
        return Identity {
            user_id: Uuid::new_v4().to_string(),
            origin: Origin::Issued,
        };
    };

    match state.cipher().open(token) {
        Ok(user_id) if !user_id.is_empty() => Identity {
            user_id,
            origin: Origin::Cookie,
        },
        Ok(_) | Err(_) => {
            debug!("discarding undecryptable identity cookie");
            Identity {
                user_id: Uuid::new_v4().to_string(),
                origin: Origin::Replaced,
            }
        }
    }
}

/// Middleware attaching an [`Identity`] to the request.
pub async fn identify(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let identity = resolve(&state, request.headers());
    request.extensions_mut().insert(identity.clone());

    let mut response = next.run(request).await;

    if !identity.is_verified() {
        match state
            .cipher()
            .seal(identity.user_id())
            .map_err(|e| e.to_string())
            .and_then(|token| {
                HeaderValue::from_str(&format!("{TOKEN_COOKIE}={token}; Path=/; HttpOnly"))
                    .map_err(|e| e.to_string())
            }) {
            Ok(cookie) => {
                response.headers_mut().append(SET_COOKIE, cookie);
            }
            Err(err) => error!(error = %err, "failed to issue identity cookie"),
        }
    }

    response
}
