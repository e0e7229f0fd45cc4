//! services/api/src/web/middleware.rs
//!
//! The auth gate in front of every learner- and trainer-facing route.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::error;

use crate::error::{reject, HttpError};
use crate::web::state::AppState;

/// Name of the browser cookie carrying the opaque session id.
pub const SESSION_COOKIE: &str = "session";

/// Pulls the session id out of the Cookie header, if one is present.
pub(crate) fn session_id_from(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .find_map(|part| part.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
}

/// Resolves the session cookie to a user id and stashes it in request
/// extensions, where handlers pick it up via `Extension<Uuid>`.
///
/// Requests without a live session never reach a handler.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, HttpError> {
    let session_id = session_id_from(req.headers())
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "No session found"))?
        .to_owned();

    let user_id = state
        .db
        .validate_auth_session(&session_id)
        .await
        .map_err(|e| {
            error!("Failed to validate auth session: {:?}", e);
            reject(StatusCode::UNAUTHORIZED, "Session expired or invalid")
        })?;

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}
