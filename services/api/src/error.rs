//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service, plus the
//! JSON error body returned by every failing endpoint.

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::config::ConfigError;
use lms_core::ports::PortError;

/// Anything that can take the service down at startup or in a background
/// task. Request-level failures use [`HttpError`] instead.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Service port error: {0}")]
    Port(#[from] PortError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// The body of every error response: a single human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

/// What failing handlers return. Axum turns the tuple into a response
/// with the given status and the JSON body.
pub type HttpError = (StatusCode, Json<ErrorBody>);

pub fn reject(status: StatusCode, message: impl Into<String>) -> HttpError {
    (
        status,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}

/// Maps a port failure onto the API's response taxonomy. Internal detail
/// is logged, never echoed to the client.
pub fn port_reject(err: PortError) -> HttpError {
    match err {
        PortError::NotFound(what) => reject(StatusCode::NOT_FOUND, format!("{what} not found")),
        PortError::AlreadyExists(what) => {
            reject(StatusCode::BAD_REQUEST, format!("{what} already exists"))
        }
        PortError::Unauthorized => reject(StatusCode::UNAUTHORIZED, "Unauthorized"),
        PortError::Unexpected(detail) => {
            tracing::error!("Unexpected port failure: {detail}");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_failures_map_to_the_right_status() {
        let (status, _) = port_reject(PortError::NotFound("course x".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = port_reject(PortError::AlreadyExists("payment y".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = port_reject(PortError::Unauthorized);
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = port_reject(PortError::Unexpected("pool exhausted".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        // The caller sees a generic message, not the internals.
        assert_eq!(body.0.message, "Internal server error");
    }
}
