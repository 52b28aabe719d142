//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are automatically converted
//! to a `{"error": "..."}` JSON body with an appropriate status code.
//!
//! Internal errors (I/O, archive, upstream model) are logged with full detail
//! but only a generic message is returned, so session paths and upstream
//! payloads never leak to clients.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nextport_core::CoreError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// All errors that can occur in the nextport-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from nextport-core.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// The caller referenced a resource that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The request body exceeds what the server will buffer.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            // Client-facing errors: expose the message directly.
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::PayloadTooLarge(m) => (StatusCode::PAYLOAD_TOO_LARGE, m.clone()),

            ServerError::Core(e) => match e {
                CoreError::InvalidRepoUrl(_) => (StatusCode::BAD_REQUEST, e.to_string()),
                CoreError::RepoTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()),
                CoreError::SessionNotFound(id) => {
                    (StatusCode::NOT_FOUND, format!("repo session {id} not found"))
                }
                CoreError::WrongStage { .. } => (StatusCode::CONFLICT, e.to_string()),
                CoreError::TooManySessions { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
                }
                CoreError::CloneFailed { .. } => {
                    error!(error = %e, "clone failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "failed to clone repository".to_owned(),
                    )
                }
                CoreError::Http(_)
                | CoreError::UpstreamStatus { .. }
                | CoreError::InvalidResponse { .. } => {
                    error!(error = %e, "model API error");
                    (StatusCode::BAD_GATEWAY, "model API request failed".to_owned())
                }
                CoreError::Io(_) | CoreError::Zip(_) | CoreError::Walk(_) | CoreError::Join(_) => {
                    error!(error = %e, "internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal server error".to_owned(),
                    )
                }
            },

            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = self.status_and_message();
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(e: anyhow::Error) -> Self {
        error!(error = ?e, "converting anyhow error to ServerError::Internal");
        ServerError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use nextport_core::SessionStage;

    fn status(e: ServerError) -> StatusCode {
        e.into_response().status()
    }

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(status(ServerError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(ServerError::BadRequest("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(CoreError::InvalidRepoUrl("x".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(CoreError::SessionNotFound("x".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(
                CoreError::WrongStage {
                    id: "x".into(),
                    expected: SessionStage::Cloned,
                    actual: SessionStage::Zipped,
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn quota_is_service_unavailable() {
        assert_eq!(
            status(CoreError::TooManySessions { limit: 1 }.into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn upstream_failures_are_bad_gateway() {
        let e = CoreError::UpstreamStatus {
            status: 529,
            message: "overloaded".into(),
        };
        assert_eq!(status(e.into()), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn internal_details_are_hidden() {
        let e = ServerError::Internal("/tmp/secret/path".into());
        let (code, message) = e.status_and_message();
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!message.contains("secret"));
    }
}
