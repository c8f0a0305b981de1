//! Error types for pqa-ui

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pqa_common::identity::IdentityError;
use pqa_common::persistence::StoreError;
use pqa_common::session::{NavError, SubmitError};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Wrong admin secret (403)
    #[error("Forbidden")]
    Forbidden,

    /// Unknown annotator or malformed session token (400)
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Rejected navigation or mutation (409)
    #[error(transparent)]
    Navigation(#[from] NavError),

    /// Durable store unreachable on submit (502)
    #[error("{0}")]
    RemoteUnavailable(String),

    /// Recovery file operation failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Rejected(nav) => ApiError::Navigation(nav),
            durable @ SubmitError::Durable(_) => ApiError::RemoteUnavailable(durable.to_string()),
        }
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::Identity(_) => (StatusCode::BAD_REQUEST, "INVALID_IDENTITY"),
            ApiError::Navigation(nav) => match nav {
                NavError::Incomplete { .. } => (StatusCode::CONFLICT, "INCOMPLETE"),
                NavError::DuplicateRank { .. } => (StatusCode::CONFLICT, "DUPLICATE_RANK"),
                _ => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            },
            ApiError::RemoteUnavailable(_) => (StatusCode::BAD_GATEWAY, "REMOTE_UNAVAILABLE"),
            ApiError::Store(StoreError::InvalidName(_)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST")
            }
            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(code = error_code, error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pqa_common::{Category, ItemKey};

    #[test]
    fn test_navigation_codes() {
        let item = ItemKey::new(Category::Fiction, "A prompt");
        let cases = [
            (NavError::Incomplete { item: item.clone() }, "INCOMPLETE"),
            (NavError::DuplicateRank { item }, "DUPLICATE_RANK"),
            (NavError::AtFirstPage, "INVALID_TRANSITION"),
            (NavError::NotOnFeedbackPage, "INVALID_TRANSITION"),
        ];
        for (nav, code) in cases {
            let (status, actual) = ApiError::from(nav).status_and_code();
            assert_eq!(status, StatusCode::CONFLICT);
            assert_eq!(actual, code);
        }
    }

    #[test]
    fn test_remote_failure_is_bad_gateway() {
        let err = ApiError::from(SubmitError::Durable(StoreError::Remote(
            "HTTP 503".to_string(),
        )));
        assert_eq!(
            err.status_and_code(),
            (StatusCode::BAD_GATEWAY, "REMOTE_UNAVAILABLE")
        );
        assert!(err.to_string().contains("HTTP 503"));
    }
}
