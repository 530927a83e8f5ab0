use axum::response::{IntoResponse, Response};
use http::StatusCode;

/// Errors a handler can return before its response stream has started.
///
/// Authentication failures, unknown services and malformed bodies all map to
/// the same bodiless 404 so callers cannot tell them apart.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND.into_response(),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

/// Fallback for unmatched routes and unsupported methods.
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
