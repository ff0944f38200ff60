//! Mapping of core errors and request rejections onto HTTP responses.
//!
//! Every non-2xx body is `{"detail": "..."}`.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use wishlist_core::CoreError;
use wishlist_sdk::objects::ErrorBody;

/// Errors that can occur in API handlers.
#[derive(Debug)]
pub enum ApiError {
    Core(CoreError),
    /// Malformed path, query or body.
    BadRequest(String),
    /// Well-formed body whose fields do not deserialize.
    Unprocessable(String),
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError::Core(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => ApiError::Unprocessable(e.body_text()),
            other => ApiError::BadRequest(other.body_text()),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status_and_detail(self) -> (StatusCode, String) {
        match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            ApiError::Unprocessable(detail) => (StatusCode::UNPROCESSABLE_ENTITY, detail),
            ApiError::Core(e) => match e {
                CoreError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
                CoreError::NotPublished | CoreError::Forbidden(_) => {
                    (StatusCode::FORBIDDEN, e.to_string())
                }
                CoreError::Conflict(_) => (StatusCode::CONFLICT, e.to_string()),
                CoreError::Auth(_) => (StatusCode::UNAUTHORIZED, e.to_string()),
                CoreError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
                CoreError::Store(_) | CoreError::Internal(_) => {
                    tracing::error!(error = %e, "API internal error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal server error".to_string(),
                    )
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = self.status_and_detail();
        (status, Json(ErrorBody { detail })).into_response()
    }
}
