use axum::response::{IntoResponse, Response};
use axum::http::StatusCode;
use axum::Json;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("File not found: {0}")]
    NoSuchFile(String),

    #[error("No reachable replica: {0}")]
    Unreachable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "StorageError"),
            ApiError::NoSuchFile(_) => (StatusCode::NOT_FOUND, "NoSuchFile"),
            ApiError::Unreachable(_) => (StatusCode::NOT_FOUND, "Unreachable"),
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "InvalidRequest"),
            ApiError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = serde_json::json!({
            "error": error_code,
            "message": self.to_string(),
            "request_id": uuid::Uuid::new_v4(),
        });

        (status, Json(body)).into_response()
    }
}

impl From<storage::StorageError> for ApiError {
    fn from(err: storage::StorageError) -> Self {
        match err {
            storage::StorageError::InvalidObject(msg) => ApiError::InvalidRequest(msg),
            other => ApiError::Storage(other.to_string()),
        }
    }
}
