use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("workspace {0} not found")]
    WorkspaceNotFound(Uuid),
    #[error("preview {0} not found")]
    PreviewNotFound(Uuid),
    #[error("no layout at position {0}")]
    LayoutNotFound(usize),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0} is not an image")]
    NotAnImage(String),
    #[error("layout image is not valid base64: {0}")]
    CorruptImage(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::WorkspaceNotFound(_) | ApiError::PreviewNotFound(_) | ApiError::LayoutNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotAnImage(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::CorruptImage(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(%status, "Request failed: {}", self);
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
