//! Error-to-HTTP response conversion.

use crate::error::StreamError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so handlers can return `Result<T, ApiError>`.
#[derive(Debug)]
pub struct ApiError(pub StreamError);

impl From<StreamError> for ApiError {
    fn from(e: StreamError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            StreamError::AssetNotFound(_) => StatusCode::NOT_FOUND,
            StreamError::ReadinessTimeout { .. } | StreamError::EncodeExited { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            StreamError::SessionCancelled(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.0, "Stream request failed");
        }

        let body = json!({
            "error": self.0.to_string(),
            "code": self.0.code(),
        });

        (status, axum::Json(body)).into_response()
    }
}
