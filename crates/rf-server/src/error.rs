//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`rf_core::Error`] so that route handlers
//! can return `Result<T, AppError>` and use `?` on library calls.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: rf_core::Error,
    request_id: Option<String>,
}

impl AppError {
    pub fn new(inner: rf_core::Error) -> Self {
        Self {
            inner,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, id: String) -> Self {
        self.request_id = Some(id);
        self
    }
}

impl From<rf_core::Error> for AppError {
    fn from(e: rf_core::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Server error in API handler"
            );
        }

        let code = match &self.inner {
            rf_core::Error::NotFound { .. } => "not_found",
            rf_core::Error::InvalidInput(_) => "invalid_input",
            rf_core::Error::InvalidState(_) => "invalid_state",
            rf_core::Error::Execution(_) => "execution_error",
            rf_core::Error::Resource { .. } => "resource_error",
            rf_core::Error::Io { .. } => "io_error",
            rf_core::Error::Tool { .. } => "tool_error",
            rf_core::Error::Internal(_) => "internal_error",
        };

        let body = json!({
            "error": self.inner.to_string(),
            "code": code,
            "request_id": self.request_id,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_produces_404() {
        let err = AppError::new(rf_core::Error::not_found("job", "abc"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_state_produces_409() {
        let err = AppError::new(rf_core::Error::InvalidState("already done".into()));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn invalid_input_produces_400() {
        let err = AppError::new(rf_core::Error::invalid_input("bad crf"));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn with_request_id() {
        let err = AppError::new(rf_core::Error::Internal("oops".into()))
            .with_request_id("req-123".into());
        assert_eq!(err.request_id.as_deref(), Some("req-123"));
    }
}
