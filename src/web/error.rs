// Error types for the API server

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::job_store::StoreError;
use crate::printer_client::PrintError;

/// API server error types
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    InternalServerError(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::InternalServerError(msg) => msg,
        }
    }

    pub fn job_not_found() -> Self {
        Self::NotFound("Job not found".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "detail": self.message() }));

        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(_) => Self::job_not_found(),
            err @ StoreError::InvalidTransition { .. } => Self::Conflict(err.to_string()),
        }
    }
}

// Every forwarding failure surfaces as a 500 with the printer's host in the text.
impl From<PrintError> for ApiError {
    fn from(error: PrintError) -> Self {
        Self::InternalServerError(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobStatus;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError::BadRequest("Empty file received.".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "detail": "Empty file received." }));
    }

    #[test]
    fn test_store_error_mapping() {
        let not_found: ApiError = StoreError::NotFound("x".to_string()).into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let conflict: ApiError = StoreError::InvalidTransition {
            job_id: "x".to_string(),
            from: JobStatus::Completed,
            to: JobStatus::Failed,
        }
        .into();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_print_error_mapping_keeps_host() {
        let err: ApiError = PrintError::ConnectionRefused {
            api_host: "http://printer-api:8080".to_string(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message().contains("http://printer-api:8080"));
        assert!(err.message().contains("refused"));
    }
}
