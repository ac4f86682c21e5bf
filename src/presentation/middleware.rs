//! HTTP middleware and extractors for the web server

use axum::{
    Form, Json,
    extract::{FromRequest, Query, Request},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::time::Instant;
use uuid::Uuid;

use crate::application::VersionsQuery;
use crate::application::errors::ApplicationError;
use crate::domain::DomainError;
use crate::presentation::models::{ErrorResponse, VersionsRequest};

/// Error handling middleware
impl IntoResponse for ApplicationError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApplicationError::Domain(DomainError::InvalidQueryMode { .. }) => {
                (StatusCode::BAD_REQUEST, "Unknown query mode")
            }
            ApplicationError::Domain(DomainError::InvalidInput { .. }) => {
                (StatusCode::BAD_REQUEST, "Invalid request parameters")
            }
            ApplicationError::Domain(DomainError::NotFound { .. })
            | ApplicationError::NotFound { .. } => (StatusCode::NOT_FOUND, "Resource not found"),
            ApplicationError::Configuration { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Service configuration error",
            ),
            ApplicationError::Store(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Product store is unavailable",
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal error occurred",
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let error_response = ErrorResponse {
            code: self.error_type().to_string(),
            message: message.to_string(),
            details: Some(serde_json::json!({ "error": self.to_string() })),
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        };

        (status, Json(error_response)).into_response()
    }
}

fn invalid_params(message: impl ToString) -> ApplicationError {
    ApplicationError::Domain(DomainError::InvalidInput {
        field: "body".to_string(),
        message: message.to_string(),
    })
}

/// Versions parameters read from the query string and, for JSON or form
/// bodies, from the body. Body fields win over query string fields.
pub struct VersionsParams(pub VersionsQuery);

impl<S> FromRequest<S> for VersionsParams
where
    S: Send + Sync,
{
    type Rejection = ApplicationError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Query(from_query) = Query::<VersionsRequest>::try_from_uri(req.uri())
            .map_err(|rejection| invalid_params(rejection.body_text()))?;

        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let from_body = if content_type.starts_with("application/json") {
            let Json(body) = Json::<VersionsRequest>::from_request(req, state)
                .await
                .map_err(|rejection| invalid_params(rejection.body_text()))?;
            body
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(body) = Form::<VersionsRequest>::from_request(req, state)
                .await
                .map_err(|rejection| invalid_params(rejection.body_text()))?;
            body
        } else {
            VersionsRequest::default()
        };

        Ok(VersionsParams(from_body.or(from_query).into()))
    }
}

/// Request logging middleware with timing and request ID
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = Uuid::new_v4();
    let start_time = Instant::now();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        "Processing request"
    );

    let response = next.run(request).await;
    let duration = start_time.elapsed();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = duration.as_millis(),
        "Request completed"
    );

    response
}
