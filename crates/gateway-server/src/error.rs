//! API error responses.
//!
//! Every error leaves the gateway as
//! `{"error": {"message", "status", "timestamp"}}`, except backend 4xx
//! replies, whose status and body are passed through untouched.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use gateway_core::GatewayError;
use serde::Serialize;
use std::time::Duration;

/// Message used for every unmatched path
pub const ROUTE_NOT_FOUND_MESSAGE: &str = "Route not found";

/// Error returned from handlers
#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    passthrough: Option<Bytes>,
    retry_after: Option<Duration>,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
    status: u16,
    timestamp: String,
}

impl ApiError {
    /// Create an error with a status and message
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            passthrough: None,
            retry_after: None,
        }
    }

    /// 404 for paths no route claims
    pub fn route_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, ROUTE_NOT_FOUND_MESSAGE)
    }

    /// 429 with a `Retry-After` hint
    pub fn too_many_requests(retry_after: Duration) -> Self {
        Self {
            retry_after: Some(retry_after),
            ..Self::new(StatusCode::TOO_MANY_REQUESTS, "Too many requests")
        }
    }

    /// 500
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Response status
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status = StatusCode::from_u16(err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match err {
            GatewayError::RouteNotFound { .. } => Self::route_not_found(),
            GatewayError::ClientError { body, .. } => Self {
                passthrough: Some(body),
                ..Self::new(status, reason_phrase(status))
            },
            other => Self::new(status, other.to_string()),
        }
    }
}

fn reason_phrase(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("Client error")
        .to_string()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Some(body) = self.passthrough {
            let content_type = if serde_json::from_slice::<serde_json::Value>(&body).is_ok() {
                "application/json"
            } else {
                "text/plain; charset=utf-8"
            };
            return (
                self.status,
                [(header::CONTENT_TYPE, content_type)],
                body,
            )
                .into_response();
        }

        let envelope = ErrorEnvelope {
            error: ErrorBody {
                message: &self.message,
                status: self.status.as_u16(),
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
        };
        let mut response = (self.status, Json(envelope)).into_response();

        if let Some(retry_after) = self.retry_after {
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
