//! Response types for the gateway.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response produced by a backend call, or a fallback standing in for one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendResponse {
    /// HTTP status
    pub status: u16,
    /// Backend `content-type`, if any
    pub content_type: Option<String>,
    /// Raw body
    pub body: Bytes,
    /// True when the body is a static fallback rather than a backend reply
    pub fallback: bool,
}

impl BackendResponse {
    /// Create a response from a real backend reply
    pub fn new(status: u16, content_type: Option<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
            fallback: false,
        }
    }

    /// Whether the status is 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Static per-service payload returned while a breaker refuses traffic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackResponse {
    /// HTTP status to return
    pub status: u16,
    /// JSON body
    pub body: Value,
}

impl FallbackResponse {
    /// Create a fallback. Object bodies always carry `"fallback": true`.
    #[must_use]
    pub fn new(status: u16, mut body: Value) -> Self {
        if let Value::Object(map) = &mut body {
            map.insert("fallback".to_string(), Value::Bool(true));
        }
        Self { status, body }
    }

    /// Render into a response flagged as a fallback
    #[must_use]
    pub fn to_response(&self) -> BackendResponse {
        BackendResponse {
            status: self.status,
            content_type: Some("application/json".to_string()),
            body: Bytes::from(self.body.to_string()),
            fallback: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fallback_marks_body() {
        let fallback = FallbackResponse::new(503, json!({"message": "unavailable"}));
        assert_eq!(fallback.body["fallback"], json!(true));

        let response = fallback.to_response();
        assert!(response.fallback);
        assert_eq!(response.status, 503);
        let parsed: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(parsed["message"], "unavailable");
    }

    #[test]
    fn test_success_range() {
        assert!(BackendResponse::new(204, None, "").is_success());
        assert!(!BackendResponse::new(304, None, "").is_success());
    }
}
