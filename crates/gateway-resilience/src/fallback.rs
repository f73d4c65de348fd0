//! Static fallback payloads, keyed by resource class.

use gateway_core::{FallbackResponse, ResourceClass};
use serde_json::json;

/// Default fallback for a resource class
#[must_use]
pub fn default_fallback(service: &str, class: ResourceClass) -> FallbackResponse {
    let body = match class {
        ResourceClass::User => json!({
            "message": "User service is temporarily unavailable. Please try again later.",
            "service": service,
            "data": null,
        }),
        ResourceClass::Review => json!({
            "message": "Reviews are temporarily unavailable. Please try again later.",
            "service": service,
            "reviews": [],
        }),
        ResourceClass::Watchlist => json!({
            "message": "Watchlist is temporarily unavailable. Please try again later.",
            "service": service,
            "items": [],
        }),
        ResourceClass::Generic => json!({
            "message": "Service temporarily unavailable. Please try again later.",
            "service": service,
        }),
    };
    FallbackResponse::new(503, body)
}

/// Pick the configured fallback if there is one, else the class default.
///
/// Called once per breaker at construction.
#[must_use]
pub fn resolve_fallback(
    service: &str,
    class: ResourceClass,
    configured: Option<(u16, serde_json::Value)>,
) -> FallbackResponse {
    match configured {
        Some((status, body)) => FallbackResponse::new(status, body),
        None => default_fallback(service, class),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_defaults() {
        let fb = default_fallback("reviews", ResourceClass::Review);
        assert_eq!(fb.status, 503);
        assert_eq!(fb.body["reviews"], json!([]));
        assert_eq!(fb.body["fallback"], json!(true));
        assert_eq!(fb.body["service"], "reviews");

        let fb = default_fallback("watch", ResourceClass::Watchlist);
        assert_eq!(fb.body["items"], json!([]));
    }

    #[test]
    fn test_configured_override() {
        let fb = resolve_fallback(
            "users",
            ResourceClass::User,
            Some((200, json!({"user": {"name": "guest"}}))),
        );
        assert_eq!(fb.status, 200);
        assert_eq!(fb.body["user"]["name"], "guest");
        assert_eq!(fb.body["fallback"], json!(true));
    }
}
