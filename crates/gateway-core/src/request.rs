//! Request types for the gateway.
//!
//! [`ProxyRequest`] is what the dispatcher receives from the HTTP layer;
//! [`BackendRequest`] is what the breaker sends to a backend.

use crate::types::Principal;
use bytes::Bytes;
use http::{HeaderMap, Method};

/// Inbound request handed to the proxy dispatcher
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// HTTP method
    pub method: Method,
    /// Request path, without query string
    pub path: String,
    /// Raw query string, without the leading `?`
    pub query: Option<String>,
    /// Inbound headers
    pub headers: HeaderMap,
    /// Request body
    pub body: Bytes,
    /// Authenticated caller, if any
    pub principal: Option<Principal>,
}

impl ProxyRequest {
    /// Create a request with an empty body and no headers
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            principal: None,
        }
    }

    /// Set the query string
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = if query.is_empty() { None } else { Some(query) };
        self
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the headers
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the authenticated principal
    #[must_use]
    pub fn with_principal(mut self, principal: Option<Principal>) -> Self {
        self.principal = principal;
        self
    }

    /// Path plus query string, as the client sent it
    #[must_use]
    pub fn request_url(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{q}", self.path),
            None => self.path.clone(),
        }
    }

    /// GET requests are the only cacheable ones
    #[must_use]
    pub fn is_read(&self) -> bool {
        self.method == Method::GET
    }

    /// POST, PUT, PATCH and DELETE trigger cache invalidation on success
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(
            self.method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        )
    }
}

/// Outbound call to a single backend
#[derive(Debug, Clone)]
pub struct BackendRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute backend URL
    pub url: String,
    /// Headers to forward
    pub headers: HeaderMap,
    /// Request body
    pub body: Bytes,
}

impl BackendRequest {
    /// Create a request with no headers and an empty body
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the headers
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}
