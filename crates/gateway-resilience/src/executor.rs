//! Outbound HTTP executor backed by a shared `reqwest` client.

use async_trait::async_trait;
use gateway_core::{BackendExecutor, BackendRequest, BackendResponse, GatewayError, GatewayResult};
use http::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::trace;

/// Executor configuration
#[derive(Debug, Clone)]
pub struct HttpExecutorConfig {
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Idle connections kept per host
    pub pool_max_idle_per_host: usize,
    /// How long idle pooled connections live
    pub pool_idle_timeout: Duration,
}

impl Default for HttpExecutorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            pool_max_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

/// Performs one HTTP call per [`BackendExecutor::execute`].
///
/// The per-attempt deadline is applied by the circuit breaker, so the
/// client itself only bounds connection setup.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
    connect_timeout: Duration,
}

impl HttpExecutor {
    /// Build an executor with its own connection pool
    pub fn new(config: &HttpExecutorConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            connect_timeout: config.connect_timeout,
        })
    }

    /// Build with default settings
    pub fn with_defaults() -> GatewayResult<Self> {
        Self::new(&HttpExecutorConfig::default())
    }

    fn map_transport_error(&self, service: &str, err: &reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::timeout(service, self.connect_timeout)
        } else {
            GatewayError::connection(service, err.to_string())
        }
    }
}

#[async_trait]
impl BackendExecutor for HttpExecutor {
    async fn execute(&self, service: &str, request: &BackendRequest) -> GatewayResult<BackendResponse> {
        trace!(service = %service, method = %request.method, url = %request.url, "Sending backend request");

        let response = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone())
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| self.map_transport_error(service, &e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_transport_error(service, &e))?;

        if status >= 400 {
            return Err(GatewayError::from_backend_status(service, status, body));
        }

        Ok(BackendResponse::new(status, content_type, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_success_passes_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/1"))
            .and(query_param("expand", "true"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_string(r#"{"id":1}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let exec = HttpExecutor::with_defaults().unwrap();
        let req = BackendRequest::new(Method::GET, format!("{}/users/1?expand=true", server.uri()));
        let resp = exec.execute("users", &req).await.unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type.as_deref(), Some("application/json"));
        assert_eq!(&resp.body[..], br#"{"id":1}"#);
        assert!(!resp.fallback);
    }

    #[tokio::test]
    async fn test_forwards_method_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/reviews"))
            .and(header("x-request-id", "abc"))
            .and(body_string("hello"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = http::HeaderMap::new();
        headers.insert("x-request-id", http::HeaderValue::from_static("abc"));
        let req = BackendRequest::new(Method::POST, format!("{}/reviews", server.uri()))
            .with_headers(headers)
            .with_body("hello");

        let resp = HttpExecutor::with_defaults()
            .unwrap()
            .execute("reviews", &req)
            .await
            .unwrap();
        assert_eq!(resp.status, 201);
    }

    #[tokio::test]
    async fn test_status_classification() {
        let server = MockServer::start().await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
            .mount(&server)
            .await;
        Mock::given(path("/broken"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let exec = HttpExecutor::with_defaults().unwrap();

        let err = exec
            .execute("svc", &BackendRequest::new(Method::GET, format!("{}/missing", server.uri())))
            .await
            .unwrap_err();
        match err {
            GatewayError::ClientError { status, body, .. } => {
                assert_eq!(status, 404);
                assert_eq!(&body[..], b"nope");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = exec
            .execute("svc", &BackendRequest::new(Method::GET, format!("{}/broken", server.uri())))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Upstream { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let exec = HttpExecutor::with_defaults().unwrap();
        // Port 9 (discard) is closed on test hosts
        let err = exec
            .execute("svc", &BackendRequest::new(Method::GET, "http://127.0.0.1:9/"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            GatewayError::Connection { .. } | GatewayError::Timeout { .. }
        ));
    }
}
