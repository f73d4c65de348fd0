//! Caller identity.
//!
//! Extraction never rejects a request: a missing, malformed or invalid
//! credential simply yields no principal, and the request continues as
//! anonymous.

use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use gateway_config::{AuthConfig, AuthMode};
use gateway_core::{GatewayError, GatewayResult, Principal};
use http::{header, HeaderName};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolved identity, stored in request extensions
#[derive(Debug, Clone, Default)]
pub struct Identity(pub Option<Principal>);

/// Derives an optional principal from request headers
pub trait IdentityExtractor: Send + Sync {
    /// Principal for these headers, if any
    fn extract(&self, headers: &HeaderMap) -> Option<Principal>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// HS256 bearer tokens
pub struct JwtIdentityExtractor {
    key: DecodingKey,
    validation: Validation,
    claim: String,
}

impl std::fmt::Debug for JwtIdentityExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtIdentityExtractor")
            .field("claim", &self.claim)
            .finish_non_exhaustive()
    }
}

impl JwtIdentityExtractor {
    /// Create an extractor verifying tokens with `secret`
    pub fn new(secret: &str, claim: impl Into<String>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            claim: claim.into(),
        }
    }

    /// Require this issuer
    #[must_use]
    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }

    /// Require this audience
    #[must_use]
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.validation.set_audience(&[audience]);
        self.validation.validate_aud = true;
        self
    }
}

impl IdentityExtractor for JwtIdentityExtractor {
    fn extract(&self, headers: &HeaderMap) -> Option<Principal> {
        let token = bearer_token(headers)?;

        let data = match decode::<HashMap<String, Value>>(token, &self.key, &self.validation) {
            Ok(data) => data,
            Err(e) => {
                debug!(error = %e, "Ignoring invalid bearer token");
                return None;
            }
        };

        // Numeric ids are common in `sub`-like claims
        match data.claims.get(&self.claim)? {
            Value::String(s) => Principal::new(s.as_str()),
            Value::Number(n) => Principal::new(n.to_string()),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        "jwt"
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Trusts a header set by an upstream authenticator
#[derive(Debug, Clone)]
pub struct HeaderIdentityExtractor {
    header: HeaderName,
}

impl HeaderIdentityExtractor {
    /// Read the principal from `header`
    pub fn new(header: &str) -> GatewayResult<Self> {
        let header = HeaderName::try_from(header).map_err(|e| {
            GatewayError::configuration(format!("invalid principal header {header:?}: {e}"))
        })?;
        Ok(Self { header })
    }
}

impl IdentityExtractor for HeaderIdentityExtractor {
    fn extract(&self, headers: &HeaderMap) -> Option<Principal> {
        headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .and_then(Principal::new)
    }

    fn name(&self) -> &'static str {
        "header"
    }
}

/// Treats every caller as anonymous
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIdentity;

impl IdentityExtractor for NoIdentity {
    fn extract(&self, _headers: &HeaderMap) -> Option<Principal> {
        None
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Build the extractor selected by configuration
pub fn build_identity_extractor(config: &AuthConfig) -> GatewayResult<Arc<dyn IdentityExtractor>> {
    let extractor: Arc<dyn IdentityExtractor> = match config.mode {
        AuthMode::Jwt => match config.jwt_secret.as_deref() {
            Some(secret) => {
                let mut jwt = JwtIdentityExtractor::new(secret, config.principal_claim.clone());
                if let Some(issuer) = &config.issuer {
                    jwt = jwt.with_issuer(issuer);
                }
                if let Some(audience) = &config.audience {
                    jwt = jwt.with_audience(audience);
                }
                Arc::new(jwt)
            }
            None => {
                warn!("No JWT secret configured, all requests are treated as anonymous");
                Arc::new(NoIdentity)
            }
        },
        AuthMode::Header => Arc::new(HeaderIdentityExtractor::new(&config.principal_header)?),
        AuthMode::None => Arc::new(NoIdentity),
    };
    Ok(extractor)
}

/// Resolve the caller and store an [`Identity`] in the request extensions
pub async fn identity_middleware(
    axum::extract::State(extractor): axum::extract::State<Arc<dyn IdentityExtractor>>,
    mut request: Request,
    next: Next,
) -> Response {
    let principal = extractor.extract(request.headers());
    request.extensions_mut().insert(Identity(principal));
    next.run(request).await
}
