//! Immutable route table.

use gateway_config::ServiceConfig;
use gateway_core::ResourceClass;
use serde::Serialize;
use tracing::debug;

/// A single prefix → backend mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    /// Service name
    pub service: String,
    /// Path prefix, without trailing slash
    pub prefix: String,
    /// Backend base URL
    pub base_url: Option<String>,
    /// Resource family
    pub resource_class: ResourceClass,
    /// Backend health path
    pub health_path: String,
}

impl Route {
    /// Create a route
    pub fn new(
        service: impl Into<String>,
        prefix: impl Into<String>,
        base_url: Option<String>,
        resource_class: ResourceClass,
    ) -> Self {
        Self {
            service: service.into(),
            prefix: prefix.into().trim_end_matches('/').to_string(),
            base_url,
            resource_class,
            health_path: "/health".to_string(),
        }
    }

    /// Absolute URL of the backend's health endpoint
    #[must_use]
    pub fn health_url(&self) -> Option<String> {
        self.base_url
            .as_deref()
            .map(|base| join_url(base, &self.health_path, None))
    }

    fn matches(&self, path: &str) -> Option<usize> {
        if path == self.prefix {
            return Some(self.prefix.len());
        }
        if path.starts_with(&self.prefix) && path.as_bytes().get(self.prefix.len()) == Some(&b'/')
        {
            return Some(self.prefix.len());
        }
        None
    }
}

impl From<&ServiceConfig> for Route {
    fn from(svc: &ServiceConfig) -> Self {
        let mut route = Self::new(
            svc.name.clone(),
            svc.prefix.clone(),
            svc.base_url.clone().filter(|u| !u.trim().is_empty()),
            svc.resource_class,
        );
        route.health_path = svc.health_path.clone();
        route
    }
}

/// Result of a successful lookup
#[derive(Debug, Clone, Copy)]
pub struct RouteMatch<'a> {
    /// Matched route
    pub route: &'a Route,
    /// Backend base URL (always present on a match)
    pub base_url: &'a str,
    /// Path left after stripping the prefix
    pub remainder: &'a str,
}

impl RouteMatch<'_> {
    /// Backend URL: base + remainder (`/` when empty) + query
    #[must_use]
    pub fn backend_url(&self, query: Option<&str>) -> String {
        join_url(self.base_url, self.remainder, query)
    }
}

fn join_url(base: &str, path: &str, query: Option<&str>) -> String {
    let base = base.trim_end_matches('/');
    let path = if path.is_empty() { "/" } else { path };
    let sep = if path.starts_with('/') { "" } else { "/" };
    match query.filter(|q| !q.is_empty()) {
        Some(q) => format!("{base}{sep}{path}?{q}"),
        None => format!("{base}{sep}{path}"),
    }
}

/// Ordered set of routes, immutable after construction
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build a table from explicit routes
    #[must_use]
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// Build a table from service configuration
    #[must_use]
    pub fn from_services(services: &[ServiceConfig]) -> Self {
        Self::new(services.iter().map(Route::from).collect())
    }

    /// All routes, in declaration order
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Number of routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table has no routes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Route for a service name
    #[must_use]
    pub fn route(&self, service: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.service == service)
    }

    /// Match a request path. A matched route without a base URL counts as
    /// no match.
    #[must_use]
    pub fn match_path<'a>(&'a self, path: &'a str) -> Option<RouteMatch<'a>> {
        let (route, len) = self
            .routes
            .iter()
            .filter_map(|r| r.matches(path).map(|len| (r, len)))
            .max_by_key(|(_, len)| *len)?;

        let Some(base_url) = route.base_url.as_deref() else {
            debug!(service = %route.service, path = %path, "Route has no backend URL");
            return None;
        };

        Some(RouteMatch {
            route,
            base_url,
            remainder: &path[len..],
        })
    }
}
