//! Per-service breaker registry.

use crate::circuit_breaker::CircuitBreaker;
use std::collections::HashMap;
use std::sync::Arc;

/// Map from service name to its breaker. Built once at startup.
#[derive(Debug, Default, Clone)]
pub struct BreakerRegistry {
    breakers: HashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a breaker, keyed by its service name
    #[must_use]
    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breakers
            .insert(breaker.service().to_string(), Arc::new(breaker));
        self
    }

    /// Breaker for a service
    #[must_use]
    pub fn get(&self, service: &str) -> Option<&Arc<CircuitBreaker>> {
        self.breakers.get(service)
    }

    /// All breakers, sorted by service name
    #[must_use]
    pub fn all(&self) -> Vec<&Arc<CircuitBreaker>> {
        let mut all: Vec<_> = self.breakers.values().collect();
        all.sort_by(|a, b| a.service().cmp(b.service()));
        all
    }

    /// Number of breakers
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
