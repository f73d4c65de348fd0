//! Small domain types shared by every crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Authenticated caller identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Wrap a principal id. Empty ids are rejected.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// The principal id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of resource a backend serves.
///
/// Drives cache TTLs, invalidation scope and the default fallback payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceClass {
    /// User profiles and account data
    User,
    /// User-authored reviews
    Review,
    /// Per-user watchlists
    Watchlist,
    /// Anything else
    #[default]
    Generic,
}

impl ResourceClass {
    /// Lowercase label used in logs and metrics
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Review => "review",
            Self::Watchlist => "watchlist",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_rejects_blank() {
        assert!(Principal::new("").is_none());
        assert!(Principal::new("   ").is_none());
        assert_eq!(Principal::new(" u1 ").map(|p| p.to_string()), Some("u1".to_string()));
    }

    #[test]
    fn test_resource_class_serde() {
        let class: ResourceClass = serde_json::from_str("\"watchlist\"").unwrap();
        assert_eq!(class, ResourceClass::Watchlist);
        assert_eq!(serde_json::to_string(&ResourceClass::User).unwrap(), "\"user\"");
        assert_eq!(ResourceClass::default(), ResourceClass::Generic);
    }
}
