//! Chain and request identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of one logical agent run (one containment scope).
///
/// Assigned once at context construction and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub String);

impl ChainId {
    /// Generate a fresh random chain id.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("chain-{}", Uuid::new_v4()))
    }

    /// Wrap an externally supplied chain id.
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ChainId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the inbound request that started a chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a fresh random request id.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("req-{}", Uuid::new_v4()))
    }

    /// Wrap an externally supplied request id.
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_unique() {
        assert_ne!(ChainId::new(), ChainId::new());
    }

    #[test]
    fn test_chain_id_display_roundtrip() {
        let id = ChainId::from_string("chain-fixed");
        assert_eq!(id.to_string(), "chain-fixed");
        assert_eq!(id.as_str(), "chain-fixed");
    }

    #[test]
    fn test_request_id_serde() {
        let id = RequestId::from_string("req-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"req-1\"");
    }
}
