//! Immutable chain identity and attribution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::identity::{ChainId, RequestId};

/// Who and what a chain belongs to.
///
/// Constructed once per containment scope; the `chain_id` is assigned at
/// construction and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainMetadata {
    /// The inbound request that started this chain.
    pub request_id: RequestId,
    /// The chain itself.
    pub chain_id: ChainId,
    /// Owning organization.
    pub org_id: String,
    /// Owning team.
    pub team: String,
    /// Originating service.
    pub service: String,
    /// End user, when attributable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Default model for the chain, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
}

impl ChainMetadata {
    /// Create metadata for a new chain with a fresh chain id.
    #[must_use]
    pub fn new(
        org_id: impl Into<String>,
        team: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            request_id: RequestId::new(),
            chain_id: ChainId::new(),
            org_id: org_id.into(),
            team: team.into(),
            service: service.into(),
            user_id: None,
            model: None,
            tags: HashMap::new(),
        }
    }

    /// Set the request id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    /// Set the end user.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the default model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Attach a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Derive metadata for a child chain spawned under this one.
    ///
    /// The child gets a fresh `chain_id`; attribution fields are inherited.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            request_id: self.request_id.clone(),
            chain_id: ChainId::new(),
            org_id: self.org_id.clone(),
            team: self.team.clone(),
            service: self.service.clone(),
            user_id: self.user_id.clone(),
            model: self.model.clone(),
            tags: self.tags.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_builder() {
        let meta = ChainMetadata::new("org-1", "search", "crawler")
            .with_user("u-9")
            .with_model("small-1")
            .with_tag("env", "prod");

        assert_eq!(meta.org_id, "org-1");
        assert_eq!(meta.user_id.as_deref(), Some("u-9"));
        assert_eq!(meta.tags.get("env").map(String::as_str), Some("prod"));
    }

    #[test]
    fn test_child_gets_fresh_chain_id() {
        let parent = ChainMetadata::new("org-1", "search", "crawler");
        let child = parent.child();
        assert_ne!(parent.chain_id, child.chain_id);
        assert_eq!(parent.request_id, child.request_id);
        assert_eq!(parent.team, child.team);
    }
}
