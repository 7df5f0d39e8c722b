//! Per-call descriptors handed to policy hooks before dispatch.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::identity::ChainId;

/// What kind of operation a call performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    /// A model invocation.
    Llm,
    /// An external tool invocation.
    Tool,
    /// Kernel-internal bookkeeping (root nodes, finalization).
    System,
}

impl CallKind {
    /// Stable lower-case spelling used in signatures and snapshots.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Tool => "tool",
            Self::System => "system",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a hook may inspect about a call before it is dispatched.
///
/// The kernel constructs one per wrap invocation; hooks never see prompt or
/// response content, only the operational envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallContext {
    /// The chain this call belongs to.
    pub chain_id: ChainId,
    /// LLM, tool, or system.
    pub kind: CallKind,
    /// Operation name (tool name or logical LLM step name).
    pub operation: String,
    /// Model identifier, when known before dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Outbound URL, when the call targets one (egress hooks inspect this).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Caller-supplied cost estimate in USD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_estimate_usd: Option<f64>,
    /// Zero-based dispatch attempt (> 0 on retries).
    #[serde(default)]
    pub attempt: u32,
    /// Free-form metadata tags.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl CallContext {
    /// Create a call context for the given chain, kind, and operation name.
    #[must_use]
    pub fn new(chain_id: ChainId, kind: CallKind, operation: impl Into<String>) -> Self {
        Self {
            chain_id,
            kind,
            operation: operation.into(),
            model: None,
            url: None,
            cost_estimate_usd: None,
            attempt: 0,
            metadata: HashMap::new(),
        }
    }

    /// Set the model identifier.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the outbound URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the caller's cost estimate.
    #[must_use]
    pub fn with_cost_estimate(mut self, usd: f64) -> Self {
        self.cost_estimate_usd = Some(usd);
        self
    }

    /// Set the dispatch attempt counter.
    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Attach a metadata tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The `(kind, name)` signature used by repetition heuristics.
    #[must_use]
    pub fn signature(&self) -> (CallKind, &str) {
        (self.kind, &self.operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_kind_spelling() {
        assert_eq!(CallKind::Llm.as_str(), "llm");
        assert_eq!(CallKind::Tool.to_string(), "tool");
    }

    #[test]
    fn test_call_context_builder() {
        let ctx = CallContext::new(ChainId::from_string("c1"), CallKind::Tool, "web_search")
            .with_url("https://example.com")
            .with_cost_estimate(0.02)
            .with_tag("team", "search");

        assert_eq!(ctx.operation, "web_search");
        assert_eq!(ctx.url.as_deref(), Some("https://example.com"));
        assert_eq!(ctx.cost_estimate_usd, Some(0.02));
        assert_eq!(ctx.signature(), (CallKind::Tool, "web_search"));
    }

    #[test]
    fn test_call_context_serde_omits_empty() {
        let ctx = CallContext::new(ChainId::from_string("c1"), CallKind::Llm, "plan");
        let json = serde_json::to_string(&ctx).unwrap();
        assert!(!json.contains("url"));
        assert!(!json.contains("metadata"));
    }
}
