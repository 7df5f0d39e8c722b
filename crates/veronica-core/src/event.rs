//! Append-only safety event records.

use serde::{Deserialize, Serialize};

use crate::decision::Decision;
use crate::identity::{ChainId, RequestId};

/// Maximum length of a free-text reason before export.
pub const MAX_REASON_LEN: usize = 500;

/// Structured record of a policy decision or anomaly.
///
/// Events are append-only per chain and never contain prompt or response
/// content. Free-text fields are truncated at construction so downstream
/// sinks can rely on bounded log volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyEvent {
    /// Event type tag, e.g. `BUDGET_EXCEEDED` or `divergence_suspected`.
    pub event_type: String,
    /// The decision the producer arrived at.
    pub decision: Decision,
    /// Identifier of the hook or component that produced the event.
    pub hook: String,
    /// Bounded free-text explanation.
    pub reason: String,
    /// The originating request, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    /// The originating chain, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<ChainId>,
    /// Repeated-call signature, for divergence events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Observed spend rate in USD per second, for rate events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_rate: Option<f64>,
    /// Observed output-token velocity in tokens per second, for rate events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_velocity: Option<f64>,
    /// Trailing repeat count, for divergence events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_count: Option<u32>,
    /// Severity tag for heuristic warnings (`warn`), absent for decisions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

impl SafetyEvent {
    /// Create an event with a bounded reason.
    #[must_use]
    pub fn new(
        event_type: impl Into<String>,
        decision: Decision,
        hook: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            decision,
            hook: hook.into(),
            reason: truncate_reason(reason.into()),
            request_id: None,
            chain_id: None,
            signature: None,
            cost_rate: None,
            token_velocity: None,
            repeat_count: None,
            severity: None,
        }
    }

    /// Attach the originating chain.
    #[must_use]
    pub fn with_chain(mut self, chain_id: ChainId) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Attach the originating request.
    #[must_use]
    pub fn with_request(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Attach a repeated-call signature and its trailing run length.
    #[must_use]
    pub fn with_signature(mut self, signature: impl Into<String>, repeat_count: u32) -> Self {
        self.signature = Some(signature.into());
        self.repeat_count = Some(repeat_count);
        self
    }

    /// Attach an observed spend rate.
    #[must_use]
    pub fn with_cost_rate(mut self, usd_per_sec: f64) -> Self {
        self.cost_rate = Some(usd_per_sec);
        self
    }

    /// Attach an observed token velocity.
    #[must_use]
    pub fn with_token_velocity(mut self, tokens_per_sec: f64) -> Self {
        self.token_velocity = Some(tokens_per_sec);
        self
    }

    /// Attach a severity tag.
    #[must_use]
    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }
}

/// Truncate a free-text reason to [`MAX_REASON_LEN`] characters.
///
/// Truncation is by character, not byte, so multi-byte text stays valid.
#[must_use]
pub fn truncate_reason(reason: String) -> String {
    if reason.chars().count() <= MAX_REASON_LEN {
        return reason;
    }
    reason.chars().take(MAX_REASON_LEN).collect()
}
