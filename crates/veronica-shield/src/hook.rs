//! Hook trait and verdict types.

use serde::{Deserialize, Serialize};
use std::fmt;

use veronica_core::{CallContext, Decision};

/// The boundary at which a hook fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookBoundary {
    /// Before an LLM call is dispatched.
    PreLlm,
    /// Before a tool call is dispatched.
    PreTool,
    /// At tool dispatch, after pre-dispatch checks passed.
    ToolDispatch,
    /// At the egress boundary (outbound URL inspection).
    Egress,
    /// After a dispatch attempt failed, before any retry.
    Retry,
    /// Before a resolved cost is charged to the chain.
    Charge,
}

impl HookBoundary {
    /// Stable lower-case spelling for event tags.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreLlm => "pre_llm",
            Self::PreTool => "pre_tool",
            Self::ToolDispatch => "tool_dispatch",
            Self::Egress => "egress",
            Self::Retry => "retry",
            Self::Charge => "charge",
        }
    }
}

impl fmt::Display for HookBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hook's opinion about a call.
///
/// `None` from a hook method means "no opinion, continue". A returned
/// verdict carries the decision and a bounded reason. An ALLOW verdict is
/// advisory unless `hard` is set, in which case it short-circuits the rest
/// of the pipeline for that boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// The decision.
    pub decision: Decision,
    /// Why the hook decided this.
    pub reason: String,
    /// Event type tag; defaults to the reason's snake form when absent.
    pub event_type: Option<String>,
    /// A hard ALLOW stops further hooks from overriding it.
    pub hard: bool,
}

impl Verdict {
    /// An advisory ALLOW.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            decision: Decision::Allow,
            reason: String::new(),
            event_type: None,
            hard: false,
        }
    }

    /// A hard ALLOW that short-circuits later hooks.
    #[must_use]
    pub fn allow_hard(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Allow,
            reason: reason.into(),
            event_type: None,
            hard: true,
        }
    }

    /// A HALT verdict.
    #[must_use]
    pub fn halt(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Halt,
            reason: reason.into(),
            event_type: None,
            hard: false,
        }
    }

    /// A DEGRADE verdict.
    #[must_use]
    pub fn degrade(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Degrade,
            reason: reason.into(),
            event_type: None,
            hard: false,
        }
    }

    /// A QUARANTINE verdict.
    #[must_use]
    pub fn quarantine(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Quarantine,
            reason: reason.into(),
            event_type: None,
            hard: false,
        }
    }

    /// A RETRY verdict.
    #[must_use]
    pub fn retry(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Retry,
            reason: reason.into(),
            event_type: None,
            hard: false,
        }
    }

    /// Set the event type tag.
    #[must_use]
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Whether the call may proceed past this verdict.
    #[must_use]
    pub fn is_allow(&self) -> bool {
        self.decision.is_allow()
    }
}

/// A composable policy hook.
///
/// All boundary methods default to "no opinion"; implementors override the
/// boundaries they care about. Implementations must be `Send + Sync` and
/// manage their own interior state — the pipeline does not serialize hook
/// evaluation.
pub trait ShieldHook: Send + Sync {
    /// Identifier recorded on the safety events this hook produces.
    fn name(&self) -> &str;

    /// Before an LLM call is dispatched.
    fn before_llm_call(&self, _ctx: &CallContext) -> Option<Verdict> {
        None
    }

    /// Before a tool call is dispatched.
    fn before_tool_call(&self, _ctx: &CallContext) -> Option<Verdict> {
        None
    }

    /// At tool dispatch, after pre-dispatch checks passed.
    fn on_tool_dispatch(&self, _ctx: &CallContext) -> Option<Verdict> {
        None
    }

    /// At the egress boundary. `ctx.url` carries the outbound target.
    fn on_egress(&self, _ctx: &CallContext) -> Option<Verdict> {
        None
    }

    /// After a dispatch attempt failed. Returning a RETRY verdict permits a
    /// re-dispatch (subject to the chain retry budget); HALT stops the call.
    fn on_retry(&self, _ctx: &CallContext, _error: &str) -> Option<Verdict> {
        None
    }

    /// Before `cost_usd` is charged. `chain_total_usd` is the chain's
    /// accumulated cost prior to this charge.
    fn before_charge(
        &self,
        _ctx: &CallContext,
        _cost_usd: f64,
        _chain_total_usd: f64,
    ) -> Option<Verdict> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veronica_core::{CallKind, ChainId};

    struct Denier;

    impl ShieldHook for Denier {
        fn name(&self) -> &str {
            "denier"
        }

        fn before_tool_call(&self, _ctx: &CallContext) -> Option<Verdict> {
            Some(Verdict::halt("denied"))
        }
    }

    #[test]
    fn test_default_methods_have_no_opinion() {
        let hook = Denier;
        let ctx = CallContext::new(ChainId::from_string("c"), CallKind::Llm, "plan");
        assert!(hook.before_llm_call(&ctx).is_none());
        assert!(hook.on_egress(&ctx).is_none());
        assert!(hook.before_charge(&ctx, 0.1, 0.0).is_none());
    }

    #[test]
    fn test_verdict_constructors() {
        assert!(Verdict::allow().is_allow());
        assert!(Verdict::allow_hard("pinned").hard);
        assert_eq!(Verdict::halt("x").decision, Decision::Halt);
        assert_eq!(Verdict::quarantine("x").decision, Decision::Quarantine);
        assert_eq!(Verdict::retry("x").decision, Decision::Retry);
    }

    #[test]
    fn test_boundary_spelling() {
        assert_eq!(HookBoundary::PreLlm.as_str(), "pre_llm");
        assert_eq!(HookBoundary::Charge.to_string(), "charge");
    }
}
