//! Ordered hook evaluation.

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use veronica_core::{CallContext, CallKind, Decision, SafetyEvent};

use crate::event_log::ChainEventLog;
use crate::hook::{HookBoundary, ShieldHook, Verdict};

/// Default event type for hook denials that do not set their own tag.
const DEFAULT_DENIAL_EVENT: &str = "policy_denied";

/// An ordered collection of policy hooks.
///
/// Hooks are evaluated in registration order. The first non-ALLOW verdict at
/// a boundary is final: it is recorded into the chain's event log and
/// returned. A hard ALLOW short-circuits the remaining hooks; an advisory
/// ALLOW lets later hooks still deny.
///
/// The pipeline itself is immutable during evaluation and may be shared
/// across chains; per-chain state (the event log) is passed in by the
/// caller.
#[derive(Default)]
pub struct ShieldPipeline {
    hooks: Vec<Arc<dyn ShieldHook>>,
}

impl ShieldPipeline {
    /// Create an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook at the end of the evaluation order.
    pub fn register(&mut self, hook: Arc<dyn ShieldHook>) {
        self.hooks.push(hook);
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn ShieldHook>) -> Self {
        self.register(hook);
        self
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// Evaluate all pre-dispatch boundaries for a call.
    ///
    /// LLM calls pass the pre-LLM and egress boundaries; tool calls pass
    /// pre-tool, tool-dispatch, and egress. System calls are never gated by
    /// hooks. The first non-ALLOW verdict wins and is recorded into `log`.
    #[must_use]
    pub fn evaluate_pre_dispatch(&self, ctx: &CallContext, log: &ChainEventLog) -> Decision {
        let boundaries: &[HookBoundary] = match ctx.kind {
            CallKind::Llm => &[HookBoundary::PreLlm, HookBoundary::Egress],
            CallKind::Tool => &[
                HookBoundary::PreTool,
                HookBoundary::ToolDispatch,
                HookBoundary::Egress,
            ],
            CallKind::System => return Decision::Allow,
        };

        for boundary in boundaries {
            match self.run_boundary(*boundary, ctx, log) {
                BoundaryOutcome::Continue => {},
                BoundaryOutcome::HardAllow => return Decision::Allow,
                BoundaryOutcome::Denied(decision) => return decision,
            }
        }
        Decision::Allow
    }

    /// Evaluate the retry boundary after a failed dispatch attempt.
    ///
    /// Returns `None` when no hook has an opinion (the caller falls back to
    /// the chain retry budget). A non-ALLOW, non-RETRY verdict is recorded
    /// as a safety event.
    #[must_use]
    pub fn evaluate_retry(
        &self,
        ctx: &CallContext,
        error: &str,
        log: &ChainEventLog,
    ) -> Option<Decision> {
        for hook in &self.hooks {
            if let Some(verdict) = hook.on_retry(ctx, error) {
                if !verdict.is_allow() && verdict.decision != Decision::Retry {
                    self.record(HookBoundary::Retry, hook.name(), ctx, &verdict, log);
                }
                debug!(
                    hook = hook.name(),
                    decision = %verdict.decision,
                    attempt = ctx.attempt,
                    "Retry boundary verdict"
                );
                return Some(verdict.decision);
            }
        }
        None
    }

    /// Evaluate the charge boundary before a resolved cost is applied.
    #[must_use]
    pub fn evaluate_charge(
        &self,
        ctx: &CallContext,
        cost_usd: f64,
        chain_total_usd: f64,
        log: &ChainEventLog,
    ) -> Decision {
        for hook in &self.hooks {
            if let Some(verdict) = hook.before_charge(ctx, cost_usd, chain_total_usd) {
                if !verdict.is_allow() {
                    self.record(HookBoundary::Charge, hook.name(), ctx, &verdict, log);
                    return verdict.decision;
                }
                if verdict.hard {
                    return Decision::Allow;
                }
            }
        }
        Decision::Allow
    }

    fn run_boundary(
        &self,
        boundary: HookBoundary,
        ctx: &CallContext,
        log: &ChainEventLog,
    ) -> BoundaryOutcome {
        for hook in &self.hooks {
            let verdict = match boundary {
                HookBoundary::PreLlm => hook.before_llm_call(ctx),
                HookBoundary::PreTool => hook.before_tool_call(ctx),
                HookBoundary::ToolDispatch => hook.on_tool_dispatch(ctx),
                HookBoundary::Egress => hook.on_egress(ctx),
                // Handled by dedicated entry points.
                HookBoundary::Retry | HookBoundary::Charge => None,
            };
            let Some(verdict) = verdict else { continue };

            if !verdict.is_allow() {
                self.record(boundary, hook.name(), ctx, &verdict, log);
                return BoundaryOutcome::Denied(verdict.decision);
            }
            if verdict.hard {
                return BoundaryOutcome::HardAllow;
            }
        }
        BoundaryOutcome::Continue
    }

    fn record(
        &self,
        boundary: HookBoundary,
        hook_name: &str,
        ctx: &CallContext,
        verdict: &Verdict,
        log: &ChainEventLog,
    ) {
        let event_type = verdict
            .event_type
            .clone()
            .unwrap_or_else(|| DEFAULT_DENIAL_EVENT.to_string());
        debug!(
            hook = hook_name,
            boundary = %boundary,
            decision = %verdict.decision,
            operation = %ctx.operation,
            "Shield verdict recorded"
        );
        log.append(
            SafetyEvent::new(event_type, verdict.decision, hook_name, verdict.reason.clone())
                .with_chain(ctx.chain_id.clone()),
        );
    }
}

enum BoundaryOutcome {
    Continue,
    HardAllow,
    Denied(Decision),
}

impl fmt::Debug for ShieldPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.hooks.iter().map(|h| h.name()).collect();
        f.debug_struct("ShieldPipeline")
            .field("hooks", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veronica_core::ChainId;

    struct Named {
        name: &'static str,
        verdict: Option<Verdict>,
    }

    impl ShieldHook for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn before_tool_call(&self, _ctx: &CallContext) -> Option<Verdict> {
            self.verdict.clone()
        }

        fn before_llm_call(&self, _ctx: &CallContext) -> Option<Verdict> {
            self.verdict.clone()
        }
    }

    fn tool_ctx() -> CallContext {
        CallContext::new(ChainId::from_string("c1"), CallKind::Tool, "web_search")
    }

    #[test]
    fn test_empty_pipeline_allows() {
        let pipeline = ShieldPipeline::new();
        let log = ChainEventLog::new();
        assert_eq!(
            pipeline.evaluate_pre_dispatch(&tool_ctx(), &log),
            Decision::Allow
        );
        assert!(log.is_empty());
    }

    #[test]
    fn test_first_non_allow_wins() {
        let pipeline = ShieldPipeline::new()
            .with_hook(Arc::new(Named {
                name: "first",
                verdict: Some(Verdict::degrade("slow down")),
            }))
            .with_hook(Arc::new(Named {
                name: "second",
                verdict: Some(Verdict::halt("never reached")),
            }));
        let log = ChainEventLog::new();

        assert_eq!(
            pipeline.evaluate_pre_dispatch(&tool_ctx(), &log),
            Decision::Degrade
        );
        let events = log.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].hook, "first");
        assert_eq!(events[0].decision, Decision::Degrade);
    }

    #[test]
    fn test_soft_allow_does_not_short_circuit() {
        let pipeline = ShieldPipeline::new()
            .with_hook(Arc::new(Named {
                name: "soft",
                verdict: Some(Verdict::allow()),
            }))
            .with_hook(Arc::new(Named {
                name: "denier",
                verdict: Some(Verdict::halt("blocked")),
            }));
        let log = ChainEventLog::new();

        assert_eq!(
            pipeline.evaluate_pre_dispatch(&tool_ctx(), &log),
            Decision::Halt
        );
    }

    #[test]
    fn test_hard_allow_short_circuits() {
        let pipeline = ShieldPipeline::new()
            .with_hook(Arc::new(Named {
                name: "pin",
                verdict: Some(Verdict::allow_hard("operator pin")),
            }))
            .with_hook(Arc::new(Named {
                name: "denier",
                verdict: Some(Verdict::halt("blocked")),
            }));
        let log = ChainEventLog::new();

        assert_eq!(
            pipeline.evaluate_pre_dispatch(&tool_ctx(), &log),
            Decision::Allow
        );
        assert!(log.is_empty());
    }

    #[test]
    fn test_system_calls_bypass_hooks() {
        let pipeline = ShieldPipeline::new().with_hook(Arc::new(Named {
            name: "denier",
            verdict: Some(Verdict::halt("blocked")),
        }));
        let log = ChainEventLog::new();
        let ctx = CallContext::new(ChainId::from_string("c1"), CallKind::System, "root");

        assert_eq!(pipeline.evaluate_pre_dispatch(&ctx, &log), Decision::Allow);
    }

    #[test]
    fn test_retry_boundary_no_opinion() {
        let pipeline = ShieldPipeline::new();
        let log = ChainEventLog::new();
        assert!(pipeline
            .evaluate_retry(&tool_ctx(), "timeout", &log)
            .is_none());
    }

    struct RetryDenier;

    impl ShieldHook for RetryDenier {
        fn name(&self) -> &str {
            "retry_denier"
        }

        fn on_retry(&self, _ctx: &CallContext, error: &str) -> Option<Verdict> {
            if error.contains("permanent") {
                Some(Verdict::halt("permanent error").with_event_type("retry_denied"))
            } else {
                Some(Verdict::retry("transient"))
            }
        }
    }

    #[test]
    fn test_retry_boundary_verdicts() {
        let pipeline = ShieldPipeline::new().with_hook(Arc::new(RetryDenier));
        let log = ChainEventLog::new();

        assert_eq!(
            pipeline.evaluate_retry(&tool_ctx(), "transient glitch", &log),
            Some(Decision::Retry)
        );
        assert!(log.is_empty());

        assert_eq!(
            pipeline.evaluate_retry(&tool_ctx(), "permanent failure", &log),
            Some(Decision::Halt)
        );
        let events = log.drain();
        assert_eq!(events[0].event_type, "retry_denied");
    }
}
