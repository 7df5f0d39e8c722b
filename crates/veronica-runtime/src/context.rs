//! The execution context and its wrap algorithm.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use veronica_core::{
    CallContext, CallKind, ChainId, ChainMetadata, Decision, ExecutionConfig, SafetyEvent,
};
use veronica_graph::{ChainAggregates, ExecutionGraph, GraphSnapshot, NodeId};
use veronica_policy::{BudgetBackend, BudgetEnforcer, CircuitBreaker};
use veronica_safemode::SafeModeController;
use veronica_shield::{ChainEventLog, ShieldPipeline};

use crate::error::RuntimeResult;
use crate::options::CallOptions;
use crate::pricing::PricingTable;
use crate::retry::RetryPolicy;

/// Component name recorded on events the context produces.
const HOOK_NAME: &str = "execution_context";

/// Result of one wrapped call.
///
/// `Completed` means the thunk ran to completion (possibly after silent
/// retries) and its charge was accepted. `Suppressed` means the thunk was
/// either never invoked or its result was discarded by policy; the caller
/// must treat a HALT as the signal to break its agent loop.
#[derive(Debug)]
pub enum CallOutcome<T> {
    /// The call completed and was accounted.
    Completed(T),
    /// The call was refused or its result suppressed.
    Suppressed {
        /// The final decision.
        decision: Decision,
        /// Why.
        reason: String,
    },
}

impl<T> CallOutcome<T> {
    /// The decision this outcome carries (ALLOW when completed).
    #[must_use]
    pub fn decision(&self) -> Decision {
        match self {
            Self::Completed(_) => Decision::Allow,
            Self::Suppressed { decision, .. } => *decision,
        }
    }

    /// Whether the call completed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// The suppression reason, when suppressed.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Completed(_) => None,
            Self::Suppressed { reason, .. } => Some(reason),
        }
    }

    /// The completed value, when any.
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Suppressed { .. } => None,
        }
    }
}

/// Per-child overrides at spawn time.
///
/// Unset limits are inherited; the cost ceiling defaults to the parent's
/// remaining budget at the moment of spawn.
#[derive(Debug, Clone, Default)]
pub struct ChildOverrides {
    /// Child cost ceiling, USD.
    pub max_cost_usd: Option<f64>,
    /// Child step limit.
    pub max_steps: Option<u32>,
    /// Child retry budget.
    pub max_retries_total: Option<u32>,
    /// Child wall-clock timeout, milliseconds.
    pub timeout_ms: Option<u64>,
}

enum DispatchFailure {
    Failed(String),
    TimedOut,
    Cancelled,
}

/// One containment scope: one agent run.
///
/// The context owns its graph and event log; the pipeline, breaker,
/// safe-mode controller, pricing table, and budget backend are shared. A
/// child context holds a reference to its parent solely for cost
/// propagation and parent-limit checks; propagation is unidirectional,
/// child to parent.
///
/// Dropping the context finalizes all non-terminal nodes as failed with
/// reason `context_exited` and takes a final snapshot.
///
/// When an admission-control layer in front of the kernel rejects an entry
/// for queue capacity, that decision is final: the kernel has no queue of
/// its own and never silently re-admits rejected work.
pub struct ExecutionContext {
    metadata: ChainMetadata,
    config: ExecutionConfig,
    graph: ExecutionGraph,
    events: ChainEventLog,
    enforcer: BudgetEnforcer,
    pipeline: Arc<ShieldPipeline>,
    breaker: Arc<CircuitBreaker>,
    safemode: Arc<SafeModeController>,
    backend: Option<Arc<dyn BudgetBackend>>,
    pricing: Arc<PricingTable>,
    retry_policy: RetryPolicy,
    parent: Option<Arc<ExecutionContext>>,
    steps_used: AtomicU32,
    retries_used: AtomicU32,
    aborted: AtomicBool,
    abort_reason: Mutex<Option<String>>,
    deadline: Option<Instant>,
    cancel: CancellationToken,
    tail: Mutex<NodeId>,
}

impl ExecutionContext {
    /// Start building a context for the given chain and contract.
    #[must_use]
    pub fn builder(metadata: ChainMetadata, config: ExecutionConfig) -> ContextBuilder {
        ContextBuilder {
            metadata,
            config,
            pipeline: None,
            breaker: None,
            safemode: None,
            backend: None,
            pricing: None,
            retry_policy: None,
        }
    }

    /// Create a context with default collaborators.
    #[must_use]
    pub fn new(metadata: ChainMetadata, config: ExecutionConfig) -> Arc<Self> {
        Self::builder(metadata, config).build()
    }

    /// Spawn a child context under this one.
    ///
    /// The child's cost ceiling defaults to this context's remaining budget
    /// at the moment of spawn; step and retry limits are inherited unless
    /// overridden. Aborting the parent cancels the child's token.
    ///
    /// # Errors
    ///
    /// Returns an error when the effective child ceiling is not positive
    /// (the parent budget is already exhausted).
    pub fn spawn_child(
        self: &Arc<Self>,
        overrides: ChildOverrides,
    ) -> RuntimeResult<Arc<ExecutionContext>> {
        let max_cost = overrides
            .max_cost_usd
            .unwrap_or_else(|| self.enforcer.remaining());
        let config = ExecutionConfig::new(
            max_cost,
            overrides.max_steps.unwrap_or(self.config.max_steps),
            overrides
                .max_retries_total
                .unwrap_or(self.config.max_retries_total),
        )?
        .with_timeout_ms(overrides.timeout_ms.unwrap_or(self.config.timeout_ms));

        let metadata = self.metadata.child();
        let mut deadline = deadline_from(config.timeout_ms);
        if let (Some(own), Some(parent_deadline)) = (deadline, self.deadline) {
            deadline = Some(own.min(parent_deadline));
        } else if deadline.is_none() {
            deadline = self.deadline;
        }

        debug!(
            parent = %self.metadata.chain_id,
            child = %metadata.chain_id,
            max_cost_usd = config.max_cost_usd,
            "Child context spawned"
        );

        Ok(Arc::new(Self::assemble(
            metadata,
            config,
            Arc::clone(&self.pipeline),
            Arc::clone(&self.breaker),
            Arc::clone(&self.safemode),
            self.backend.clone(),
            Arc::clone(&self.pricing),
            self.retry_policy.clone(),
            Some(Arc::clone(self)),
            self.cancel.child_token(),
            deadline,
        )))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        metadata: ChainMetadata,
        config: ExecutionConfig,
        pipeline: Arc<ShieldPipeline>,
        breaker: Arc<CircuitBreaker>,
        safemode: Arc<SafeModeController>,
        backend: Option<Arc<dyn BudgetBackend>>,
        pricing: Arc<PricingTable>,
        retry_policy: RetryPolicy,
        parent: Option<Arc<ExecutionContext>>,
        cancel: CancellationToken,
        deadline: Option<Instant>,
    ) -> Self {
        let graph = ExecutionGraph::new(metadata.chain_id.clone());
        let root_id = graph.create_root().expect("fresh graph has no root");
        let enforcer = BudgetEnforcer::new(metadata.chain_id.clone(), config.max_cost_usd);
        Self {
            metadata,
            config,
            graph,
            events: ChainEventLog::new(),
            enforcer,
            pipeline,
            breaker,
            safemode,
            backend,
            pricing,
            retry_policy,
            parent,
            steps_used: AtomicU32::new(0),
            retries_used: AtomicU32::new(0),
            aborted: AtomicBool::new(false),
            abort_reason: Mutex::new(None),
            deadline,
            cancel,
            tail: Mutex::new(root_id),
        }
    }

    /// Wrap an outbound LLM call.
    pub async fn wrap_llm_call<T, E, F, Fut>(&self, options: CallOptions, f: F) -> CallOutcome<T>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.wrap_call(CallKind::Llm, options, f).await
    }

    /// Wrap an outbound tool call.
    pub async fn wrap_tool_call<T, E, F, Fut>(&self, options: CallOptions, f: F) -> CallOutcome<T>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.wrap_call(CallKind::Tool, options, f).await
    }

    #[allow(clippy::too_many_lines)]
    async fn wrap_call<T, E, F, Fut>(
        &self,
        kind: CallKind,
        options: CallOptions,
        mut f: F,
    ) -> CallOutcome<T>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        // 1. Attach the node under the current tail parent.
        let parent_id = self.tail_parent();
        let node_id = match self.graph.begin_node_full(
            &parent_id,
            kind,
            &options.operation,
            options.model.clone(),
            HashMap::new(),
        ) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Failed to attach graph node");
                return CallOutcome::Suppressed {
                    decision: Decision::Halt,
                    reason: "graph_error".to_string(),
                };
            },
        };
        self.set_tail(node_id.clone());

        // 2. Process-wide kill switch, then chain-level limits in order.
        if self.safemode.is_safe_mode() {
            return self.halt_node(&node_id, "safe_mode");
        }
        if let Some(reason) = self.limit_violation() {
            if reason == "timeout" {
                self.set_aborted(reason);
            }
            return self.halt_node(&node_id, reason);
        }

        // 3. Ancestor limits; a violation propagates HALT both ways.
        let mut cursor = self.parent.clone();
        while let Some(ancestor) = cursor {
            if let Some(reason) = ancestor.limit_violation() {
                ancestor.set_aborted(reason);
                self.set_aborted(reason);
                return self.halt_node(&node_id, reason);
            }
            cursor = ancestor.parent.clone();
        }

        // 4. Circuit breaker, keyed by operation.
        let entity = options.operation.clone();
        let check = self.breaker.check(&entity);
        if !check.allowed {
            let reason = check.reason.unwrap_or_else(|| "circuit_open".to_string());
            return self.halt_node(&node_id, &reason);
        }

        self.steps_used.fetch_add(1, Ordering::SeqCst);

        // 5. Shield pipeline, pre-dispatch boundaries.
        let mut call_ctx = self.call_context(kind, &options);
        let decision = self.pipeline.evaluate_pre_dispatch(&call_ctx, &self.events);
        if !decision.is_allow() {
            let _ = self
                .graph
                .mark_halt(&node_id, Some("policy_denied".to_string()));
            return CallOutcome::Suppressed {
                decision,
                reason: "policy_denied".to_string(),
            };
        }

        // 6. Running; drain any staged divergence events.
        let _ = self.graph.mark_running(&node_id);
        self.events.extend(self.graph.drain_staged_events());

        // 7-9. Dispatch under deadline, with silent bounded retries.
        let per_call_attempts = options
            .max_attempts
            .unwrap_or(self.retry_policy.max_attempts)
            .max(1);
        let mut attempts_made: u32 = 0;

        loop {
            call_ctx.attempt = attempts_made;

            let remaining = self.remaining_deadline();
            if remaining.is_some_and(|r| r.is_zero()) {
                self.set_aborted("timeout");
                return self.halt_node(&node_id, "timeout");
            }
            let per_call = options.timeout_ms.map(Duration::from_millis);
            let effective = match (remaining, per_call) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (Some(a), None) => Some(a),
                (None, b) => b,
            };

            let token = self.cancel.child_token();
            let outcome = self.dispatch(f(token.clone()), &token, effective).await;

            match outcome {
                Ok(value) => {
                    self.breaker.record_success(&entity);
                    return self.complete_success(&node_id, &call_ctx, &options, value).await;
                },
                Err(DispatchFailure::Cancelled) => {
                    return self.halt_node(&node_id, "aborted");
                },
                Err(DispatchFailure::TimedOut) => {
                    self.set_aborted("timeout");
                    return self.halt_node(&node_id, "timeout");
                },
                Err(DispatchFailure::Failed(message)) => {
                    self.breaker.record_failure(&entity);
                    attempts_made = attempts_made.saturating_add(1);

                    // Retry boundary hooks decide first; no opinion falls
                    // back to the chain retry budget.
                    if let Some(decision) =
                        self.pipeline.evaluate_retry(&call_ctx, &message, &self.events)
                    {
                        if decision != Decision::Retry {
                            let _ = self.graph.mark_failure(
                                &node_id,
                                "dispatch_error",
                                Some(message.clone()),
                            );
                            return CallOutcome::Suppressed {
                                decision,
                                reason: message,
                            };
                        }
                    }

                    let chain_retries = self.retries_used.load(Ordering::SeqCst);
                    if attempts_made >= per_call_attempts
                        || chain_retries >= self.config.max_retries_total
                    {
                        let _ = self.graph.mark_failure(
                            &node_id,
                            "retry_budget_exceeded",
                            Some(message.clone()),
                        );
                        self.events.append(
                            SafetyEvent::new(
                                "retry_budget_exceeded",
                                Decision::Halt,
                                HOOK_NAME,
                                message,
                            )
                            .with_chain(self.metadata.chain_id.clone()),
                        );
                        return CallOutcome::Suppressed {
                            decision: Decision::Halt,
                            reason: "retry_budget_exceeded".to_string(),
                        };
                    }

                    // Silent retry: consume chain budget, back off, go again.
                    self.retries_used.fetch_add(1, Ordering::SeqCst);
                    let _ = self.graph.record_retry(&node_id);
                    let delay = self.retry_policy.delay_for(attempts_made - 1);
                    debug!(
                        chain_id = %self.metadata.chain_id,
                        operation = %call_ctx.operation,
                        attempt = attempts_made,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Retrying after dispatch failure"
                    );
                    tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => {
                            return self.halt_node(&node_id, "aborted");
                        },
                        () = tokio::time::sleep(delay) => {},
                    }
                },
            }
        }
    }

    async fn dispatch<T, E, Fut>(
        &self,
        fut: Fut,
        token: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<T, DispatchFailure>
    where
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        if let Some(duration) = timeout {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => Err(DispatchFailure::Cancelled),
                result = tokio::time::timeout(duration, fut) => match result {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => Err(DispatchFailure::Failed(e.to_string())),
                    Err(_) => {
                        // Interrupt a cooperating thunk at its next
                        // suspension point.
                        token.cancel();
                        Err(DispatchFailure::TimedOut)
                    },
                },
            }
        } else {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => Err(DispatchFailure::Cancelled),
                result = fut => result.map_err(|e| DispatchFailure::Failed(e.to_string())),
            }
        }
    }

    async fn complete_success<T>(
        &self,
        node_id: &NodeId,
        call_ctx: &CallContext,
        options: &CallOptions,
        value: T,
    ) -> CallOutcome<T> {
        let (cost, skipped) = self.resolve_cost(options);
        if let Some(event) = skipped {
            self.events.append(event);
        }

        let prior_total = self.enforcer.used();
        let charge = self.enforcer.try_charge(cost);
        self.events.extend(self.enforcer.drain_events());
        if !charge.allowed {
            self.set_aborted("budget_exceeded");
            let _ = self
                .graph
                .mark_halt(node_id, Some("budget_exceeded".to_string()));
            return CallOutcome::Suppressed {
                decision: Decision::Halt,
                reason: "budget_exceeded".to_string(),
            };
        }

        // Propagation completes before the call returns: every ancestor
        // absorbs the cost; ceilings fire at their next pre-dispatch check.
        let mut cursor = self.parent.clone();
        while let Some(ancestor) = cursor {
            ancestor.enforcer.absorb(cost);
            cursor = ancestor.parent.clone();
        }

        if let Some(backend) = &self.backend {
            if let Err(e) = backend.add(cost).await {
                warn!(error = %e, "Budget backend add failed");
            }
        }

        let decision = self
            .pipeline
            .evaluate_charge(call_ctx, cost, prior_total, &self.events);
        if !decision.is_allow() {
            let _ = self
                .graph
                .mark_halt(node_id, Some("charge_denied".to_string()));
            return CallOutcome::Suppressed {
                decision,
                reason: "charge_denied".to_string(),
            };
        }

        let (tokens_in, tokens_out) = match options.usage {
            Some(usage) => (Some(usage.tokens_in), Some(usage.tokens_out)),
            None => (None, None),
        };
        let _ = self.graph.mark_success(node_id, cost, tokens_in, tokens_out);
        self.events.extend(self.graph.drain_staged_events());

        CallOutcome::Completed(value)
    }

    /// Abort the chain: every subsequent wrap returns HALT and the
    /// cancellation token fires.
    pub fn abort(&self, reason: &str) {
        self.set_aborted(reason);
    }

    /// Whether the chain has been aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// The abort reason, when aborted.
    #[must_use]
    pub fn abort_reason(&self) -> Option<String> {
        self.abort_reason
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The chain this context contains.
    #[must_use]
    pub fn chain_id(&self) -> &ChainId {
        &self.metadata.chain_id
    }

    /// The chain metadata.
    #[must_use]
    pub fn metadata(&self) -> &ChainMetadata {
        &self.metadata
    }

    /// The resource contract.
    #[must_use]
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Cost accumulated so far (own calls plus descendants).
    #[must_use]
    pub fn cost_accumulated(&self) -> f64 {
        self.enforcer.used()
    }

    /// Current graph aggregates.
    #[must_use]
    pub fn aggregates(&self) -> ChainAggregates {
        self.graph.aggregates()
    }

    /// A copy of the chain's event log.
    #[must_use]
    pub fn events_snapshot(&self) -> Vec<SafetyEvent> {
        self.events.snapshot()
    }

    /// Remove and return the chain's logged events.
    #[must_use]
    pub fn drain_events(&self) -> Vec<SafetyEvent> {
        self.events.drain()
    }

    /// A snapshot of the execution graph.
    #[must_use]
    pub fn snapshot(&self) -> GraphSnapshot {
        self.graph.snapshot()
    }

    /// This context's cancellation token (cancelled on abort or deadline).
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Finalize open nodes and take the final snapshot.
    ///
    /// Idempotent; also runs from `Drop` if never called explicitly.
    #[must_use]
    pub fn finish(&self) -> GraphSnapshot {
        let finalized = self.graph.finalize_open_nodes("context_exited");
        if finalized > 0 {
            debug!(
                chain_id = %self.metadata.chain_id,
                finalized,
                "Context finished with open nodes"
            );
        }
        self.graph.snapshot()
    }

    fn call_context(&self, kind: CallKind, options: &CallOptions) -> CallContext {
        let mut ctx = CallContext::new(self.metadata.chain_id.clone(), kind, &options.operation);
        ctx.model = options.model.clone();
        ctx.url = options.url.clone();
        ctx.cost_estimate_usd = options.cost_estimate_usd;
        ctx
    }

    fn resolve_cost(&self, options: &CallOptions) -> (f64, Option<SafetyEvent>) {
        if let Some(estimate) = options.cost_estimate_usd {
            return (estimate.max(0.0), None);
        }
        if let Some(model) = &options.model {
            if let Some(usage) = options.usage {
                if let Some(cost) = self.pricing.cost_for(model, usage) {
                    return (cost, None);
                }
            }
            let event = SafetyEvent::new(
                "COST_ESTIMATION_SKIPPED",
                Decision::Allow,
                HOOK_NAME,
                format!("no extractable usage for model {model}"),
            )
            .with_chain(self.metadata.chain_id.clone());
            return (0.0, Some(event));
        }
        (0.0, None)
    }

    fn limit_violation(&self) -> Option<&'static str> {
        if self.aborted.load(Ordering::SeqCst) {
            return Some("aborted");
        }
        if self.enforcer.is_halted() || self.enforcer.used() >= self.config.max_cost_usd {
            return Some("budget_exceeded");
        }
        if self.steps_used.load(Ordering::SeqCst) >= self.config.max_steps {
            return Some("step_limit_exceeded");
        }
        if self.retries_used.load(Ordering::SeqCst) >= self.config.max_retries_total {
            return Some("retry_budget_exceeded");
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Some("timeout");
            }
        }
        None
    }

    fn remaining_deadline(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    fn set_aborted(&self, reason: &str) {
        if !self.aborted.swap(true, Ordering::SeqCst) {
            let mut slot = self.abort_reason.lock().unwrap_or_else(|e| e.into_inner());
            *slot = Some(reason.to_string());
            drop(slot);
            debug!(chain_id = %self.metadata.chain_id, reason, "Chain aborted");
            self.cancel.cancel();
        }
    }

    fn halt_node<T>(&self, node_id: &NodeId, reason: &str) -> CallOutcome<T> {
        let _ = self.graph.mark_halt(node_id, Some(reason.to_string()));
        self.events.append(
            SafetyEvent::new(reason, Decision::Halt, HOOK_NAME, reason)
                .with_chain(self.metadata.chain_id.clone()),
        );
        CallOutcome::Suppressed {
            decision: Decision::Halt,
            reason: reason.to_string(),
        }
    }

    fn tail_parent(&self) -> NodeId {
        self.tail.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_tail(&self, node_id: NodeId) {
        let mut tail = self.tail.lock().unwrap_or_else(|e| e.into_inner());
        *tail = node_id;
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        let finalized = self.graph.finalize_open_nodes("context_exited");
        if finalized > 0 {
            debug!(
                chain_id = %self.metadata.chain_id,
                finalized,
                "Context exited with open nodes"
            );
        }
        let snapshot = self.graph.snapshot();
        debug!(
            chain_id = %self.metadata.chain_id,
            nodes = snapshot.nodes.len(),
            total_cost_usd = snapshot.aggregates.total_cost_usd,
            "Final graph snapshot taken"
        );
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("chain_id", &self.metadata.chain_id)
            .field("cost_accumulated", &self.cost_accumulated())
            .field("steps_used", &self.steps_used.load(Ordering::SeqCst))
            .field("aborted", &self.is_aborted())
            .finish_non_exhaustive()
    }
}

fn deadline_from(timeout_ms: u64) -> Option<Instant> {
    if timeout_ms == 0 {
        None
    } else {
        Some(Instant::now() + Duration::from_millis(timeout_ms))
    }
}

/// Builder for [`ExecutionContext`].
pub struct ContextBuilder {
    metadata: ChainMetadata,
    config: ExecutionConfig,
    pipeline: Option<Arc<ShieldPipeline>>,
    breaker: Option<Arc<CircuitBreaker>>,
    safemode: Option<Arc<SafeModeController>>,
    backend: Option<Arc<dyn BudgetBackend>>,
    pricing: Option<Arc<PricingTable>>,
    retry_policy: Option<RetryPolicy>,
}

impl ContextBuilder {
    /// Use a shared shield pipeline.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: Arc<ShieldPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Use a shared circuit breaker.
    #[must_use]
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Use a shared safe-mode controller.
    #[must_use]
    pub fn with_safemode(mut self, safemode: Arc<SafeModeController>) -> Self {
        self.safemode = Some(safemode);
        self
    }

    /// Use a shared budget backend.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn BudgetBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use a pricing table for actual-cost resolution.
    #[must_use]
    pub fn with_pricing(mut self, pricing: Arc<PricingTable>) -> Self {
        self.pricing = Some(pricing);
        self
    }

    /// Use a retry policy for dispatch failures.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = Some(retry_policy);
        self
    }

    /// Build the context.
    #[must_use]
    pub fn build(self) -> Arc<ExecutionContext> {
        let deadline = deadline_from(self.config.timeout_ms);
        Arc::new(ExecutionContext::assemble(
            self.metadata,
            self.config,
            self.pipeline
                .unwrap_or_else(|| Arc::new(ShieldPipeline::new())),
            self.breaker.unwrap_or_else(|| Arc::new(CircuitBreaker::new())),
            self.safemode
                .unwrap_or_else(|| Arc::new(SafeModeController::new())),
            self.backend,
            self.pricing.unwrap_or_else(|| Arc::new(PricingTable::new())),
            self.retry_policy.unwrap_or_default(),
            None,
            CancellationToken::new(),
            deadline,
        ))
    }
}
