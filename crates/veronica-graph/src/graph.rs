//! The per-chain execution graph.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::Utc;
use tracing::warn;
use veronica_core::{CallKind, ChainId, Decision, KernelError, KernelResult, SafetyEvent};

use crate::aggregates::ChainAggregates;
use crate::divergence::{DivergenceConfig, DivergenceDetector};
use crate::node::{Node, NodeId, NodeStatus};
use crate::snapshot::GraphSnapshot;

/// Component name recorded on events this graph produces.
const HOOK_NAME: &str = "execution_graph";

/// Call-tree of one chain, with aggregates and divergence heuristics.
///
/// All mutation goes through one internal lock; the public methods never
/// re-enter it. Mark operations on terminal nodes are silent no-ops; a
/// second root or an unknown parent is a programmer contract violation and
/// returns an error.
#[derive(Debug)]
pub struct ExecutionGraph {
    chain_id: ChainId,
    state: Mutex<GraphState>,
}

#[derive(Debug)]
struct GraphState {
    nodes: BTreeMap<NodeId, Node>,
    root_id: Option<NodeId>,
    next_index: u32,
    start_ts_ms: i64,
    aggregates: ChainAggregates,
    detector: DivergenceDetector,
    staged: Vec<SafetyEvent>,
}

impl ExecutionGraph {
    /// Create an empty graph for the given chain.
    #[must_use]
    pub fn new(chain_id: ChainId) -> Self {
        Self::with_config(chain_id, DivergenceConfig::default())
    }

    /// Create an empty graph with custom divergence tunables.
    #[must_use]
    pub fn with_config(chain_id: ChainId, config: DivergenceConfig) -> Self {
        Self {
            chain_id,
            state: Mutex::new(GraphState {
                nodes: BTreeMap::new(),
                root_id: None,
                next_index: 0,
                start_ts_ms: Utc::now().timestamp_millis(),
                aggregates: ChainAggregates::new(),
                detector: DivergenceDetector::new(config),
                staged: Vec::new(),
            }),
        }
    }

    /// The chain this graph belongs to.
    #[must_use]
    pub fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    /// Create the single root node (`kind=system`, depth 0).
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::RootViolation`] when a root already exists.
    pub fn create_root(&self) -> KernelResult<NodeId> {
        self.create_root_at(Utc::now().timestamp_millis())
    }

    /// Create the root with an explicit timestamp.
    pub fn create_root_at(&self, now_ms: i64) -> KernelResult<NodeId> {
        let mut state = self.lock();
        if state.root_id.is_some() {
            return Err(KernelError::RootViolation(
                "root already exists".to_string(),
            ));
        }
        let node_id = state.issue_id();
        let node = Node::new(
            node_id.clone(),
            None,
            CallKind::System,
            "root".to_string(),
            0,
            now_ms,
        );
        state.nodes.insert(node_id.clone(), node);
        state.root_id = Some(node_id.clone());
        Ok(node_id)
    }

    /// Attach a node under `parent_id`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::UnknownNode`] when the parent does not exist.
    pub fn begin_node(&self, parent_id: &NodeId, kind: CallKind, name: &str) -> KernelResult<NodeId> {
        self.begin_node_full(parent_id, kind, name, None, HashMap::new())
    }

    /// Attach a node with model and metadata.
    pub fn begin_node_full(
        &self,
        parent_id: &NodeId,
        kind: CallKind,
        name: &str,
        model: Option<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> KernelResult<NodeId> {
        self.begin_node_at(parent_id, kind, name, model, metadata, Utc::now().timestamp_millis())
    }

    /// Attach a node with an explicit timestamp.
    #[allow(clippy::needless_pass_by_value)]
    pub fn begin_node_at(
        &self,
        parent_id: &NodeId,
        kind: CallKind,
        name: &str,
        model: Option<String>,
        metadata: HashMap<String, serde_json::Value>,
        now_ms: i64,
    ) -> KernelResult<NodeId> {
        let mut state = self.lock();
        let depth = match state.nodes.get(parent_id) {
            Some(parent) => parent.depth.saturating_add(1),
            None => {
                return Err(KernelError::UnknownNode {
                    node_id: parent_id.to_string(),
                })
            },
        };
        let node_id = state.issue_id();
        let mut node = Node::new(
            node_id.clone(),
            Some(parent_id.clone()),
            kind,
            name.to_string(),
            depth,
            now_ms,
        );
        node.model = model;
        node.metadata = metadata;
        state.nodes.insert(node_id.clone(), node);
        if depth > state.aggregates.max_depth {
            state.aggregates.max_depth = depth;
        }
        Ok(node_id)
    }

    /// Transition a node to running and feed the divergence detector.
    ///
    /// Staged divergence events are retrieved with
    /// [`drain_staged_events`](Self::drain_staged_events).
    pub fn mark_running(&self, node_id: &NodeId) -> KernelResult<()> {
        let mut state = self.lock();
        let (kind, name) = match state.nodes.get_mut(node_id) {
            Some(node) => {
                if node.is_terminal() || node.status == NodeStatus::Running {
                    return Ok(());
                }
                node.status = NodeStatus::Running;
                (node.kind, node.name.clone())
            },
            None => {
                return Err(KernelError::UnknownNode {
                    node_id: node_id.to_string(),
                })
            },
        };

        if let Some(trigger) = state.detector.observe(kind, &name) {
            state.aggregates.divergence_emitted_count =
                state.aggregates.divergence_emitted_count.saturating_add(1);
            let event = SafetyEvent::new(
                "divergence_suspected",
                Decision::Allow,
                HOOK_NAME,
                format!(
                    "trailing run of {} identical {} calls",
                    trigger.repeat_count, kind
                ),
            )
            .with_chain(self.chain_id.clone())
            .with_signature(trigger.signature, trigger.repeat_count)
            .with_severity("warn");
            state.staged.push(event);
        }
        Ok(())
    }

    /// Record how many dispatch retries a node has consumed so far.
    pub fn record_retry(&self, node_id: &NodeId) -> KernelResult<()> {
        let mut state = self.lock();
        match state.nodes.get_mut(node_id) {
            Some(node) if !node.is_terminal() => {
                node.retries_used = node.retries_used.saturating_add(1);
                Ok(())
            },
            Some(_) => Ok(()),
            None => Err(KernelError::UnknownNode {
                node_id: node_id.to_string(),
            }),
        }
    }

    /// Terminate a node as successful and account its cost and tokens.
    pub fn mark_success(
        &self,
        node_id: &NodeId,
        cost_usd: f64,
        tokens_in: Option<u64>,
        tokens_out: Option<u64>,
    ) -> KernelResult<()> {
        self.mark_success_at(node_id, cost_usd, tokens_in, tokens_out, Utc::now().timestamp_millis())
    }

    /// Terminate a node as successful with an explicit timestamp.
    pub fn mark_success_at(
        &self,
        node_id: &NodeId,
        cost_usd: f64,
        tokens_in: Option<u64>,
        tokens_out: Option<u64>,
        now_ms: i64,
    ) -> KernelResult<()> {
        let mut state = self.lock();
        let (kind, retries) = match state.nodes.get_mut(node_id) {
            Some(node) => {
                if node.is_terminal() {
                    return Ok(());
                }
                if node.status != NodeStatus::Running {
                    warn!(node_id = %node_id, status = %node.status, "mark_success on a node that never ran");
                    return Ok(());
                }
                node.status = NodeStatus::Success;
                node.end_ts_ms = Some(now_ms);
                node.cost_usd = cost_usd;
                node.tokens_in = tokens_in;
                node.tokens_out = tokens_out;
                (node.kind, node.retries_used)
            },
            None => {
                return Err(KernelError::UnknownNode {
                    node_id: node_id.to_string(),
                })
            },
        };

        state.count_terminal(kind, retries);
        if cost_usd.is_finite() && cost_usd > 0.0 {
            state.aggregates.total_cost_usd += cost_usd;
        }
        if let Some(out) = tokens_out {
            state.aggregates.total_tokens_out = state.aggregates.total_tokens_out.saturating_add(out);
        }

        let elapsed_sec = (now_ms - state.start_ts_ms) as f64 / 1000.0;
        let total_cost = state.aggregates.total_cost_usd;
        let total_out = state.aggregates.total_tokens_out;
        let triggers = state.detector.check_rates(total_cost, total_out, elapsed_sec);
        if let Some(rate) = triggers.cost_rate {
            let event = SafetyEvent::new(
                "COST_RATE_EXCEEDED",
                Decision::Allow,
                HOOK_NAME,
                format!("spend rate {rate:.4} USD/s over threshold"),
            )
            .with_chain(self.chain_id.clone())
            .with_cost_rate(rate)
            .with_severity("warn");
            state.staged.push(event);
        }
        if let Some(velocity) = triggers.token_velocity {
            let event = SafetyEvent::new(
                "TOKEN_VELOCITY_EXCEEDED",
                Decision::Allow,
                HOOK_NAME,
                format!("token velocity {velocity:.1} tok/s over threshold"),
            )
            .with_chain(self.chain_id.clone())
            .with_token_velocity(velocity)
            .with_severity("warn");
            state.staged.push(event);
        }
        Ok(())
    }

    /// Terminate a node as failed.
    pub fn mark_failure(
        &self,
        node_id: &NodeId,
        error_class: &str,
        stop_reason: Option<String>,
    ) -> KernelResult<()> {
        self.mark_terminal(node_id, NodeStatus::Fail, Some(error_class.to_string()), stop_reason)
    }

    /// Terminate a node as halted by policy.
    pub fn mark_halt(&self, node_id: &NodeId, stop_reason: Option<String>) -> KernelResult<()> {
        self.mark_terminal(node_id, NodeStatus::Halt, None, stop_reason)
    }

    fn mark_terminal(
        &self,
        node_id: &NodeId,
        status: NodeStatus,
        error_class: Option<String>,
        stop_reason: Option<String>,
    ) -> KernelResult<()> {
        let now_ms = Utc::now().timestamp_millis();
        let mut state = self.lock();
        let (kind, retries) = match state.nodes.get_mut(node_id) {
            Some(node) => {
                if node.is_terminal() {
                    return Ok(());
                }
                node.status = status;
                node.end_ts_ms = Some(now_ms);
                node.error_class = error_class;
                node.stop_reason = stop_reason;
                (node.kind, node.retries_used)
            },
            None => {
                return Err(KernelError::UnknownNode {
                    node_id: node_id.to_string(),
                })
            },
        };
        state.count_terminal(kind, retries);
        Ok(())
    }

    /// Finalize every non-terminal node as failed with the given reason.
    ///
    /// Returns how many nodes were finalized. Used on scope exit with reason
    /// `"context_exited"`.
    pub fn finalize_open_nodes(&self, reason: &str) -> usize {
        let now_ms = Utc::now().timestamp_millis();
        let mut state = self.lock();
        let open: Vec<NodeId> = state
            .nodes
            .values()
            .filter(|n| !n.is_terminal())
            .map(|n| n.node_id.clone())
            .collect();
        for node_id in &open {
            if let Some(node) = state.nodes.get_mut(node_id) {
                node.status = NodeStatus::Fail;
                node.end_ts_ms = Some(now_ms);
                node.error_class = Some(reason.to_string());
                let kind = node.kind;
                let retries = node.retries_used;
                state.count_terminal(kind, retries);
            }
        }
        open.len()
    }

    /// Remove and return all staged heuristic events.
    #[must_use]
    pub fn drain_staged_events(&self) -> Vec<SafetyEvent> {
        let mut state = self.lock();
        std::mem::take(&mut state.staged)
    }

    /// Current aggregates (copied).
    #[must_use]
    pub fn aggregates(&self) -> ChainAggregates {
        self.lock().aggregates.clone()
    }

    /// The root node id, when created.
    #[must_use]
    pub fn root_id(&self) -> Option<NodeId> {
        self.lock().root_id.clone()
    }

    /// A copy of one node.
    #[must_use]
    pub fn node(&self, node_id: &NodeId) -> Option<Node> {
        self.lock().nodes.get(node_id).cloned()
    }

    /// Number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    /// Deep-copied, JSON-serializable snapshot of the whole graph.
    #[must_use]
    pub fn snapshot(&self) -> GraphSnapshot {
        self.snapshot_at(Utc::now().timestamp_millis())
    }

    /// Snapshot with an explicit timestamp.
    #[must_use]
    pub fn snapshot_at(&self, now_ms: i64) -> GraphSnapshot {
        let state = self.lock();
        GraphSnapshot {
            chain_id: self.chain_id.clone(),
            root_id: state.root_id.clone(),
            nodes: state
                .nodes
                .iter()
                .map(|(id, node)| (id.to_string(), node.clone()))
                .collect(),
            aggregates: state.aggregates.clone(),
            snapshot_ts_ms: now_ms,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(|e| {
            warn!("ExecutionGraph lock poisoned, recovering");
            e.into_inner()
        })
    }
}

impl GraphState {
    fn issue_id(&mut self) -> NodeId {
        self.next_index = self.next_index.saturating_add(1);
        NodeId::from_index(self.next_index)
    }

    fn count_terminal(&mut self, kind: CallKind, retries: u32) {
        match kind {
            CallKind::Llm => {
                self.aggregates.total_llm_calls = self.aggregates.total_llm_calls.saturating_add(1);
            },
            CallKind::Tool => {
                self.aggregates.total_tool_calls =
                    self.aggregates.total_tool_calls.saturating_add(1);
            },
            CallKind::System => {},
        }
        self.aggregates.total_retries = self
            .aggregates
            .total_retries
            .saturating_add(u64::from(retries));
    }
}
