//! Graph nodes and their one-way lifecycle.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use veronica_core::CallKind;

/// Identifier of a node within one graph.
///
/// Issued monotonically (`n000001`, `n000002`, …) and never reused within a
/// graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    /// Build the id for the given issue index.
    #[must_use]
    pub fn from_index(index: u32) -> Self {
        Self(format!("n{index:06}"))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a node.
///
/// Transitions are one-way: `Created → Running → {Success | Fail | Halt}`,
/// or `Created → {Fail | Halt}` for calls denied before dispatch. Terminal
/// statuses never change; re-marking a terminal node is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Attached to the graph, not yet dispatched.
    Created,
    /// Dispatch in flight.
    Running,
    /// Completed and accounted.
    Success,
    /// Failed terminally.
    Fail,
    /// Stopped by policy before or during dispatch.
    Halt,
}

impl NodeStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Fail | Self::Halt)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Success => "success",
            Self::Fail => "fail",
            Self::Halt => "halt",
        };
        f.write_str(s)
    }
}

/// One operation in the call tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Monotonically issued id, unique within the graph.
    pub node_id: NodeId,
    /// Parent node; `None` only for the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    /// LLM, tool, or system.
    pub kind: CallKind,
    /// Operation name.
    pub name: String,
    /// Depth in the tree; root is 0.
    pub depth: u32,
    /// When the node was attached, epoch milliseconds.
    pub start_ts_ms: i64,
    /// When the node reached a terminal status, epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_ts_ms: Option<i64>,
    /// Lifecycle status.
    pub status: NodeStatus,
    /// Model used, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Dispatch retries consumed by this node.
    pub retries_used: u32,
    /// Resolved cost in USD (0 until success).
    pub cost_usd: f64,
    /// Input tokens, when reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_in: Option<u64>,
    /// Output tokens, when reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_out: Option<u64>,
    /// Why the operation stopped, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    /// Error classification for failed nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Node {
    pub(crate) fn new(
        node_id: NodeId,
        parent_id: Option<NodeId>,
        kind: CallKind,
        name: String,
        depth: u32,
        start_ts_ms: i64,
    ) -> Self {
        Self {
            node_id,
            parent_id,
            kind,
            name,
            depth,
            start_ts_ms,
            end_ts_ms: None,
            status: NodeStatus::Created,
            model: None,
            retries_used: 0,
            cost_usd: 0.0,
            tokens_in: None,
            tokens_out: None,
            stop_reason: None,
            error_class: None,
            metadata: HashMap::new(),
        }
    }

    /// Whether the node has reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_format() {
        assert_eq!(NodeId::from_index(1).as_str(), "n000001");
        assert_eq!(NodeId::from_index(123_456).as_str(), "n123456");
    }

    #[test]
    fn test_status_terminality() {
        assert!(!NodeStatus::Created.is_terminal());
        assert!(!NodeStatus::Running.is_terminal());
        assert!(NodeStatus::Success.is_terminal());
        assert!(NodeStatus::Fail.is_terminal());
        assert!(NodeStatus::Halt.is_terminal());
    }

    #[test]
    fn test_status_serde_spelling() {
        let json = serde_json::to_string(&NodeStatus::Halt).unwrap();
        assert_eq!(json, "\"halt\"");
    }
}
