//! Serializable graph snapshots.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use veronica_core::ChainId;

use crate::aggregates::ChainAggregates;
use crate::node::{Node, NodeId};

/// Deep-copied, JSON-serializable view of a graph at one instant.
///
/// Token-usage fields are omitted when unavailable, never faked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// The chain the graph belongs to.
    pub chain_id: ChainId,
    /// The root node id, when a root was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_id: Option<NodeId>,
    /// All nodes, keyed by node id.
    pub nodes: BTreeMap<String, Node>,
    /// The chain counters at snapshot time.
    pub aggregates: ChainAggregates,
    /// When the snapshot was taken, epoch milliseconds.
    pub snapshot_ts_ms: i64,
}
