//! Convenience re-exports for downstream crates.

pub use crate::aggregates::ChainAggregates;
pub use crate::divergence::DivergenceConfig;
pub use crate::graph::ExecutionGraph;
pub use crate::node::{Node, NodeId, NodeStatus};
pub use crate::snapshot::GraphSnapshot;
