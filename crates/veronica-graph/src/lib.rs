//! Veronica Graph - the per-chain execution graph.
//!
//! Every wrapped call becomes a [`Node`] in an [`ExecutionGraph`]: a DAG
//! rooted at a single system node, with one-way status transitions and
//! incrementally maintained [`ChainAggregates`]. The graph also runs the
//! kernel's divergence heuristics — trailing-run repetition detection and
//! spend/token rate checks — staging [`veronica_core::SafetyEvent`]s that
//! the caller drains after each `mark_running`.
//!
//! All graph mutation goes through a single internal lock; callers never
//! observe a partially updated graph.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod aggregates;
pub mod divergence;
pub mod graph;
pub mod node;
pub mod snapshot;

pub use aggregates::ChainAggregates;
pub use divergence::DivergenceConfig;
pub use graph::ExecutionGraph;
pub use node::{Node, NodeId, NodeStatus};
pub use snapshot::GraphSnapshot;
