//! Incrementally maintained chain counters.

use serde::{Deserialize, Serialize};

/// Aggregate counters derived from a chain's graph.
///
/// `total_cost_usd` is monotonically non-decreasing and equals the sum of
/// `cost_usd` over nodes that reached success. Call counters include halted
/// nodes: a dispatched call that was stopped still generated amplification
/// pressure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainAggregates {
    /// Sum of per-node cost over successful nodes, USD.
    pub total_cost_usd: f64,
    /// LLM nodes that reached success, fail, or halt.
    pub total_llm_calls: u64,
    /// Tool nodes that reached success, fail, or halt.
    pub total_tool_calls: u64,
    /// Sum of `retries_used` over terminal nodes.
    pub total_retries: u64,
    /// Highest depth observed when any node was attached.
    pub max_depth: u32,
    /// Sum of reported output tokens over successful nodes.
    pub total_tokens_out: u64,
    /// Divergence events emitted for this chain.
    pub divergence_emitted_count: u64,
}

impl ChainAggregates {
    /// Create zeroed aggregates.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_zeroed() {
        let agg = ChainAggregates::new();
        assert_eq!(agg.total_cost_usd, 0.0);
        assert_eq!(agg.total_llm_calls, 0);
        assert_eq!(agg.max_depth, 0);
    }

    #[test]
    fn test_serde_roundtrip() {
        let agg = ChainAggregates {
            total_cost_usd: 0.9,
            total_llm_calls: 6,
            total_tool_calls: 1,
            total_retries: 2,
            max_depth: 3,
            total_tokens_out: 1200,
            divergence_emitted_count: 1,
        };
        let json = serde_json::to_string(&agg).unwrap();
        let back: ChainAggregates = serde_json::from_str(&json).unwrap();
        assert_eq!(agg, back);
    }
}
