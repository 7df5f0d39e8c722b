//! Repetition and rate heuristics.
//!
//! Divergence detection watches the trailing run of identical call
//! signatures in a fixed-size ring buffer. Only trailing runs trigger —
//! alternating patterns like A,B,A,B never do, no matter how long. Each
//! `(chain, signature)` pair emits at most one event.

use std::collections::{HashSet, VecDeque};

use veronica_core::CallKind;

/// Ring buffer capacity for signature history.
pub const SIGNATURE_WINDOW: usize = 8;
/// Default trailing-run threshold for tool calls.
pub const DEFAULT_TOOL_THRESHOLD: u32 = 3;
/// Default trailing-run threshold for LLM calls.
pub const DEFAULT_LLM_THRESHOLD: u32 = 5;
/// Default trailing-run threshold for system nodes (effectively disabled).
pub const DEFAULT_SYSTEM_THRESHOLD: u32 = 999;
/// Default spend-rate ceiling, USD per second.
pub const DEFAULT_COST_RATE_THRESHOLD: f64 = 0.10;
/// Default output-token velocity ceiling, tokens per second.
pub const DEFAULT_TOKEN_VELOCITY_THRESHOLD: f64 = 500.0;
/// Below this elapsed time rate heuristics are skipped entirely.
pub const MIN_ELAPSED_SEC: f64 = 0.001;

/// Tunables for the divergence and rate heuristics.
#[derive(Debug, Clone)]
pub struct DivergenceConfig {
    /// Trailing-run threshold per call kind.
    pub tool_threshold: u32,
    /// Trailing-run threshold for LLM calls.
    pub llm_threshold: u32,
    /// Trailing-run threshold for system nodes.
    pub system_threshold: u32,
    /// Spend-rate ceiling in USD per second.
    pub cost_rate_threshold: f64,
    /// Output-token velocity ceiling in tokens per second.
    pub token_velocity_threshold: f64,
}

impl DivergenceConfig {
    /// The trailing-run threshold for a call kind.
    #[must_use]
    pub fn threshold_for(&self, kind: CallKind) -> u32 {
        match kind {
            CallKind::Tool => self.tool_threshold,
            CallKind::Llm => self.llm_threshold,
            CallKind::System => self.system_threshold,
        }
    }
}

impl Default for DivergenceConfig {
    fn default() -> Self {
        Self {
            tool_threshold: DEFAULT_TOOL_THRESHOLD,
            llm_threshold: DEFAULT_LLM_THRESHOLD,
            system_threshold: DEFAULT_SYSTEM_THRESHOLD,
            cost_rate_threshold: DEFAULT_COST_RATE_THRESHOLD,
            token_velocity_threshold: DEFAULT_TOKEN_VELOCITY_THRESHOLD,
        }
    }
}

/// A triggered trailing-run observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunTrigger {
    pub(crate) signature: String,
    pub(crate) repeat_count: u32,
}

/// Rate-heuristic trigger flags for one `mark_success`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RateTriggers {
    pub(crate) cost_rate: Option<f64>,
    pub(crate) token_velocity: Option<f64>,
}

#[derive(Debug)]
pub(crate) struct DivergenceDetector {
    config: DivergenceConfig,
    ring: VecDeque<String>,
    emitted: HashSet<String>,
    cost_rate_emitted: bool,
    token_velocity_emitted: bool,
}

impl DivergenceDetector {
    pub(crate) fn new(config: DivergenceConfig) -> Self {
        Self {
            config,
            ring: VecDeque::with_capacity(SIGNATURE_WINDOW),
            emitted: HashSet::new(),
            cost_rate_emitted: false,
            token_velocity_emitted: false,
        }
    }

    /// Record a signature at `mark_running` time; returns a trigger when the
    /// trailing run reaches the kind's threshold and this signature has not
    /// fired before.
    pub(crate) fn observe(&mut self, kind: CallKind, name: &str) -> Option<RunTrigger> {
        let signature = format!("{}:{name}", kind.as_str());

        if self.ring.len() == SIGNATURE_WINDOW {
            self.ring.pop_front();
        }
        self.ring.push_back(signature.clone());

        let run = self
            .ring
            .iter()
            .rev()
            .take_while(|s| **s == signature)
            .count() as u32;

        if run >= self.config.threshold_for(kind) && !self.emitted.contains(&signature) {
            self.emitted.insert(signature.clone());
            return Some(RunTrigger {
                signature,
                repeat_count: run,
            });
        }
        None
    }

    /// Evaluate rate heuristics at `mark_success` time.
    ///
    /// Skipped entirely when `elapsed_sec` is below [`MIN_ELAPSED_SEC`] to
    /// avoid near-zero division. Each heuristic fires at most once per graph.
    pub(crate) fn check_rates(
        &mut self,
        total_cost_usd: f64,
        total_tokens_out: u64,
        elapsed_sec: f64,
    ) -> RateTriggers {
        let mut triggers = RateTriggers::default();
        if elapsed_sec < MIN_ELAPSED_SEC {
            return triggers;
        }

        let cost_rate = total_cost_usd / elapsed_sec;
        if cost_rate > self.config.cost_rate_threshold && !self.cost_rate_emitted {
            self.cost_rate_emitted = true;
            triggers.cost_rate = Some(cost_rate);
        }

        let token_velocity = total_tokens_out as f64 / elapsed_sec;
        if token_velocity > self.config.token_velocity_threshold && !self.token_velocity_emitted {
            self.token_velocity_emitted = true;
            triggers.token_velocity = Some(token_velocity);
        }

        triggers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> DivergenceDetector {
        DivergenceDetector::new(DivergenceConfig::default())
    }

    #[test]
    fn test_tool_run_triggers_at_three() {
        let mut d = detector();
        assert!(d.observe(CallKind::Tool, "X").is_none());
        assert!(d.observe(CallKind::Tool, "X").is_none());
        let trigger = d.observe(CallKind::Tool, "X").unwrap();
        assert_eq!(trigger.signature, "tool:X");
        assert_eq!(trigger.repeat_count, 3);
    }

    #[test]
    fn test_dedup_per_signature() {
        let mut d = detector();
        d.observe(CallKind::Tool, "X");
        d.observe(CallKind::Tool, "X");
        assert!(d.observe(CallKind::Tool, "X").is_some());
        // Run continues — no further emission for the same signature.
        assert!(d.observe(CallKind::Tool, "X").is_none());
        assert!(d.observe(CallKind::Tool, "X").is_none());
    }

    #[test]
    fn test_alternating_never_triggers() {
        let mut d = detector();
        for _ in 0..20 {
            assert!(d.observe(CallKind::Tool, "A").is_none());
            assert!(d.observe(CallKind::Tool, "B").is_none());
        }
    }

    #[test]
    fn test_interrupted_run_resets_tail() {
        let mut d = detector();
        d.observe(CallKind::Tool, "X");
        d.observe(CallKind::Tool, "X");
        d.observe(CallKind::Tool, "Y");
        // Tail run restarts; two more X are not enough.
        assert!(d.observe(CallKind::Tool, "X").is_none());
        assert!(d.observe(CallKind::Tool, "X").is_none());
        assert!(d.observe(CallKind::Tool, "X").is_some());
    }

    #[test]
    fn test_llm_threshold_is_five() {
        let mut d = detector();
        for _ in 0..4 {
            assert!(d.observe(CallKind::Llm, "plan").is_none());
        }
        assert!(d.observe(CallKind::Llm, "plan").is_some());
    }

    #[test]
    fn test_distinct_signatures_trigger_independently() {
        let mut d = detector();
        d.observe(CallKind::Tool, "X");
        d.observe(CallKind::Tool, "X");
        assert!(d.observe(CallKind::Tool, "X").is_some());
        d.observe(CallKind::Tool, "Y");
        d.observe(CallKind::Tool, "Y");
        assert!(d.observe(CallKind::Tool, "Y").is_some());
    }

    #[test]
    fn test_rates_skip_near_zero_elapsed() {
        let mut d = detector();
        let triggers = d.check_rates(100.0, 1_000_000, 0.0005);
        assert!(triggers.cost_rate.is_none());
        assert!(triggers.token_velocity.is_none());
    }

    #[test]
    fn test_cost_rate_fires_once() {
        let mut d = detector();
        let first = d.check_rates(10.0, 0, 10.0);
        assert!(first.cost_rate.is_some());
        let second = d.check_rates(20.0, 0, 10.0);
        assert!(second.cost_rate.is_none());
    }

    #[test]
    fn test_token_velocity_threshold() {
        let mut d = detector();
        let below = d.check_rates(0.0, 4_999, 10.0);
        assert!(below.token_velocity.is_none());
        let above = d.check_rates(0.0, 5_001, 10.0);
        let velocity = above.token_velocity.unwrap();
        assert!((velocity - 500.1).abs() < 1e-9);
    }
}
