//! Window-based token ceilings.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;
use veronica_core::{CallContext, Decision};
use veronica_shield::{ShieldHook, Verdict};

use crate::window::DEFAULT_DEGRADE_THRESHOLD;

/// Which token counts the ceiling applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCeilingMode {
    /// Output tokens only.
    OutputOnly,
    /// Input plus output tokens.
    InputAndOutput,
}

/// Configuration for a [`TokenBudget`].
#[derive(Debug, Clone)]
pub struct TokenBudgetConfig {
    /// Maximum tokens per window.
    pub max_tokens: u64,
    /// Window length in seconds.
    pub window_seconds: u64,
    /// Utilization fraction at which the DEGRADE zone begins (0.0–1.0).
    pub degrade_threshold: f64,
    /// Which counts the ceiling applies to.
    pub mode: TokenCeilingMode,
}

impl TokenBudgetConfig {
    /// Create an output-only config with the default degrade threshold.
    #[must_use]
    pub fn new(max_tokens: u64, window_seconds: u64) -> Self {
        Self {
            max_tokens,
            window_seconds,
            degrade_threshold: DEFAULT_DEGRADE_THRESHOLD,
            mode: TokenCeilingMode::OutputOnly,
        }
    }

    /// Apply the ceiling to input plus output tokens.
    #[must_use]
    pub fn input_and_output(mut self) -> Self {
        self.mode = TokenCeilingMode::InputAndOutput;
        self
    }

    /// Set the degrade threshold (clamped to 0.0–1.0).
    #[must_use]
    pub fn with_degrade_threshold(mut self, threshold: f64) -> Self {
        self.degrade_threshold = threshold.clamp(0.0, 1.0);
        self
    }
}

/// Rolling cap on tokens per window.
///
/// Usage is recorded after each successful call; the check has the same
/// three zones as [`crate::BudgetWindow`]: ALLOW below the degrade
/// threshold, DEGRADE (advisory) up to capacity, HALT at or above it.
#[derive(Debug)]
pub struct TokenBudget {
    config: TokenBudgetConfig,
    state: Mutex<VecDeque<(DateTime<Utc>, u64)>>,
}

impl TokenBudget {
    /// Create a token budget with the given configuration.
    #[must_use]
    pub fn new(config: TokenBudgetConfig) -> Self {
        Self {
            config,
            state: Mutex::new(VecDeque::new()),
        }
    }

    /// Record usage from a completed call now.
    pub fn record(&self, tokens_in: u64, tokens_out: u64) {
        self.record_at(tokens_in, tokens_out, Utc::now());
    }

    /// Record usage at an explicit instant.
    pub fn record_at(&self, tokens_in: u64, tokens_out: u64, now: DateTime<Utc>) {
        let counted = match self.config.mode {
            TokenCeilingMode::OutputOnly => tokens_out,
            TokenCeilingMode::InputAndOutput => tokens_in.saturating_add(tokens_out),
        };
        if counted == 0 {
            return;
        }
        let mut state = self.lock();
        state.push_back((now, counted));
    }

    /// Evaluate the ceiling now.
    #[must_use]
    pub fn check(&self) -> Decision {
        self.check_at(Utc::now())
    }

    /// Evaluate the ceiling at an explicit instant.
    #[must_use]
    pub fn check_at(&self, now: DateTime<Utc>) -> Decision {
        let utilization = self.utilization_at(now);
        if utilization >= 1.0 {
            Decision::Halt
        } else if utilization >= self.config.degrade_threshold {
            Decision::Degrade
        } else {
            Decision::Allow
        }
    }

    /// Current utilization fraction of the window.
    #[must_use]
    pub fn utilization_at(&self, now: DateTime<Utc>) -> f64 {
        let window = Duration::seconds(self.config.window_seconds as i64);
        let mut state = self.lock();
        while let Some((ts, _)) = state.front() {
            if now - *ts >= window {
                state.pop_front();
            } else {
                break;
            }
        }
        let total: u64 = state.iter().map(|(_, tokens)| *tokens).sum();
        total as f64 / self.config.max_tokens as f64
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<(DateTime<Utc>, u64)>> {
        self.state.lock().unwrap_or_else(|e| {
            warn!("TokenBudget lock poisoned, recovering");
            e.into_inner()
        })
    }

    fn gate(&self) -> Option<Verdict> {
        match self.check() {
            Decision::Allow => None,
            Decision::Degrade => Some(
                Verdict::degrade("token window near capacity")
                    .with_event_type("token_budget_degrade"),
            ),
            _ => Some(
                Verdict::halt("token window at capacity").with_event_type("token_budget_exceeded"),
            ),
        }
    }
}

impl ShieldHook for TokenBudget {
    fn name(&self) -> &str {
        "token_budget"
    }

    fn before_llm_call(&self, _ctx: &CallContext) -> Option<Verdict> {
        self.gate()
    }

    fn before_tool_call(&self, _ctx: &CallContext) -> Option<Verdict> {
        self.gate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn test_output_only_mode_ignores_input() {
        let budget = TokenBudget::new(TokenBudgetConfig::new(1000, 60));
        budget.record_at(10_000, 100, at(0));
        assert!((budget.utilization_at(at(1)) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_input_and_output_mode() {
        let budget = TokenBudget::new(TokenBudgetConfig::new(1000, 60).input_and_output());
        budget.record_at(400, 100, at(0));
        assert!((budget.utilization_at(at(1)) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_zones() {
        let budget = TokenBudget::new(TokenBudgetConfig::new(1000, 60));
        assert_eq!(budget.check_at(at(0)), Decision::Allow);

        budget.record_at(0, 800, at(0));
        assert_eq!(budget.check_at(at(1)), Decision::Degrade);

        budget.record_at(0, 200, at(1));
        assert_eq!(budget.check_at(at(2)), Decision::Halt);
    }

    #[test]
    fn test_window_expiry() {
        let budget = TokenBudget::new(TokenBudgetConfig::new(1000, 60));
        budget.record_at(0, 1000, at(0));
        assert_eq!(budget.check_at(at(30)), Decision::Halt);
        assert_eq!(budget.check_at(at(61)), Decision::Allow);
    }
}
