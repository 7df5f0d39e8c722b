//! Window-based call-rate ceilings.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;
use veronica_core::{CallContext, Decision};
use veronica_shield::{ShieldHook, Verdict};

/// Default fraction of the window at which DEGRADE begins.
pub const DEFAULT_DEGRADE_THRESHOLD: f64 = 0.8;

/// Configuration for a [`BudgetWindow`].
#[derive(Debug, Clone)]
pub struct BudgetWindowConfig {
    /// Maximum calls per window.
    pub max_calls: u32,
    /// Window length in seconds.
    pub window_seconds: u64,
    /// Utilization fraction at which the DEGRADE zone begins (0.0–1.0).
    pub degrade_threshold: f64,
    /// Sliding window (true) or fixed window (false).
    pub sliding: bool,
    /// Suggested model substitutions in the DEGRADE zone.
    pub model_downgrades: HashMap<String, String>,
}

impl BudgetWindowConfig {
    /// Create a sliding-window config with the default degrade threshold.
    #[must_use]
    pub fn new(max_calls: u32, window_seconds: u64) -> Self {
        Self {
            max_calls,
            window_seconds,
            degrade_threshold: DEFAULT_DEGRADE_THRESHOLD,
            sliding: true,
            model_downgrades: HashMap::new(),
        }
    }

    /// Set the degrade threshold (clamped to 0.0–1.0).
    #[must_use]
    pub fn with_degrade_threshold(mut self, threshold: f64) -> Self {
        self.degrade_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Use a fixed window instead of a sliding one.
    #[must_use]
    pub fn fixed(mut self) -> Self {
        self.sliding = false;
        self
    }

    /// Suggest `to` when `from` is requested in the DEGRADE zone.
    #[must_use]
    pub fn with_downgrade(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.model_downgrades.insert(from.into(), to.into());
        self
    }
}

/// Outcome of a window check.
///
/// DEGRADE is advisory: the window returns a suggested model and the caller
/// performs the actual substitution.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowDecision {
    /// ALLOW, DEGRADE, or HALT.
    pub decision: Decision,
    /// Utilization fraction at decision time (may exceed 1.0 on refusal).
    pub utilization: f64,
    /// Suggested substitute model in the DEGRADE zone.
    pub suggested_model: Option<String>,
}

/// Rolling cap on calls per window.
///
/// Three zones by utilization: below the degrade threshold the call is
/// allowed and counted; between the threshold and 100 % the call is counted
/// but the caller is advised to degrade; at or above 100 % the call is
/// refused and not counted.
#[derive(Debug)]
pub struct BudgetWindow {
    config: BudgetWindowConfig,
    state: Mutex<WindowState>,
}

#[derive(Debug)]
struct WindowState {
    // Sliding: individual call timestamps. Fixed: window start + count.
    timestamps: VecDeque<DateTime<Utc>>,
    window_start: Option<DateTime<Utc>>,
    count: u32,
}

impl BudgetWindow {
    /// Create a window with the given configuration.
    #[must_use]
    pub fn new(config: BudgetWindowConfig) -> Self {
        Self {
            config,
            state: Mutex::new(WindowState {
                timestamps: VecDeque::new(),
                window_start: None,
                count: 0,
            }),
        }
    }

    /// Check and count a call now.
    #[must_use]
    pub fn check(&self, model: Option<&str>) -> WindowDecision {
        self.check_at(model, Utc::now())
    }

    /// Check and count a call at an explicit instant.
    #[must_use]
    pub fn check_at(&self, model: Option<&str>, now: DateTime<Utc>) -> WindowDecision {
        let mut state = self.lock();
        let current = self.current_count(&mut state, now);
        let max = f64::from(self.config.max_calls);
        let utilization = f64::from(current) / max;

        if utilization >= 1.0 {
            return WindowDecision {
                decision: Decision::Halt,
                utilization,
                suggested_model: None,
            };
        }

        self.count_call(&mut state, now);

        if utilization >= self.config.degrade_threshold {
            let suggested_model = model
                .and_then(|m| self.config.model_downgrades.get(m))
                .cloned();
            return WindowDecision {
                decision: Decision::Degrade,
                utilization,
                suggested_model,
            };
        }

        WindowDecision {
            decision: Decision::Allow,
            utilization,
            suggested_model: None,
        }
    }

    /// Calls currently counted in the window.
    #[must_use]
    pub fn current_utilization_at(&self, now: DateTime<Utc>) -> f64 {
        let mut state = self.lock();
        let current = self.current_count(&mut state, now);
        f64::from(current) / f64::from(self.config.max_calls)
    }

    fn current_count(&self, state: &mut WindowState, now: DateTime<Utc>) -> u32 {
        let window = Duration::seconds(self.config.window_seconds as i64);
        if self.config.sliding {
            while let Some(oldest) = state.timestamps.front() {
                if now - *oldest >= window {
                    state.timestamps.pop_front();
                } else {
                    break;
                }
            }
            state.timestamps.len() as u32
        } else {
            match state.window_start {
                Some(start) if now - start < window => state.count,
                _ => {
                    state.window_start = Some(now);
                    state.count = 0;
                    0
                },
            }
        }
    }

    fn count_call(&self, state: &mut WindowState, now: DateTime<Utc>) {
        if self.config.sliding {
            state.timestamps.push_back(now);
        } else {
            state.count = state.count.saturating_add(1);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(|e| {
            warn!("BudgetWindow lock poisoned, recovering");
            e.into_inner()
        })
    }

    fn gate(&self, ctx: &CallContext) -> Option<Verdict> {
        let result = self.check(ctx.model.as_deref());
        match result.decision {
            Decision::Allow => None,
            Decision::Degrade => {
                let reason = match &result.suggested_model {
                    Some(model) => format!(
                        "call window at {:.0}%, suggest model {model}",
                        result.utilization * 100.0
                    ),
                    None => format!("call window at {:.0}%", result.utilization * 100.0),
                };
                Some(Verdict::degrade(reason).with_event_type("call_rate_degrade"))
            },
            _ => Some(
                Verdict::halt("call window at capacity").with_event_type("call_rate_exceeded"),
            ),
        }
    }
}

impl ShieldHook for BudgetWindow {
    fn name(&self) -> &str {
        "budget_window"
    }

    fn before_llm_call(&self, ctx: &CallContext) -> Option<Verdict> {
        self.gate(ctx)
    }

    fn before_tool_call(&self, ctx: &CallContext) -> Option<Verdict> {
        self.gate(ctx)
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
    fn test_allows_below_threshold() {
        let window = BudgetWindow::new(BudgetWindowConfig::new(10, 60));
        for _ in 0..7 {
            assert_eq!(window.check_at(None, at(0)).decision, Decision::Allow);
        }
    }

    #[test]
    fn test_degrade_zone() {
        let config = BudgetWindowConfig::new(10, 60).with_downgrade("big-model", "small-model");
        let window = BudgetWindow::new(config);
        for _ in 0..8 {
            window.check_at(None, at(0));
        }
        // Ninth call: 8/10 = 0.8 utilization, in the degrade zone.
        let decision = window.check_at(Some("big-model"), at(0));
        assert_eq!(decision.decision, Decision::Degrade);
        assert_eq!(decision.suggested_model.as_deref(), Some("small-model"));
    }

    #[test]
    fn test_halt_at_capacity_not_counted() {
        let window = BudgetWindow::new(BudgetWindowConfig::new(3, 60));
        for _ in 0..3 {
            window.check_at(None, at(0));
        }
        assert_eq!(window.check_at(None, at(0)).decision, Decision::Halt);
        // The refused call was not counted; utilization stays at 1.0.
        assert!((window.current_utilization_at(at(0)) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sliding_window_expires() {
        let window = BudgetWindow::new(BudgetWindowConfig::new(2, 60));
        window.check_at(None, at(0));
        window.check_at(None, at(1));
        assert_eq!(window.check_at(None, at(2)).decision, Decision::Halt);
        // 61s later the first call has left the window.
        assert_ne!(window.check_at(None, at(61)).decision, Decision::Halt);
    }

    #[test]
    fn test_fixed_window_resets() {
        let window = BudgetWindow::new(BudgetWindowConfig::new(2, 60).fixed());
        window.check_at(None, at(0));
        window.check_at(None, at(1));
        assert_eq!(window.check_at(None, at(2)).decision, Decision::Halt);
        // A new fixed window starts after 60s.
        assert_eq!(window.check_at(None, at(65)).decision, Decision::Allow);
    }

    #[test]
    fn test_no_downgrade_mapping() {
        let window = BudgetWindow::new(BudgetWindowConfig::new(10, 60));
        for _ in 0..9 {
            window.check_at(None, at(0));
        }
        let decision = window.check_at(Some("unmapped"), at(0));
        assert_eq!(decision.decision, Decision::Degrade);
        assert!(decision.suggested_model.is_none());
    }
}
