//! Cumulative USD budget enforcement.

use std::sync::Mutex;

use tracing::warn;
use veronica_core::{ChainId, Decision, SafetyEvent};

/// Component name recorded on budget events.
const HOOK_NAME: &str = "budget_enforcer";

/// Whether the enforced run is still active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Charges are accepted while under the limit.
    Active,
    /// The limit was hit; every further charge is refused.
    Halted,
}

/// Result of one charge attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargeOutcome {
    /// Whether the charge was accepted.
    pub allowed: bool,
    /// Utilization the charge reaches (or would have reached), in percent.
    pub would_exceed_pct: f64,
}

/// Cumulative cost ceiling for one run.
///
/// `try_charge` transitions the run to [`RunState::Halted`] **before**
/// staging the `BUDGET_EXCEEDED` event, so an event-sink failure can never
/// roll back the enforcement decision. Once halted, every subsequent charge
/// is refused — there is no un-exceeding a budget.
#[derive(Debug)]
pub struct BudgetEnforcer {
    chain_id: ChainId,
    limit_usd: f64,
    state: Mutex<EnforcerState>,
}

#[derive(Debug)]
struct EnforcerState {
    used_usd: f64,
    run_state: RunState,
    staged: Vec<SafetyEvent>,
}

impl BudgetEnforcer {
    /// Create an enforcer with the given USD limit.
    #[must_use]
    pub fn new(chain_id: ChainId, limit_usd: f64) -> Self {
        Self {
            chain_id,
            limit_usd,
            state: Mutex::new(EnforcerState {
                used_usd: 0.0,
                run_state: RunState::Active,
                staged: Vec::new(),
            }),
        }
    }

    /// Attempt to charge `amount` against the limit.
    ///
    /// On the first breach the run transitions to halted, then a single
    /// `BUDGET_EXCEEDED` event is staged.
    pub fn try_charge(&self, amount: f64) -> ChargeOutcome {
        let mut state = self.lock();
        let projected = state.used_usd + amount;
        let pct = (projected / self.limit_usd) * 100.0;

        if state.run_state == RunState::Halted {
            return ChargeOutcome {
                allowed: false,
                would_exceed_pct: pct,
            };
        }

        if projected > self.limit_usd {
            // Transition first; emission must not be able to roll it back.
            state.run_state = RunState::Halted;
            state.staged.push(self.exceeded_event(projected));
            return ChargeOutcome {
                allowed: false,
                would_exceed_pct: pct,
            };
        }

        state.used_usd = projected;
        ChargeOutcome {
            allowed: true,
            would_exceed_pct: pct,
        }
    }

    /// Legacy charge check with emit-then-transition ordering.
    ///
    /// Retained only for backward compatibility; new code must use
    /// [`try_charge`](Self::try_charge). A sink failure between emission and
    /// transition can leave the run active after an exceeded event.
    #[deprecated(note = "use try_charge; this variant emits before transitioning")]
    pub fn check_budget(&self, amount: f64) -> ChargeOutcome {
        let mut state = self.lock();
        let projected = state.used_usd + amount;
        let pct = (projected / self.limit_usd) * 100.0;

        if state.run_state == RunState::Halted {
            return ChargeOutcome {
                allowed: false,
                would_exceed_pct: pct,
            };
        }

        if projected > self.limit_usd {
            state.staged.push(self.exceeded_event(projected));
            state.run_state = RunState::Halted;
            return ChargeOutcome {
                allowed: false,
                would_exceed_pct: pct,
            };
        }

        state.used_usd = projected;
        ChargeOutcome {
            allowed: true,
            would_exceed_pct: pct,
        }
    }

    /// Add a descendant chain's cost unconditionally.
    ///
    /// Propagated spend always lands in the accumulator, even past the
    /// limit — the ceiling fires at this run's next pre-dispatch check, not
    /// at propagation time. No transition, no event.
    pub fn absorb(&self, amount: f64) {
        if amount.is_finite() && amount > 0.0 {
            let mut state = self.lock();
            state.used_usd += amount;
        }
    }

    /// Amount charged so far.
    #[must_use]
    pub fn used(&self) -> f64 {
        self.lock().used_usd
    }

    /// Remaining headroom, never negative.
    #[must_use]
    pub fn remaining(&self) -> f64 {
        (self.limit_usd - self.used()).max(0.0)
    }

    /// The configured limit.
    #[must_use]
    pub fn limit(&self) -> f64 {
        self.limit_usd
    }

    /// Whether the run has been halted.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.lock().run_state == RunState::Halted
    }

    /// Remove and return staged budget events.
    #[must_use]
    pub fn drain_events(&self) -> Vec<SafetyEvent> {
        let mut state = self.lock();
        std::mem::take(&mut state.staged)
    }

    fn exceeded_event(&self, projected: f64) -> SafetyEvent {
        SafetyEvent::new(
            "BUDGET_EXCEEDED",
            Decision::Halt,
            HOOK_NAME,
            format!(
                "charge would reach {projected:.4} USD over limit {:.4}",
                self.limit_usd
            ),
        )
        .with_chain(self.chain_id.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EnforcerState> {
        self.state.lock().unwrap_or_else(|e| {
            warn!("BudgetEnforcer lock poisoned, recovering");
            e.into_inner()
        })
    }
}
