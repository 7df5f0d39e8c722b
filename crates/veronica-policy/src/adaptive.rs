//! Event-driven ceiling-multiplier feedback controller.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use veronica_core::{CallContext, Decision, SafetyEvent};
use veronica_shield::{ShieldHook, Verdict};

/// Component name recorded on adaptive events.
const HOOK_NAME: &str = "adaptive_budget";

/// Configuration for an [`AdaptiveBudgetHook`].
#[derive(Debug, Clone)]
pub struct AdaptiveConfig {
    /// Rolling event window, seconds.
    pub window_seconds: u64,
    /// HALT events in the window that trigger a tighten.
    pub tighten_trigger: u32,
    /// Requested multiplier decrease per tighten.
    pub tighten_pct: f64,
    /// Requested multiplier increase per loosen.
    pub loosen_pct: f64,
    /// Smoothing cap on any single step.
    pub max_step_pct: f64,
    /// Minimum seconds between adjustments.
    pub cooldown_seconds: u64,
    /// Hard multiplier floor.
    pub min_multiplier: f64,
    /// Hard multiplier ceiling.
    pub max_multiplier: f64,
    /// Base USD ceiling gated at the charge boundary, when set.
    pub base_ceiling_usd: Option<f64>,
    /// Enable anomaly (spike) detection.
    pub anomaly_enabled: bool,
    /// Recent period for spike comparison, seconds.
    pub recent_seconds: u64,
    /// Spike factor over the per-period average.
    pub spike_factor: f64,
    /// Extra tightening applied in anomaly mode (factor = 1 − this).
    pub anomaly_tighten_pct: f64,
    /// Seconds anomaly mode stays active.
    pub anomaly_window_seconds: u64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            window_seconds: 600,
            tighten_trigger: 3,
            tighten_pct: 0.10,
            loosen_pct: 0.05,
            max_step_pct: 0.05,
            cooldown_seconds: 900,
            min_multiplier: 0.6,
            max_multiplier: 1.2,
            base_ceiling_usd: None,
            anomaly_enabled: false,
            recent_seconds: 120,
            spike_factor: 3.0,
            anomaly_tighten_pct: 0.15,
            anomaly_window_seconds: 1800,
        }
    }
}

/// What one `adjust` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustAction {
    /// Multiplier decreased.
    Tighten,
    /// Multiplier increased.
    Loosen,
    /// No change warranted.
    Hold,
    /// Blocked by the cooldown window.
    CooldownBlocked,
    /// Loosen blocked while tighten causes remain in the window.
    DirectionLocked,
}

impl fmt::Display for AdjustAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Tighten => "tighten",
            Self::Loosen => "loosen",
            Self::Hold => "hold",
            Self::CooldownBlocked => "cooldown_blocked",
            Self::DirectionLocked => "direction_locked",
        };
        f.write_str(s)
    }
}

/// Self-contained exportable control state.
///
/// Everything except the event buffer; re-feed events through
/// [`AdaptiveBudgetHook::feed_event_at`] after an import if windowed
/// triggering should resume exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveControlState {
    /// Current multiplier.
    pub multiplier: f64,
    /// Current anomaly factor.
    pub anomaly_factor: f64,
    /// Clamped product of multiplier and anomaly factor.
    pub effective_multiplier: f64,
    /// When the last adjustment was applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_adjustment_at: Option<DateTime<Utc>>,
    /// When anomaly mode was activated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_activated_at: Option<DateTime<Utc>>,
    /// The last applied or blocked action.
    pub last_action: AdjustAction,
    /// HALT events observed in the window at the last adjustment.
    pub recent_halt_count: u32,
    /// DEGRADE events observed in the window at the last adjustment.
    pub recent_degrade_count: u32,
    /// Timestamps of the HALT events that caused the last tighten.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tighten_cause_times: Vec<DateTime<Utc>>,
}

#[derive(Debug)]
struct AdaptiveState {
    multiplier: f64,
    anomaly_factor: f64,
    last_adjustment_at: Option<DateTime<Utc>>,
    last_action: AdjustAction,
    recent_halt_count: u32,
    recent_degrade_count: u32,
    tighten_cause_times: Vec<DateTime<Utc>>,
    events: VecDeque<(DateTime<Utc>, Decision)>,
    tighten_history: VecDeque<DateTime<Utc>>,
    anomaly_activated_at: Option<DateTime<Utc>>,
    staged: Vec<SafetyEvent>,
}

/// Feedback controller that adjusts a ceiling multiplier from recent
/// safety-event history.
///
/// The effective ceiling is `base × multiplier × anomaly_factor`, with the
/// composite clamped to the configured hard bounds. Stabilization applies
/// in a fixed order: cooldown window, per-step smoothing, hard floor and
/// ceiling, direction lock.
///
/// A tighten consumes the HALT events that caused it — they stop counting
/// toward further tightens but keep blocking loosen until they age out of
/// the window (the direction lock).
///
/// When `tighten_pct` exceeds `max_step_pct` the step is capped silently;
/// the clamp is observable through the exported control state.
#[derive(Debug)]
pub struct AdaptiveBudgetHook {
    config: AdaptiveConfig,
    state: Mutex<AdaptiveState>,
}

impl AdaptiveBudgetHook {
    /// Create a controller with the given configuration.
    #[must_use]
    pub fn new(config: AdaptiveConfig) -> Self {
        Self {
            config,
            state: Mutex::new(AdaptiveState {
                multiplier: 1.0,
                anomaly_factor: 1.0,
                last_adjustment_at: None,
                last_action: AdjustAction::Hold,
                recent_halt_count: 0,
                recent_degrade_count: 0,
                tighten_cause_times: Vec::new(),
                events: VecDeque::new(),
                tighten_history: VecDeque::new(),
                anomaly_activated_at: None,
                staged: Vec::new(),
            }),
        }
    }

    /// Feed one safety event into the rolling window now.
    pub fn feed_event(&self, event: &SafetyEvent) {
        self.feed_event_at(event.decision, Utc::now());
    }

    /// Feed a decision observation at an explicit instant.
    pub fn feed_event_at(&self, decision: Decision, now: DateTime<Utc>) {
        let window = Duration::seconds(self.config.window_seconds as i64);
        let mut state = self.lock();
        while let Some((ts, _)) = state.events.front() {
            if now - *ts >= window {
                state.events.pop_front();
            } else {
                break;
            }
        }
        state.events.push_back((now, decision));
    }

    /// Run one adjustment cycle now.
    pub fn adjust(&self) -> AdjustAction {
        self.adjust_at(Utc::now())
    }

    /// Run one adjustment cycle at an explicit instant.
    #[allow(clippy::too_many_lines)]
    pub fn adjust_at(&self, now: DateTime<Utc>) -> AdjustAction {
        let window = Duration::seconds(self.config.window_seconds as i64);
        let mut state = self.lock();

        // Anomaly recovery is checked on every cycle, before anything else.
        if let Some(activated) = state.anomaly_activated_at {
            if now - activated >= Duration::seconds(self.config.anomaly_window_seconds as i64) {
                state.anomaly_factor = 1.0;
                state.anomaly_activated_at = None;
                state.staged.push(SafetyEvent::new(
                    "ANOMALY_RECOVERED",
                    Decision::Allow,
                    HOOK_NAME,
                    "anomaly window elapsed, factor reset",
                ));
            }
        }

        // Prune everything that has aged out of the window.
        while let Some((ts, _)) = state.events.front() {
            if now - *ts >= window {
                state.events.pop_front();
            } else {
                break;
            }
        }
        while let Some(ts) = state.tighten_history.front() {
            if now - *ts >= window {
                state.tighten_history.pop_front();
            } else {
                break;
            }
        }
        state.tighten_cause_times.retain(|ts| now - *ts < window);

        let halts: Vec<DateTime<Utc>> = state
            .events
            .iter()
            .filter(|(_, d)| *d == Decision::Halt)
            .map(|(ts, _)| *ts)
            .collect();
        let degrades = state
            .events
            .iter()
            .filter(|(_, d)| *d == Decision::Degrade)
            .count() as u32;
        state.recent_halt_count = halts.len() as u32;
        state.recent_degrade_count = degrades;

        let intent = if halts.len() as u32 >= self.config.tighten_trigger {
            AdjustAction::Tighten
        } else if degrades == 0 {
            AdjustAction::Loosen
        } else {
            AdjustAction::Hold
        };

        if intent == AdjustAction::Hold {
            return AdjustAction::Hold;
        }

        // Stabilization applies in order: cooldown, then direction lock,
        // then the smoothed step under the hard bounds.
        if let Some(last) = state.last_adjustment_at {
            if now - last < Duration::seconds(self.config.cooldown_seconds as i64) {
                state.staged.push(SafetyEvent::new(
                    "ADAPTIVE_COOLDOWN_BLOCKED",
                    Decision::Allow,
                    HOOK_NAME,
                    format!("adjustment {intent} blocked by cooldown"),
                ));
                return AdjustAction::CooldownBlocked;
            }
        }

        if intent == AdjustAction::Loosen
            && state.last_action == AdjustAction::Tighten
            && !state.tighten_cause_times.is_empty()
        {
            state.staged.push(SafetyEvent::new(
                "ADAPTIVE_DIRECTION_LOCKED",
                Decision::Allow,
                HOOK_NAME,
                "loosen blocked while tighten causes remain in window",
            ));
            // last_action stays Tighten so the lock holds until the causes
            // age out of the window.
            return AdjustAction::DirectionLocked;
        }

        match intent {
            AdjustAction::Tighten => {
                let step = self.config.tighten_pct.min(self.config.max_step_pct);
                state.multiplier = (state.multiplier - step)
                    .clamp(self.config.min_multiplier, self.config.max_multiplier);
                // Consume the causes: they stop triggering tightens but keep
                // blocking loosen until they age out.
                state.events.retain(|(_, d)| *d != Decision::Halt);
                state.tighten_cause_times = halts;
                state.tighten_history.push_back(now);
                debug!(multiplier = state.multiplier, "Adaptive tighten applied");
            },
            AdjustAction::Loosen => {
                let step = self.config.loosen_pct.min(self.config.max_step_pct);
                state.multiplier = (state.multiplier + step)
                    .clamp(self.config.min_multiplier, self.config.max_multiplier);
                debug!(multiplier = state.multiplier, "Adaptive loosen applied");
            },
            _ => {},
        }
        state.last_adjustment_at = Some(now);
        state.last_action = intent;

        // Anomaly mode: a burst of tightens well above the per-period
        // average composes an extra factor onto the multiplier.
        if self.config.anomaly_enabled && intent == AdjustAction::Tighten {
            let recent = state
                .tighten_history
                .iter()
                .filter(|ts| now - **ts < Duration::seconds(self.config.recent_seconds as i64))
                .count() as u32;
            let periods = self.config.window_seconds as f64 / self.config.recent_seconds as f64;
            let avg_per_period = state.tighten_history.len() as f64 / periods;
            if recent >= self.config.tighten_trigger
                && f64::from(recent) > self.config.spike_factor * avg_per_period
            {
                state.anomaly_factor = 1.0 - self.config.anomaly_tighten_pct;
                state.anomaly_activated_at = Some(now);
                debug!(
                    anomaly_factor = state.anomaly_factor,
                    "Adaptive anomaly mode activated"
                );
            }
        }

        intent
    }

    /// The clamped composite multiplier.
    #[must_use]
    pub fn effective_multiplier(&self) -> f64 {
        let state = self.lock();
        (state.multiplier * state.anomaly_factor)
            .clamp(self.config.min_multiplier, self.config.max_multiplier)
    }

    /// The raw multiplier before the anomaly factor.
    #[must_use]
    pub fn multiplier(&self) -> f64 {
        self.lock().multiplier
    }

    /// The effective USD ceiling for a base ceiling.
    #[must_use]
    pub fn effective_ceiling(&self, base_ceiling_usd: f64) -> f64 {
        base_ceiling_usd * self.effective_multiplier()
    }

    /// Export the control state for deterministic replay.
    #[must_use]
    pub fn export_control_state(&self) -> AdaptiveControlState {
        let state = self.lock();
        AdaptiveControlState {
            multiplier: state.multiplier,
            anomaly_factor: state.anomaly_factor,
            effective_multiplier: (state.multiplier * state.anomaly_factor)
                .clamp(self.config.min_multiplier, self.config.max_multiplier),
            last_adjustment_at: state.last_adjustment_at,
            anomaly_activated_at: state.anomaly_activated_at,
            last_action: state.last_action,
            recent_halt_count: state.recent_halt_count,
            recent_degrade_count: state.recent_degrade_count,
            tighten_cause_times: state.tighten_cause_times.clone(),
        }
    }

    /// Restore an exported control state.
    ///
    /// The event buffer is not part of the exported state; re-feed events
    /// through [`feed_event_at`](Self::feed_event_at) if desired.
    pub fn import_control_state(&self, control: AdaptiveControlState) {
        let mut state = self.lock();
        state.multiplier = control
            .multiplier
            .clamp(self.config.min_multiplier, self.config.max_multiplier);
        state.anomaly_factor = if control.anomaly_factor.is_finite() {
            control.anomaly_factor
        } else {
            1.0
        };
        state.last_adjustment_at = control.last_adjustment_at;
        state.anomaly_activated_at = control.anomaly_activated_at;
        state.last_action = control.last_action;
        state.recent_halt_count = control.recent_halt_count;
        state.recent_degrade_count = control.recent_degrade_count;
        state.tighten_cause_times = control.tighten_cause_times;
    }

    /// Remove and return staged adaptive events.
    #[must_use]
    pub fn drain_staged_events(&self) -> Vec<SafetyEvent> {
        let mut state = self.lock();
        std::mem::take(&mut state.staged)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AdaptiveState> {
        self.state.lock().unwrap_or_else(|e| {
            warn!("AdaptiveBudgetHook lock poisoned, recovering");
            e.into_inner()
        })
    }
}

impl ShieldHook for AdaptiveBudgetHook {
    fn name(&self) -> &str {
        HOOK_NAME
    }

    fn before_charge(
        &self,
        _ctx: &CallContext,
        cost_usd: f64,
        chain_total_usd: f64,
    ) -> Option<Verdict> {
        let base = self.config.base_ceiling_usd?;
        let ceiling = self.effective_ceiling(base);
        if chain_total_usd + cost_usd > ceiling {
            return Some(
                Verdict::halt(format!(
                    "charge would reach {:.4} USD over adaptive ceiling {ceiling:.4}",
                    chain_total_usd + cost_usd
                ))
                .with_event_type("adaptive_ceiling_exceeded"),
            );
        }
        None
    }
}
