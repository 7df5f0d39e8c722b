//! Five-level graceful degradation with de-escalation hysteresis.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use veronica_core::DegradationLevel;

/// Default utilization fraction at which SOFT begins.
pub const DEFAULT_SOFT_THRESHOLD: f64 = 0.80;
/// Default utilization fraction at which HARD begins.
pub const DEFAULT_HARD_THRESHOLD: f64 = 0.85;
/// Default utilization fraction at which EMERGENCY begins.
pub const DEFAULT_EMERGENCY_THRESHOLD: f64 = 0.90;
/// Default seconds a lower signal must hold before one de-escalation step.
pub const DEFAULT_STABILITY_WINDOW_SECS: u64 = 60;
/// Default inter-call delay inserted at EMERGENCY, in milliseconds.
pub const DEFAULT_EMERGENCY_DELAY_MS: u64 = 1000;

/// Configuration for a [`DegradeController`].
#[derive(Debug, Clone)]
pub struct DegradeConfig {
    /// Utilization fraction at which SOFT begins.
    pub soft_threshold: f64,
    /// Utilization fraction at which HARD begins.
    pub hard_threshold: f64,
    /// Utilization fraction at which EMERGENCY begins.
    pub emergency_threshold: f64,
    /// Rolling error-rate fraction at which at least SOFT applies.
    pub error_rate_soft: f64,
    /// Rolling error-rate fraction at which at least HARD applies.
    pub error_rate_hard: f64,
    /// Rolling HALT count at which at least EMERGENCY applies.
    pub halt_count_emergency: u64,
    /// Seconds the signal must hold lower before one de-escalation step.
    pub stability_window_secs: u64,
    /// Inter-call delay at EMERGENCY, milliseconds.
    pub emergency_delay_ms: u64,
}

impl Default for DegradeConfig {
    fn default() -> Self {
        Self {
            soft_threshold: DEFAULT_SOFT_THRESHOLD,
            hard_threshold: DEFAULT_HARD_THRESHOLD,
            emergency_threshold: DEFAULT_EMERGENCY_THRESHOLD,
            error_rate_soft: 0.25,
            error_rate_hard: 0.5,
            halt_count_emergency: 3,
            stability_window_secs: DEFAULT_STABILITY_WINDOW_SECS,
            emergency_delay_ms: DEFAULT_EMERGENCY_DELAY_MS,
        }
    }
}

/// The signals one evaluation consumes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DegradeSignals {
    /// Budget utilization fraction (used / limit).
    pub cost_utilization: f64,
    /// Rolling error rate fraction.
    pub error_rate: f64,
    /// Rolling count of HALT decisions.
    pub halt_count: u64,
}

/// Actions the controller asks the caller to take at a level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DegradeActions {
    /// Prefer a cheaper model.
    pub model_downgrade: bool,
    /// Trim context before the next call.
    pub trim_context: bool,
    /// Delay to insert between calls, milliseconds.
    pub rate_limit_delay_ms: u64,
    /// Stop the chain entirely.
    pub halt: bool,
}

/// Tracks the chain's degradation level.
///
/// Escalation is immediate on entering a pressure zone. De-escalation is
/// one step at a time and only after the signal has stayed at the lower
/// level for a full stability window — flapping between levels is a defect,
/// not a tuning choice. FAILED is permanent until an operator
/// [`reset`](Self::reset).
#[derive(Debug)]
pub struct DegradeController {
    config: DegradeConfig,
    state: Mutex<ControllerState>,
}

#[derive(Debug)]
struct ControllerState {
    level: DegradationLevel,
    // Start of the period during which the signal has stayed below the
    // current level.
    lower_since: Option<DateTime<Utc>>,
}

impl DegradeController {
    /// Create a controller at NORMAL with default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DegradeConfig::default())
    }

    /// Create a controller with the given configuration.
    #[must_use]
    pub fn with_config(config: DegradeConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ControllerState {
                level: DegradationLevel::Normal,
                lower_since: None,
            }),
        }
    }

    /// Evaluate the signals now and return the (possibly updated) level.
    pub fn evaluate(&self, signals: DegradeSignals) -> DegradationLevel {
        self.evaluate_at(signals, Utc::now())
    }

    /// Evaluate at an explicit instant.
    pub fn evaluate_at(&self, signals: DegradeSignals, now: DateTime<Utc>) -> DegradationLevel {
        let target = self.target_level(signals);
        let mut state = self.lock();

        if state.level == DegradationLevel::Failed {
            return DegradationLevel::Failed;
        }

        if target > state.level {
            // Escalation is immediate.
            info!(from = %state.level, to = %target, "Degradation escalated");
            state.level = target;
            state.lower_since = None;
            return state.level;
        }

        if target == state.level {
            state.lower_since = None;
            return state.level;
        }

        // Signal is below the current level: de-escalate one step after a
        // full stability window.
        let window = Duration::seconds(self.config.stability_window_secs as i64);
        match state.lower_since {
            None => {
                state.lower_since = Some(now);
            },
            Some(since) if now - since >= window => {
                if let Some(next) = state.level.step_down() {
                    info!(from = %state.level, to = %next, "Degradation recovered one step");
                    state.level = next;
                }
                // Further steps need their own stability window.
                state.lower_since = Some(now);
            },
            Some(_) => {},
        }
        state.level
    }

    /// The current level without re-evaluating.
    #[must_use]
    pub fn level(&self) -> DegradationLevel {
        self.lock().level
    }

    /// Force the controller into FAILED.
    pub fn fail(&self, reason: &str) {
        let mut state = self.lock();
        warn!(reason, "Degradation forced to FAILED");
        state.level = DegradationLevel::Failed;
        state.lower_since = None;
    }

    /// Operator reset back to NORMAL.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.level = DegradationLevel::Normal;
        state.lower_since = None;
    }

    /// The actions the caller should take at the given level.
    #[must_use]
    pub fn actions_for(&self, level: DegradationLevel) -> DegradeActions {
        match level {
            DegradationLevel::Normal => DegradeActions::default(),
            DegradationLevel::Soft => DegradeActions {
                model_downgrade: true,
                ..DegradeActions::default()
            },
            DegradationLevel::Hard => DegradeActions {
                model_downgrade: true,
                trim_context: true,
                ..DegradeActions::default()
            },
            DegradationLevel::Emergency => DegradeActions {
                model_downgrade: true,
                trim_context: true,
                rate_limit_delay_ms: self.config.emergency_delay_ms,
                halt: false,
            },
            DegradationLevel::Failed => DegradeActions {
                model_downgrade: false,
                trim_context: false,
                rate_limit_delay_ms: 0,
                halt: true,
            },
        }
    }

    fn target_level(&self, signals: DegradeSignals) -> DegradationLevel {
        let mut target = if signals.cost_utilization >= self.config.emergency_threshold {
            DegradationLevel::Emergency
        } else if signals.cost_utilization >= self.config.hard_threshold {
            DegradationLevel::Hard
        } else if signals.cost_utilization >= self.config.soft_threshold {
            DegradationLevel::Soft
        } else {
            DegradationLevel::Normal
        };

        if signals.error_rate >= self.config.error_rate_hard {
            target = target.max(DegradationLevel::Hard);
        } else if signals.error_rate >= self.config.error_rate_soft {
            target = target.max(DegradationLevel::Soft);
        }

        if signals.halt_count >= self.config.halt_count_emergency {
            target = target.max(DegradationLevel::Emergency);
        }

        target
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|e| {
            warn!("DegradeController lock poisoned, recovering");
            e.into_inner()
        })
    }
}

impl Default for DegradeController {
    fn default() -> Self {
        Self::new()
    }
}
