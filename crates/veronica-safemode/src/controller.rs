//! The safe-mode controller.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tracing::{info, warn};
use veronica_core::{force_safe_mode_from_env, KernelResult};

use crate::persistence::{load_or_default, write_atomic};
use crate::state::{KernelState, PersistedState, StateTransition};

/// Explicitly constructed process-wide kernel state.
///
/// Pass the instance into each execution context; there is no ambient
/// global. When constructed with a path, every transition is persisted
/// immediately (best effort — a persistence failure is logged and the
/// in-memory transition still holds for the current process).
#[derive(Debug)]
pub struct SafeModeController {
    path: Option<PathBuf>,
    state: Mutex<PersistedState>,
}

impl SafeModeController {
    /// Create an in-memory controller in the blank IDLE state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            path: None,
            state: Mutex::new(PersistedState::default()),
        }
    }

    /// Load (or initialize) a controller persisted at `path`.
    ///
    /// Honors the forced-safe-mode environment toggle: when set, the
    /// controller enters SAFE_MODE immediately regardless of the file.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = load_or_default(&path);
        let controller = Self {
            path: Some(path),
            state: Mutex::new(state),
        };
        if force_safe_mode_from_env() && controller.current_state() != KernelState::SafeMode {
            controller.transition(KernelState::SafeMode, "forced by environment");
        }
        controller
    }

    /// The current kernel state.
    #[must_use]
    pub fn current_state(&self) -> KernelState {
        self.lock().current_state
    }

    /// Whether every wrapped call must be refused.
    #[must_use]
    pub fn is_safe_mode(&self) -> bool {
        self.current_state() == KernelState::SafeMode
    }

    /// Transition to `new_state`, recording and persisting the change.
    ///
    /// A transition to the current state is a no-op and is not counted.
    pub fn transition(&self, new_state: KernelState, reason: &str) {
        self.transition_at(new_state, reason, Utc::now().timestamp_millis() as f64 / 1000.0);
    }

    /// Transition with an explicit timestamp (seconds since epoch).
    pub fn transition_at(&self, new_state: KernelState, reason: &str, now_secs: f64) {
        {
            let mut state = self.lock();
            if state.current_state == new_state {
                return;
            }
            info!(from = %state.current_state, to = %new_state, reason, "Kernel state transition");
            state.last_transition = Some(StateTransition {
                from_state: state.current_state,
                to_state: new_state,
                timestamp: now_secs,
                reason: reason.to_string(),
            });
            state.current_state = new_state;
            state.total_transitions = state.total_transitions.saturating_add(1);
        }
        self.save_best_effort();
    }

    /// Increment and return the failure count for `entity`.
    pub fn record_failure(&self, entity: &str) -> u64 {
        let count = {
            let mut state = self.lock();
            let count = state
                .fail_counts
                .entry(entity.to_string())
                .and_modify(|c| *c = c.saturating_add(1))
                .or_insert(1);
            *count
        };
        self.save_best_effort();
        count
    }

    /// Set an absolute cooldown expiry for `entity` (seconds since epoch).
    pub fn set_cooldown(&self, entity: &str, expires_at_secs: f64) {
        {
            let mut state = self.lock();
            state
                .active_cooldowns
                .insert(entity.to_string(), expires_at_secs);
        }
        self.save_best_effort();
    }

    /// Whether `entity` is cooling down at `now_secs`.
    #[must_use]
    pub fn cooldown_active(&self, entity: &str, now_secs: f64) -> bool {
        self.lock()
            .active_cooldowns
            .get(entity)
            .is_some_and(|expiry| *expiry > now_secs)
    }

    /// Total transitions recorded since the state was first created.
    #[must_use]
    pub fn total_transitions(&self) -> u64 {
        self.lock().total_transitions
    }

    /// A copy of the full persisted state.
    #[must_use]
    pub fn snapshot(&self) -> PersistedState {
        self.lock().clone()
    }

    /// Persist the current state now.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when the atomic write fails; the
    /// in-memory state is unaffected.
    pub fn save(&self) -> KernelResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot = self.snapshot();
        write_atomic(path, &snapshot)
    }

    /// The backing file, when persistent.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn save_best_effort(&self) {
        if let Err(e) = self.save() {
            warn!(error = %e, "Failed to persist kernel state; continuing in memory");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PersistedState> {
        self.state.lock().unwrap_or_else(|e| {
            warn!("SafeModeController lock poisoned, recovering");
            e.into_inner()
        })
    }
}

impl Default for SafeModeController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle() {
        let c = SafeModeController::new();
        assert_eq!(c.current_state(), KernelState::Idle);
        assert!(!c.is_safe_mode());
        assert_eq!(c.total_transitions(), 0);
    }

    #[test]
    fn test_transition_records_and_counts() {
        let c = SafeModeController::new();
        c.transition_at(KernelState::SafeMode, "operator kill switch", 100.0);
        assert!(c.is_safe_mode());
        assert_eq!(c.total_transitions(), 1);

        let snapshot = c.snapshot();
        let last = snapshot.last_transition.unwrap();
        assert_eq!(last.from_state, KernelState::Idle);
        assert_eq!(last.to_state, KernelState::SafeMode);
        assert_eq!(last.reason, "operator kill switch");
    }

    #[test]
    fn test_same_state_transition_not_counted() {
        let c = SafeModeController::new();
        c.transition_at(KernelState::SafeMode, "kill", 100.0);
        c.transition_at(KernelState::SafeMode, "kill again", 101.0);
        assert_eq!(c.total_transitions(), 1);
    }

    #[test]
    fn test_safe_mode_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel_state.json");

        let c = SafeModeController::with_path(&path);
        c.transition_at(KernelState::SafeMode, "operator kill switch", 100.0);
        drop(c);

        // A fresh process loads the same file: still in SAFE_MODE.
        let reloaded = SafeModeController::with_path(&path);
        assert!(reloaded.is_safe_mode());
        assert_eq!(reloaded.total_transitions(), 1);

        // Leaving requires an explicit transition.
        reloaded.transition_at(KernelState::Idle, "operator resume", 200.0);
        assert!(!reloaded.is_safe_mode());
        assert_eq!(reloaded.total_transitions(), 2);
    }

    #[test]
    fn test_fail_counts_and_cooldowns() {
        let c = SafeModeController::new();
        assert_eq!(c.record_failure("api"), 1);
        assert_eq!(c.record_failure("api"), 2);
        assert_eq!(c.record_failure("other"), 1);

        c.set_cooldown("api", 500.0);
        assert!(c.cooldown_active("api", 499.0));
        assert!(!c.cooldown_active("api", 500.0));
        assert!(!c.cooldown_active("unknown", 0.0));
    }
}
