//! The kernel's top-level state and its persisted form.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Process-wide kernel state.
///
/// SAFE_MODE survives restarts; every other state is operational. The
/// serialized spellings are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KernelState {
    /// Nothing unusual observed.
    Idle,
    /// Elevated scrutiny after recent failures.
    Screening,
    /// Waiting out entity cooldowns.
    Cooldown,
    /// Operator-triggered halt; every wrapped call is refused.
    SafeMode,
    /// The kernel itself hit an unrecoverable condition.
    Error,
}

impl fmt::Display for KernelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Screening => "SCREENING",
            Self::Cooldown => "COOLDOWN",
            Self::SafeMode => "SAFE_MODE",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// One recorded state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    /// State before the transition.
    pub from_state: KernelState,
    /// State after the transition.
    pub to_state: KernelState,
    /// When it happened, seconds since epoch.
    pub timestamp: f64,
    /// Operator- or kernel-supplied reason.
    pub reason: String,
}

/// The on-disk JSON shape of the kernel state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Current high-level state.
    pub current_state: KernelState,
    /// Entity identifier to absolute cooldown expiry, seconds since epoch.
    #[serde(default)]
    pub active_cooldowns: HashMap<String, f64>,
    /// Entity identifier to failure count.
    #[serde(default)]
    pub fail_counts: HashMap<String, u64>,
    /// Monotonic transition counter.
    #[serde(default)]
    pub total_transitions: u64,
    /// The most recent transition, when any has occurred.
    #[serde(default)]
    pub last_transition: Option<StateTransition>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            current_state: KernelState::Idle,
            active_cooldowns: HashMap::new(),
            fail_counts: HashMap::new(),
            total_transitions: 0,
            last_transition: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_wire_spellings() {
        assert_eq!(
            serde_json::to_string(&KernelState::SafeMode).unwrap(),
            "\"SAFE_MODE\""
        );
        let back: KernelState = serde_json::from_str("\"COOLDOWN\"").unwrap();
        assert_eq!(back, KernelState::Cooldown);
    }

    #[test]
    fn test_default_blank_state() {
        let state = PersistedState::default();
        assert_eq!(state.current_state, KernelState::Idle);
        assert_eq!(state.total_transitions, 0);
        assert!(state.last_transition.is_none());
    }

    #[test]
    fn test_persisted_state_roundtrip() {
        let state = PersistedState {
            current_state: KernelState::SafeMode,
            active_cooldowns: HashMap::from([("api".to_string(), 1_700_000_000.5)]),
            fail_counts: HashMap::from([("api".to_string(), 4)]),
            total_transitions: 7,
            last_transition: Some(StateTransition {
                from_state: KernelState::Idle,
                to_state: KernelState::SafeMode,
                timestamp: 1_700_000_000.0,
                reason: "operator kill switch".to_string(),
            }),
        };

        let json = serde_json::to_string(&state).unwrap();
        let back: PersistedState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_missing_fields_default() {
        let back: PersistedState =
            serde_json::from_str("{\"current_state\":\"IDLE\"}").unwrap();
        assert_eq!(back, PersistedState::default());
    }
}
