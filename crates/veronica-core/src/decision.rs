//! The closed decision vocabulary of the containment kernel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Verdict produced by a policy evaluation before a call is dispatched.
///
/// The set is closed and the serialized spellings are stable across
/// versions — external consumers match on the exact strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Proceed with the call.
    Allow,
    /// Re-dispatch the call after a backoff delay.
    Retry,
    /// Proceed, but the caller should downgrade (model, context size, rate).
    Degrade,
    /// Defer the call to an external admission queue.
    Queue,
    /// Isolate the call for operator review; do not dispatch.
    Quarantine,
    /// Refuse the call and stop the chain.
    Halt,
}

impl Decision {
    /// Whether the call may proceed to dispatch.
    #[must_use]
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Whether this decision terminates the call without dispatch.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Halt | Self::Quarantine)
    }

    /// Stable wire spelling of the decision.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Retry => "RETRY",
            Self::Degrade => "DEGRADE",
            Self::Queue => "QUEUE",
            Self::Quarantine => "QUARANTINE",
            Self::Halt => "HALT",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Graceful degradation level of a chain.
///
/// Escalation is immediate on entering a pressure zone; de-escalation is one
/// step at a time behind a stability window (see `veronica-policy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DegradationLevel {
    /// No restriction.
    Normal,
    /// Advisory downgrades.
    Soft,
    /// Context trimming and stricter model selection.
    Hard,
    /// Rate-limit insertion between calls.
    Emergency,
    /// Permanent halt; requires operator reset.
    Failed,
}

impl DegradationLevel {
    /// The next level down toward [`DegradationLevel::Normal`], if any.
    ///
    /// [`DegradationLevel::Failed`] never de-escalates on its own.
    #[must_use]
    pub fn step_down(&self) -> Option<Self> {
        match self {
            Self::Normal | Self::Failed => None,
            Self::Soft => Some(Self::Normal),
            Self::Hard => Some(Self::Soft),
            Self::Emergency => Some(Self::Hard),
        }
    }
}

impl fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Normal => "NORMAL",
            Self::Soft => "SOFT",
            Self::Hard => "HARD",
            Self::Emergency => "EMERGENCY",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// State of a failure-isolation circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls pass through; failures are counted.
    Closed,
    /// All calls denied until the recovery timeout elapses.
    Open,
    /// Exactly one probe call is allowed through.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_wire_spellings() {
        let json = serde_json::to_string(&Decision::Quarantine).unwrap();
        assert_eq!(json, "\"QUARANTINE\"");
        let back: Decision = serde_json::from_str("\"HALT\"").unwrap();
        assert_eq!(back, Decision::Halt);
    }

    #[test]
    fn test_decision_predicates() {
        assert!(Decision::Allow.is_allow());
        assert!(!Decision::Degrade.is_allow());
        assert!(Decision::Halt.is_terminal());
        assert!(Decision::Quarantine.is_terminal());
        assert!(!Decision::Retry.is_terminal());
    }

    #[test]
    fn test_degradation_step_down_never_skips() {
        assert_eq!(
            DegradationLevel::Emergency.step_down(),
            Some(DegradationLevel::Hard)
        );
        assert_eq!(
            DegradationLevel::Hard.step_down(),
            Some(DegradationLevel::Soft)
        );
        assert_eq!(
            DegradationLevel::Soft.step_down(),
            Some(DegradationLevel::Normal)
        );
        assert_eq!(DegradationLevel::Normal.step_down(), None);
        assert_eq!(DegradationLevel::Failed.step_down(), None);
    }

    #[test]
    fn test_circuit_state_serde() {
        let json = serde_json::to_string(&CircuitState::HalfOpen).unwrap();
        assert_eq!(json, "\"HALF_OPEN\"");
    }

    #[test]
    fn test_display_matches_wire() {
        assert_eq!(Decision::Allow.to_string(), "ALLOW");
        assert_eq!(DegradationLevel::Emergency.to_string(), "EMERGENCY");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
    }
}
