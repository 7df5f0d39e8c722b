//! Per-entity three-state failure isolation.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use veronica_core::CircuitState;

/// Default consecutive failures before the circuit opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
/// Default seconds an open circuit waits before probing.
pub const DEFAULT_RECOVERY_TIMEOUT_SECS: u64 = 60;

/// Configuration for a [`CircuitBreaker`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Seconds an open circuit stays closed to traffic.
    pub recovery_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout_secs: DEFAULT_RECOVERY_TIMEOUT_SECS,
        }
    }
}

/// Result of a circuit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitCheck {
    /// Whether the call may proceed.
    pub allowed: bool,
    /// Denial reason (`circuit_open`, `probe_in_flight`), absent when allowed.
    pub reason: Option<String>,
    /// The circuit state after the check.
    pub state: CircuitState,
}

#[derive(Debug)]
struct EntityCircuit {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
    probe_in_flight: bool,
}

impl EntityCircuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }
}

/// Failure-isolation breaker keyed by entity.
///
/// Entities are independent: one failing dependency does not open the
/// circuit for unrelated dependencies in the same chain.
///
/// CLOSED counts consecutive failures and opens at the threshold. OPEN
/// denies everything until the recovery timeout elapses, then the next
/// check transitions to HALF_OPEN and is the single allowed probe. A probe
/// success closes the circuit; a probe failure re-opens it with a fresh
/// timestamp.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    entities: Mutex<HashMap<String, EntityCircuit>>,
}

impl CircuitBreaker {
    /// Create a breaker with default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a breaker with the given configuration.
    #[must_use]
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            entities: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether a call to `entity` may proceed now.
    #[must_use]
    pub fn check(&self, entity: &str) -> CircuitCheck {
        self.check_at(entity, Utc::now())
    }

    /// Check at an explicit instant.
    #[must_use]
    pub fn check_at(&self, entity: &str, now: DateTime<Utc>) -> CircuitCheck {
        let mut entities = self.lock();
        let circuit = entities
            .entry(entity.to_string())
            .or_insert_with(EntityCircuit::new);

        match circuit.state {
            CircuitState::Closed => CircuitCheck {
                allowed: true,
                reason: None,
                state: CircuitState::Closed,
            },
            CircuitState::Open => {
                let recovery = Duration::seconds(self.config.recovery_timeout_secs as i64);
                let elapsed = circuit.opened_at.map(|t| now - t);
                if elapsed.is_some_and(|e| e >= recovery) {
                    circuit.state = CircuitState::HalfOpen;
                    circuit.probe_in_flight = true;
                    debug!(entity, "Circuit half-open, allowing probe");
                    CircuitCheck {
                        allowed: true,
                        reason: None,
                        state: CircuitState::HalfOpen,
                    }
                } else {
                    CircuitCheck {
                        allowed: false,
                        reason: Some("circuit_open".to_string()),
                        state: CircuitState::Open,
                    }
                }
            },
            CircuitState::HalfOpen => {
                if circuit.probe_in_flight {
                    CircuitCheck {
                        allowed: false,
                        reason: Some("probe_in_flight".to_string()),
                        state: CircuitState::HalfOpen,
                    }
                } else {
                    circuit.probe_in_flight = true;
                    CircuitCheck {
                        allowed: true,
                        reason: None,
                        state: CircuitState::HalfOpen,
                    }
                }
            },
        }
    }

    /// Record a successful call to `entity`.
    pub fn record_success(&self, entity: &str) {
        let mut entities = self.lock();
        let circuit = entities
            .entry(entity.to_string())
            .or_insert_with(EntityCircuit::new);
        match circuit.state {
            CircuitState::HalfOpen => {
                debug!(entity, "Probe succeeded, closing circuit");
                circuit.state = CircuitState::Closed;
                circuit.consecutive_failures = 0;
                circuit.opened_at = None;
                circuit.probe_in_flight = false;
            },
            CircuitState::Closed => {
                circuit.consecutive_failures = 0;
            },
            CircuitState::Open => {},
        }
    }

    /// Record a failed call to `entity` now.
    pub fn record_failure(&self, entity: &str) {
        self.record_failure_at(entity, Utc::now());
    }

    /// Record a failed call at an explicit instant.
    pub fn record_failure_at(&self, entity: &str, now: DateTime<Utc>) {
        let mut entities = self.lock();
        let circuit = entities
            .entry(entity.to_string())
            .or_insert_with(EntityCircuit::new);
        match circuit.state {
            CircuitState::Closed => {
                circuit.consecutive_failures = circuit.consecutive_failures.saturating_add(1);
                if circuit.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        entity,
                        failures = circuit.consecutive_failures,
                        "Failure threshold reached, opening circuit"
                    );
                    circuit.state = CircuitState::Open;
                    circuit.opened_at = Some(now);
                }
            },
            CircuitState::HalfOpen => {
                warn!(entity, "Probe failed, re-opening circuit");
                circuit.state = CircuitState::Open;
                circuit.opened_at = Some(now);
                circuit.probe_in_flight = false;
            },
            CircuitState::Open => {},
        }
    }

    /// The current state for `entity`.
    #[must_use]
    pub fn state(&self, entity: &str) -> CircuitState {
        self.lock()
            .get(entity)
            .map_or(CircuitState::Closed, |c| c.state)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, EntityCircuit>> {
        self.entities.lock().unwrap_or_else(|e| {
            warn!("CircuitBreaker lock poisoned, recovering");
            e.into_inner()
        })
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn breaker(threshold: u32, recovery_secs: u64) -> CircuitBreaker {
        CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout_secs: recovery_secs,
        })
    }

    #[test]
    fn test_closed_allows() {
        let b = CircuitBreaker::new();
        assert!(b.check("api").allowed);
        assert_eq!(b.state("api"), CircuitState::Closed);
    }

    #[test]
    fn test_opens_at_threshold() {
        let b = breaker(3, 60);
        for _ in 0..3 {
            b.record_failure_at("api", at(0));
        }
        assert_eq!(b.state("api"), CircuitState::Open);
        let check = b.check_at("api", at(10));
        assert!(!check.allowed);
        assert_eq!(check.reason.as_deref(), Some("circuit_open"));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let b = breaker(3, 60);
        b.record_failure_at("api", at(0));
        b.record_failure_at("api", at(1));
        b.record_success("api");
        b.record_failure_at("api", at(2));
        b.record_failure_at("api", at(3));
        assert_eq!(b.state("api"), CircuitState::Closed);
    }

    #[test]
    fn test_recovery_requires_full_timeout() {
        let b = breaker(3, 60);
        for _ in 0..3 {
            b.record_failure_at("api", at(0));
        }
        assert!(!b.check_at("api", at(59)).allowed);
        let probe = b.check_at("api", at(60));
        assert!(probe.allowed);
        assert_eq!(probe.state, CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_allows_exactly_one_probe() {
        let b = breaker(3, 60);
        for _ in 0..3 {
            b.record_failure_at("api", at(0));
        }
        assert!(b.check_at("api", at(60)).allowed);
        // Second check while the probe is in flight is refused.
        let second = b.check_at("api", at(61));
        assert!(!second.allowed);
        assert_eq!(second.reason.as_deref(), Some("probe_in_flight"));
    }

    #[test]
    fn test_probe_success_closes() {
        let b = breaker(3, 60);
        for _ in 0..3 {
            b.record_failure_at("api", at(0));
        }
        assert!(b.check_at("api", at(60)).allowed);
        b.record_success("api");
        for i in 0..10 {
            assert!(b.check_at("api", at(61 + i)).allowed);
        }
        assert_eq!(b.state("api"), CircuitState::Closed);
    }

    #[test]
    fn test_probe_failure_reopens_with_fresh_clock() {
        let b = breaker(3, 60);
        for _ in 0..3 {
            b.record_failure_at("api", at(0));
        }
        assert!(b.check_at("api", at(60)).allowed);
        b.record_failure_at("api", at(60));
        assert_eq!(b.state("api"), CircuitState::Open);
        // The recovery clock restarted at the probe failure.
        assert!(!b.check_at("api", at(100)).allowed);
        assert!(b.check_at("api", at(120)).allowed);
    }

    #[test]
    fn test_entities_independent() {
        let b = breaker(2, 60);
        b.record_failure_at("flaky", at(0));
        b.record_failure_at("flaky", at(1));
        assert_eq!(b.state("flaky"), CircuitState::Open);
        assert!(b.check_at("healthy", at(2)).allowed);
    }
}
