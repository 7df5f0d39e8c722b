//! Veronica Policy - the containment policies behind the shield.
//!
//! This crate holds the stateful policy components the kernel consults on
//! every wrapped call:
//!
//! - [`BudgetEnforcer`]: cumulative USD ceiling with halt-before-emit
//!   ordering.
//! - [`BudgetWindow`] / [`TokenBudget`]: rolling-window call-rate and token
//!   ceilings with a DEGRADE zone.
//! - [`BudgetBackend`]: pluggable cost accumulator — in-process
//!   [`LocalBudgetBackend`] or cross-process [`RedisBudgetBackend`] with a
//!   failsafe local fallback.
//! - [`CircuitBreaker`]: per-entity three-state failure isolation.
//! - [`DegradeController`]: five-level graceful degradation with mandatory
//!   de-escalation hysteresis.
//! - [`AdaptiveBudgetHook`]: an event-driven ceiling-multiplier controller
//!   with smoothing, direction lock, and anomaly mode.
//!
//! Every time-dependent method has an `_at` variant taking an injected
//! `now` for deterministic testing.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod adaptive;
pub mod backend;
pub mod breaker;
pub mod degrade;
pub mod enforcer;
/// Error types and results for the policy module.
pub mod error;
pub mod tokens;
pub mod window;

pub use adaptive::{AdaptiveBudgetHook, AdaptiveConfig, AdaptiveControlState, AdjustAction};
pub use backend::{BudgetBackend, LocalBudgetBackend, RedisBackendConfig, RedisBudgetBackend};
pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitCheck};
pub use degrade::{DegradeActions, DegradeConfig, DegradeController, DegradeSignals};
pub use enforcer::{BudgetEnforcer, ChargeOutcome, RunState};
pub use error::{PolicyError, PolicyResult};
pub use tokens::{TokenBudget, TokenBudgetConfig, TokenCeilingMode};
pub use window::{BudgetWindow, BudgetWindowConfig, WindowDecision};
