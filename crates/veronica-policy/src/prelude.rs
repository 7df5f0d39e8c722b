//! Convenience re-exports for downstream crates.

pub use crate::adaptive::{AdaptiveBudgetHook, AdaptiveConfig, AdjustAction};
pub use crate::backend::{BudgetBackend, LocalBudgetBackend, RedisBudgetBackend};
pub use crate::breaker::{CircuitBreaker, CircuitBreakerConfig};
pub use crate::degrade::{DegradeController, DegradeSignals};
pub use crate::enforcer::{BudgetEnforcer, ChargeOutcome};
pub use crate::error::{PolicyError, PolicyResult};
pub use crate::tokens::TokenBudget;
pub use crate::window::BudgetWindow;
