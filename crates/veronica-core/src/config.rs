//! The resource contract of a containment scope.

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, KernelResult};

/// Default chain cost ceiling in USD.
pub const DEFAULT_MAX_COST_USD: f64 = 10.0;
/// Default chain step ceiling.
pub const DEFAULT_MAX_STEPS: u32 = 100;
/// Default chain retry budget.
pub const DEFAULT_MAX_RETRIES_TOTAL: u32 = 10;

/// Immutable limits enforced on every call in a chain.
///
/// Construction validates the contract: a non-positive cost ceiling or step
/// limit is a programmer error and is refused outright rather than silently
/// clamped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Cumulative USD ceiling for the chain. Must be positive.
    pub max_cost_usd: f64,
    /// Maximum number of wrapped calls. Must be positive.
    pub max_steps: u32,
    /// Total retry budget across all calls in the chain.
    pub max_retries_total: u32,
    /// Wall-clock deadline for the whole chain in milliseconds. 0 disables.
    pub timeout_ms: u64,
    /// Connection URL for a cross-process budget backend, when one is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_url: Option<String>,
}

impl ExecutionConfig {
    /// Create a validated config.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidConfig`] when `max_cost_usd` is not a
    /// positive finite number or `max_steps` is zero.
    pub fn new(max_cost_usd: f64, max_steps: u32, max_retries_total: u32) -> KernelResult<Self> {
        if !(max_cost_usd.is_finite() && max_cost_usd > 0.0) {
            return Err(KernelError::InvalidConfig {
                field: "max_cost_usd",
                reason: format!("must be positive and finite, got {max_cost_usd}"),
            });
        }
        if max_steps == 0 {
            return Err(KernelError::InvalidConfig {
                field: "max_steps",
                reason: "must be positive".to_string(),
            });
        }
        Ok(Self {
            max_cost_usd,
            max_steps,
            max_retries_total,
            timeout_ms: 0,
            backend_url: None,
        })
    }

    /// Set the chain deadline in milliseconds (0 disables).
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the cross-process budget backend URL.
    #[must_use]
    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = Some(url.into());
        self
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_cost_usd: DEFAULT_MAX_COST_USD,
            max_steps: DEFAULT_MAX_STEPS,
            max_retries_total: DEFAULT_MAX_RETRIES_TOTAL,
            timeout_ms: 0,
            backend_url: None,
        }
    }
}
