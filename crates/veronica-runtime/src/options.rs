//! Per-call options supplied by the caller.

/// Token usage reported by a provider response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderUsage {
    /// Input tokens consumed.
    pub tokens_in: u64,
    /// Output tokens produced.
    pub tokens_out: u64,
}

impl ProviderUsage {
    /// Create a usage record.
    #[must_use]
    pub fn new(tokens_in: u64, tokens_out: u64) -> Self {
        Self {
            tokens_in,
            tokens_out,
        }
    }
}

/// Options for one wrapped call.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Operation name (tool name or logical LLM step).
    pub operation: String,
    /// Caller-supplied cost estimate, USD. Takes precedence over pricing.
    pub cost_estimate_usd: Option<f64>,
    /// Per-call timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Per-call cap on dispatch attempts (including the first).
    pub max_attempts: Option<u32>,
    /// Model identifier for pricing and hooks.
    pub model: Option<String>,
    /// Provider-reported token usage, used to compute actual cost.
    pub usage: Option<ProviderUsage>,
    /// Outbound URL, inspected by egress hooks.
    pub url: Option<String>,
}

impl CallOptions {
    /// Create options for the named operation.
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Self::default()
        }
    }

    /// Set the cost estimate.
    #[must_use]
    pub fn with_cost_estimate(mut self, usd: f64) -> Self {
        self.cost_estimate_usd = Some(usd);
        self
    }

    /// Set the per-call timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Set the per-call attempt cap.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Set the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the provider usage hint.
    #[must_use]
    pub fn with_usage(mut self, usage: ProviderUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Set the outbound URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builder() {
        let options = CallOptions::new("web_search")
            .with_cost_estimate(0.02)
            .with_timeout_ms(5000)
            .with_model("small-1")
            .with_usage(ProviderUsage::new(100, 50));

        assert_eq!(options.operation, "web_search");
        assert_eq!(options.cost_estimate_usd, Some(0.02));
        assert_eq!(options.timeout_ms, Some(5000));
        assert_eq!(options.usage.unwrap().tokens_out, 50);
    }
}
