//! Model pricing for actual-cost resolution.

use std::collections::HashMap;

use crate::options::ProviderUsage;

/// Price of one model in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    /// USD per million input tokens.
    pub input_per_million_usd: f64,
    /// USD per million output tokens.
    pub output_per_million_usd: f64,
}

impl ModelPricing {
    /// Create a pricing entry.
    #[must_use]
    pub fn new(input_per_million_usd: f64, output_per_million_usd: f64) -> Self {
        Self {
            input_per_million_usd,
            output_per_million_usd,
        }
    }

    /// Cost of the given usage at this price.
    #[must_use]
    pub fn cost_for(&self, usage: ProviderUsage) -> f64 {
        (usage.tokens_in as f64 / 1_000_000.0) * self.input_per_million_usd
            + (usage.tokens_out as f64 / 1_000_000.0) * self.output_per_million_usd
    }
}

/// Lookup table from model identifier to pricing.
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
}

impl PricingTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model's pricing.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        self.models.insert(model.into(), pricing);
        self
    }

    /// Cost of `usage` on `model`, when the model is known.
    #[must_use]
    pub fn cost_for(&self, model: &str, usage: ProviderUsage) -> Option<f64> {
        self.models.get(model).map(|pricing| pricing.cost_for(usage))
    }

    /// Whether the table knows `model`.
    #[must_use]
    pub fn knows(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }
}
