//! Model pricing and session cost estimation.
//!
//! Prices are USD per million tokens, based on January 2026 Anthropic
//! pricing. The cost shown in the HUD is an estimate derived from the
//! transcript's authoritative usage record, not billing truth.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

/// Per-million-token pricing for one model family.
#[derive(Debug, Clone)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
    pub cache_creation_per_million: f64,
    pub cache_read_per_million: f64,
}

impl ModelPricing {
    pub fn new(input: f64, output: f64) -> Self {
        Self {
            input_per_million: input,
            output_per_million: output,
            // Default cache pricing: creation same as input, read is 10%
            cache_creation_per_million: input,
            cache_read_per_million: input * 0.1,
        }
    }

    pub fn with_cache(mut self, creation: f64, read: f64) -> Self {
        self.cache_creation_per_million = creation;
        self.cache_read_per_million = read;
        self
    }

    /// Calculate cost from token counts.
    pub fn calculate_cost(
        &self,
        input: i64,
        output: i64,
        cache_creation: i64,
        cache_read: i64,
    ) -> f64 {
        (input as f64 * self.input_per_million / 1_000_000.0)
            + (output as f64 * self.output_per_million / 1_000_000.0)
            + (cache_creation as f64 * self.cache_creation_per_million / 1_000_000.0)
            + (cache_read as f64 * self.cache_read_per_million / 1_000_000.0)
    }
}

/// Default pricing for the Claude model families this HUD observes.
pub fn default_pricing() -> HashMap<String, ModelPricing> {
    let mut pricing = HashMap::new();

    pricing.insert(
        "claude-opus".to_string(),
        ModelPricing::new(15.0, 75.0).with_cache(18.75, 1.50),
    );

    pricing.insert(
        "claude-sonnet".to_string(),
        ModelPricing::new(3.0, 15.0).with_cache(3.75, 0.30),
    );

    pricing.insert(
        "claude-haiku".to_string(),
        ModelPricing::new(0.80, 4.0).with_cache(1.0, 0.08),
    );

    pricing
}

/// Normalize a full model id to a pricing key.
pub fn normalize_model_name(model: &str) -> String {
    let model = model.to_lowercase();

    if model.contains("opus") {
        return "claude-opus".to_string();
    }
    if model.contains("sonnet") {
        return "claude-sonnet".to_string();
    }
    if model.contains("haiku") {
        return "claude-haiku".to_string();
    }

    model
}

/// Pricing lookup table keyed by normalized model name.
#[derive(Debug, Clone)]
pub struct PricingTable {
    pricing: HashMap<String, ModelPricing>,
}

impl PricingTable {
    /// Create a table with default pricing.
    pub fn new() -> Self {
        Self {
            pricing: default_pricing(),
        }
    }

    /// Create a table with custom pricing.
    pub fn with_pricing(pricing: HashMap<String, ModelPricing>) -> Self {
        Self { pricing }
    }

    /// Add or update pricing for a model.
    pub fn set_pricing(&mut self, model: &str, pricing: ModelPricing) {
        self.pricing.insert(model.to_string(), pricing);
    }

    /// Cost in USD for a model and token counts.
    pub fn cost_for(
        &self,
        model: &str,
        input: i64,
        output: i64,
        cache_creation: i64,
        cache_read: i64,
    ) -> f64 {
        let normalized = normalize_model_name(model);

        let pricing = self.pricing.get(&normalized).cloned().unwrap_or_else(|| {
            debug!(model, normalized = %normalized, "unknown model, using default pricing");
            ModelPricing::new(3.0, 15.0)
        });

        pricing.calculate_cost(input, output, cache_creation, cache_read)
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Estimated session cost derived from the latest authoritative usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostEstimate {
    pub total_usd: f64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_creation_tokens: i64,
    pub cache_read_tokens: i64,
}

impl CostEstimate {
    /// Price a usage record. With no model known, default pricing applies.
    pub fn from_usage(
        table: &PricingTable,
        model: Option<&str>,
        input: i64,
        output: i64,
        cache_creation: i64,
        cache_read: i64,
    ) -> Self {
        let total_usd = table.cost_for(
            model.unwrap_or("unknown"),
            input,
            output,
            cache_creation,
            cache_read,
        );
        Self {
            total_usd,
            input_tokens: input,
            output_tokens: output,
            cache_creation_tokens: cache_creation,
            cache_read_tokens: cache_read,
        }
    }
}
