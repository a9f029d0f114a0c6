//! Built-in pricing table for supported models.
//!
//! Prices are in USD per 1 million tokens, keyed by full model id
//! (`provider:model`). Custom pricing can be added at runtime via config.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_m: f64,
    pub output_per_m: f64,
}

impl ModelPricing {
    pub fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
        }
    }

    /// USD for one call.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_per_m + output_tokens as f64 * self.output_per_m)
            / 1_000_000.0
    }
}

/// Model prices, shared across the session. `[pricing]` entries from the
/// config are layered over the built-in defaults with [`set`](Self::set).
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
}

impl std::fmt::Debug for PricingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PricingTable").field("models", &self.len()).finish()
    }
}

impl PricingTable {
    /// Built-in prices for every provider's common models.
    pub fn with_defaults() -> Self {
        const DEFAULTS: &[(&str, f64, f64)] = &[
            // ── Anthropic ──────────────────────────────────────────────
            ("anthropic:claude-sonnet-4-5", 3.0, 15.0),
            ("anthropic:claude-opus-4-6", 15.0, 75.0),
            ("anthropic:claude-haiku-4-5", 0.8, 4.0),
            // ── OpenAI ─────────────────────────────────────────────────
            ("openai:gpt-4.1", 2.0, 8.0),
            ("openai:gpt-4.1-mini", 0.4, 1.6),
            ("openai:gpt-4.1-nano", 0.1, 0.4),
            ("openai:o3", 2.0, 8.0),
            ("openai:o4-mini", 1.1, 4.4),
            // ── Google ─────────────────────────────────────────────────
            ("google:gemini-2.5-pro", 1.25, 10.0),
            ("google:gemini-2.5-flash", 0.15, 0.6),
            // ── DeepSeek ───────────────────────────────────────────────
            ("deepseek:deepseek-chat", 0.27, 1.1),
            ("deepseek:deepseek-reasoner", 0.55, 2.19),
            // ── xAI ────────────────────────────────────────────────────
            ("xai:grok-3", 3.0, 15.0),
            ("xai:grok-3-mini", 0.3, 0.5),
            // ── Alibaba ────────────────────────────────────────────────
            ("alibaba:qwen-max", 1.6, 6.4),
            ("alibaba:qwen-plus", 0.8, 2.0),
            // ── Zhipu ──────────────────────────────────────────────────
            ("zhipu:glm-4-plus", 0.7, 0.7),
            // ── Moonshot ───────────────────────────────────────────────
            ("moonshotai:kimi-k2.5", 2.0, 6.0),
        ];

        let prices = DEFAULTS
            .iter()
            .map(|(id, input, output)| (id.to_string(), ModelPricing::new(*input, *output)))
            .collect();
        Self {
            prices: RwLock::new(prices),
        }
    }

    pub fn empty() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
        }
    }

    /// Exact-id lookup.
    pub fn get(&self, model: &str) -> Option<ModelPricing> {
        self.read().get(model).copied()
    }

    pub fn set(&self, model: impl Into<String>, pricing: ModelPricing) {
        self.prices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(model.into(), pricing);
    }

    /// Cost of a call in USD; 0.0 for models with no known price.
    ///
    /// Tries an exact match first, then the longest key of the same provider
    /// that prefixes the model (`anthropic:claude-haiku-4-5-20251001`
    /// matches `anthropic:claude-haiku-4-5`).
    pub fn compute_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let prices = self.read();

        if let Some(p) = prices.get(model) {
            return p.cost(input_tokens, output_tokens);
        }

        let Some((provider, _)) = model.split_once(':') else {
            return 0.0;
        };
        prices
            .iter()
            .filter(|(key, _)| key.split_once(':').map(|(p, _)| p) == Some(provider))
            .filter(|(key, _)| model.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, p)| p.cost(input_tokens, output_tokens))
            .unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ModelPricing>> {
        self.prices.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}
