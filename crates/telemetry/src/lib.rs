//! Cost tracking for keel sessions.
//!
//! Provides a built-in per-model pricing table and the accounting that
//! folds each turn's token usage into a session's cumulative
//! [`TokenUsage`](keel_core::TokenUsage).

pub mod pricing;
pub mod usage;

pub use pricing::{ModelPricing, PricingTable};
pub use usage::record_usage;
