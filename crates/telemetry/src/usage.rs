//! Cumulative usage accounting.

use keel_core::TokenUsage;
use keel_core::model::Usage;
use tracing::debug;

use crate::pricing::PricingTable;

/// Fold one call's usage into the session totals.
///
/// The cost is re-derived from the cumulative token counts at the
/// active model's price.
pub fn record_usage(totals: &mut TokenUsage, model: &str, turn: Usage, pricing: &PricingTable) {
    totals.input_tokens += turn.input_tokens;
    totals.output_tokens += turn.output_tokens;
    totals.total_tokens = totals.input_tokens + totals.output_tokens;
    totals.estimated_cost = pricing.compute_cost(model, totals.input_tokens, totals.output_tokens);
    debug!(
        model,
        input = totals.input_tokens,
        output = totals.output_tokens,
        cost = totals.estimated_cost,
        "Usage updated"
    );
}
