//! Per-provider context windows and the derived token budget.

/// Window used for providers not in the table.
pub const DEFAULT_CONTEXT_WINDOW: usize = 128_000;

/// Share of the window the conversation may fill before compression.
pub const TOKEN_BUDGET_RATIO: f64 = 0.8;

/// Context window of the provider in `model_id` (`provider:model`).
pub fn context_window(model_id: &str) -> usize {
    let provider = model_id.split(':').next().unwrap_or_default();
    match provider {
        "anthropic" => 200_000,
        "openai" => 128_000,
        "google" => 1_000_000,
        "deepseek" => 64_000,
        "alibaba" | "xai" | "zhipu" | "moonshotai" => 128_000,
        _ => DEFAULT_CONTEXT_WINDOW,
    }
}

/// Token ceiling that triggers compression.
pub fn token_budget(model_id: &str) -> usize {
    (context_window(model_id) as f64 * TOKEN_BUDGET_RATIO).floor() as usize
}
