//! Known providers and model aliases.

/// A provider keel can detect from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderSpec {
    pub name: &'static str,
    pub env_key: &'static str,
    pub default_model: &'static str,
}

/// Providers in detection order.
pub const PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec { name: "anthropic", env_key: "ANTHROPIC_API_KEY", default_model: "anthropic:claude-sonnet-4-5" },
    ProviderSpec { name: "openai", env_key: "OPENAI_API_KEY", default_model: "openai:gpt-4.1" },
    ProviderSpec { name: "deepseek", env_key: "DEEPSEEK_API_KEY", default_model: "deepseek:deepseek-chat" },
    ProviderSpec { name: "alibaba", env_key: "ALIBABA_API_KEY", default_model: "alibaba:qwen-max" },
    ProviderSpec { name: "google", env_key: "GOOGLE_GENERATIVE_AI_API_KEY", default_model: "google:gemini-2.5-pro" },
    ProviderSpec { name: "xai", env_key: "XAI_API_KEY", default_model: "xai:grok-3" },
    ProviderSpec { name: "zhipu", env_key: "ZHIPU_API_KEY", default_model: "zhipu:glm-4-plus" },
    ProviderSpec { name: "moonshotai", env_key: "MOONSHOT_API_KEY", default_model: "moonshotai:kimi-k2.5" },
];

/// Short names accepted wherever a model id is.
pub const MODEL_ALIASES: &[(&str, &str)] = &[
    ("sonnet", "anthropic:claude-sonnet-4-5"),
    ("opus", "anthropic:claude-opus-4-6"),
    ("haiku", "anthropic:claude-haiku-4-5"),
    ("gpt4", "openai:gpt-4.1"),
    ("gemini", "google:gemini-2.5-pro"),
    ("deepseek", "deepseek:deepseek-chat"),
    ("r1", "deepseek:deepseek-reasoner"),
    ("qwen", "alibaba:qwen-max"),
    ("glm", "zhipu:glm-4-plus"),
    ("kimi", "moonshotai:kimi-k2.5"),
];

/// Expand an alias to its full model id; other input is returned unchanged.
pub fn expand_alias(raw: &str) -> String {
    MODEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == raw)
        .map(|(_, id)| id.to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Provider part of a model id (`anthropic` for `anthropic:claude-sonnet-4-5`).
pub fn provider_of(model_id: &str) -> &str {
    model_id.split(':').next().unwrap_or(model_id)
}
