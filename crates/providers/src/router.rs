//! Provider router: picks the endpoint for a `provider:model` id.

use keel_config::{AppConfig, PROVIDERS, provider_of};
use keel_core::error::ProviderError;
use keel_core::model::ModelClient;
use std::sync::Arc;
use tracing::debug;

use crate::openai_compat::OpenAiCompatClient;

/// OpenAI-compatible base URL for a known provider.
pub fn default_base_url(provider: &str) -> Option<&'static str> {
    let url = match provider {
        "anthropic" => "https://api.anthropic.com/v1",
        "openai" => "https://api.openai.com/v1",
        "google" => "https://generativelanguage.googleapis.com/v1beta/openai",
        "deepseek" => "https://api.deepseek.com/v1",
        "alibaba" => "https://dashscope.aliyuncs.com/compatible-mode/v1",
        "xai" => "https://api.x.ai/v1",
        "zhipu" => "https://open.bigmodel.cn/api/paas/v4",
        "moonshotai" => "https://api.moonshot.ai/v1",
        _ => return None,
    };
    Some(url)
}

/// Build the model client for `model_id`.
///
/// The provider is the text before `:`. A `base_url` in the provider's
/// config section replaces the default endpoint; the `custom` provider
/// has no default and must set one.
pub fn build_client(
    config: &AppConfig,
    model_id: &str,
) -> Result<Arc<dyn ModelClient>, ProviderError> {
    let provider = provider_of(model_id);

    let base_url = config
        .base_url(provider)
        .or_else(|| default_base_url(provider))
        .ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown provider '{provider}' in model '{model_id}'. Set providers.{provider}.base_url in the config file."
            ))
        })?;

    let api_key = config.api_key(provider).ok_or_else(|| {
        let hint = PROVIDERS
            .iter()
            .find(|spec| spec.name == provider)
            .map(|spec| spec.env_key)
            .unwrap_or("OPENAI_COMPATIBLE_API_KEY");
        ProviderError::NotConfigured(format!(
            "No API key for provider '{provider}'. Set {hint} or providers.{provider}.api_key."
        ))
    })?;

    debug!(provider = %provider, base_url = %base_url, model = %model_id, "Building model client");
    Ok(Arc::new(OpenAiCompatClient::new(provider, base_url, api_key)))
}
