//! Backend selection: builds the LLM client described by the config.

use std::sync::Arc;

use kubeinteract_config::AppConfig;
use kubeinteract_core::error::ProviderError;
use kubeinteract_core::provider::LlmClient;
use tracing::debug;

use crate::openai_compat::OpenAiCompatClient;

/// Build the LLM client for the configured backend.
///
/// Both supported kinds speak the OpenAI-compatible protocol; they differ in
/// their default endpoint and in whether an API key is sent.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn LlmClient>, ProviderError> {
    let provider = config.resolved_provider();
    let base_url = config
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(provider));

    debug!(provider, base_url = %base_url, "Building LLM client");

    let client = match provider {
        "ollama" => OpenAiCompatClient::new("ollama", &base_url, None, config.ca_cert.as_deref())?,
        "openai" => OpenAiCompatClient::new(
            "openai",
            &base_url,
            config.api_key.clone(),
            config.ca_cert.as_deref(),
        )?,
        other => {
            return Err(ProviderError::NotConfigured(format!(
                "unknown provider '{other}'"
            )));
        }
    };

    Ok(Arc::new(client))
}

/// Get the default base URL for the supported backends.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "ollama" => "http://localhost:11434/v1".into(),
        _ => "https://api.openai.com/v1".into(),
    }
}
