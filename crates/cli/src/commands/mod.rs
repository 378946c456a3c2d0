pub mod doctor;
pub mod interact;
pub mod models;

use std::path::PathBuf;

use clap::Args;
use kubeinteract_config::AppConfig;

/// Flags selecting the model endpoint. They override the config file and
/// the environment.
#[derive(Args, Debug, Default, Clone)]
pub struct EndpointArgs {
    /// Base URL of the OpenAI-compatible endpoint
    #[arg(long)]
    pub model_api: Option<String>,

    /// API key for the endpoint
    #[arg(long)]
    pub api_key: Option<String>,

    /// PEM file with a CA certificate to trust for the endpoint
    #[arg(long)]
    pub ca_cert: Option<PathBuf>,

    /// Backend kind: "openai" or "ollama"
    #[arg(long)]
    pub provider: Option<String>,
}

impl EndpointArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(api_url) = &self.model_api {
            config.api_url = Some(api_url.clone());
        }
        if let Some(api_key) = &self.api_key {
            config.api_key = Some(api_key.clone());
        }
        if let Some(ca_cert) = &self.ca_cert {
            config.ca_cert = Some(ca_cert.clone());
        }
        if let Some(provider) = &self.provider {
            config.provider = provider.clone();
        }
    }
}

/// Load the config (file, then environment) and apply `endpoint` on top.
pub fn load_config(endpoint: &EndpointArgs) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    endpoint.apply(&mut config);
    config.validate()?;
    Ok(config)
}
