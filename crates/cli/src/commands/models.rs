//! `kubeinteract models`: List the models served by the endpoint.

use super::{EndpointArgs, load_config};

pub async fn run(endpoint: EndpointArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&endpoint)?;
    let llm = kubeinteract_providers::build_from_config(&config)?;

    let mut models = llm
        .list_models()
        .await
        .map_err(|e| format!("Failed to list models from {}: {e}", llm.name()))?;
    models.sort();

    if models.is_empty() {
        println!("  No models reported by the {} endpoint.", llm.name());
        return Ok(());
    }

    println!("🤖 Available models ({})", llm.name());
    println!("==========================");
    for model in &models {
        let marker = if config.model.as_deref() == Some(model.as_str()) {
            " (configured)"
        } else {
            ""
        };
        println!("  {model}{marker}");
    }

    Ok(())
}
