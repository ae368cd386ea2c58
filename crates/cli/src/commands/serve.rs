//! `parley serve` — Start the HTTP gateway.

use std::sync::Arc;

use parley_config::AppConfig;
use parley_engine::ChatEngine;
use parley_gateway::GatewayState;
use parley_providers::OpenAiCompatGenerator;
use parley_retrieval::{NoKnowledge, RetrievalEngine};

pub async fn run(port_override: Option<u16>) -> anyhow::Result<()> {
    let mut config = AppConfig::load().map_err(|e| anyhow::anyhow!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let api_key = config
        .generation
        .api_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("No generation API key configured — set PARLEY_API_KEY"))?;

    let store = super::open_store(&config).await?;

    let generator = Arc::new(OpenAiCompatGenerator::new(
        &config.generation.api_url,
        api_key,
        &config.generation.model,
    ));

    // The vector index is an external collaborator; without one wired in,
    // grounded turns degrade to the no-context prompt variant.
    let retrieval = Arc::new(RetrievalEngine::new(
        Arc::new(NoKnowledge),
        Arc::new(NoKnowledge),
        config.retrieval.clone(),
    ));

    let engine = Arc::new(
        ChatEngine::new(
            store.clone(),
            generator,
            retrieval,
            config.engine.clone(),
        )
        .with_temperature(config.generation.temperature)
        .with_max_tokens(config.generation.max_tokens),
    );

    println!("Parley gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Store:     {} ({})", config.store.backend, config.store.database_path);
    println!("   Model:     {}", config.generation.model);

    let state = Arc::new(GatewayState { store, engine });
    parley_gateway::serve(&config.gateway, state)
        .await
        .map_err(|e| anyhow::anyhow!("gateway error: {e}"))?;

    Ok(())
}
