//! `parley status` — Show configuration and store statistics.

use parley_config::AppConfig;

pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::load().map_err(|e| anyhow::anyhow!("Failed to load config: {e}"))?;

    println!("Parley Status");
    println!("=============");
    println!("  Store:        {} ({})", config.store.backend, config.store.database_path);
    println!("  Model:        {}", config.generation.model);
    println!("  Temperature:  {}", config.generation.temperature);
    println!("  Gateway:      {}:{}", config.gateway.host, config.gateway.port);
    println!("  Grounding:    top_k={}, max_context={} chars", config.retrieval.top_k, config.retrieval.max_context_length);
    println!(
        "  History:      {} messages per turn, {} history queries",
        config.engine.history_limit, config.retrieval.max_history_queries
    );

    let store = super::open_store(&config).await?;
    let stats = store.stats().await?;
    println!();
    println!("  Sessions:     {} total / {} active / {} users", stats.sessions.total, stats.sessions.active, stats.sessions.unique_users);
    println!(
        "  Messages:     {} total ({} human / {} ai), avg {} per session",
        stats.messages.total, stats.messages.human, stats.messages.ai, stats.messages.avg_per_session
    );

    Ok(())
}
