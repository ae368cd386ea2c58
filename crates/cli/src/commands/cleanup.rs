//! `parley cleanup` — Purge inactive sessions past the retention window.

use parley_config::AppConfig;

pub async fn run(days_override: Option<u32>) -> anyhow::Result<()> {
    let config = AppConfig::load().map_err(|e| anyhow::anyhow!("Failed to load config: {e}"))?;
    let retention_days = days_override.unwrap_or(config.store.retention_days);

    let store = super::open_store(&config).await?;
    let purged = store.delete_old_sessions(retention_days).await?;

    println!("Purged {purged} inactive sessions older than {retention_days} days");
    Ok(())
}
