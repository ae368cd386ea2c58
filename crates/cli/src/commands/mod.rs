pub mod cleanup;
pub mod serve;
pub mod status;

use std::sync::Arc;

use anyhow::Context;
use parley_config::AppConfig;
use parley_core::store::SessionStore;
use parley_store::{InMemoryStore, SqliteStore};

/// Open the session store configured in `[store]`.
pub async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn SessionStore>> {
    match config.store.backend.as_str() {
        "sqlite" => {
            let store = SqliteStore::with_max_connections(
                &config.store.database_path,
                config.store.max_connections,
            )
            .await
            .with_context(|| format!("opening {}", config.store.database_path))?;
            Ok(Arc::new(store))
        }
        "in_memory" => Ok(Arc::new(InMemoryStore::new())),
        other => anyhow::bail!("unknown store backend: {other}"),
    }
}
