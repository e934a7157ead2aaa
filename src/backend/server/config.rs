/**
 * Persistence Gateway Selection
 *
 * The server stores everything in PostgreSQL when `DATABASE_URL` is
 * configured and reachable. Otherwise it logs why and falls back to the
 * in-memory gateway, so a missing database never prevents startup.
 */

use std::sync::Arc;

use crate::backend::store::{MemoryStore, PgStore, Store};
use crate::shared::config::ServerConfig;

/// Pick the persistence gateway for `config`.
///
/// Migrations run as part of connecting; a failure there also falls back
/// to memory.
pub async fn load_store(config: &ServerConfig) -> Arc<dyn Store> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("[Server] DATABASE_URL not set, messages are kept in memory only");
        return Arc::new(MemoryStore::new());
    };

    tracing::info!("[Server] Connecting to database...");
    match PgStore::connect(database_url).await {
        Ok(store) => {
            tracing::info!("[Server] Database ready, migrations applied");
            Arc::new(store)
        }
        Err(e) => {
            tracing::error!("[Server] Database unavailable: {}", e);
            tracing::warn!("[Server] Falling back to the in-memory store");
            Arc::new(MemoryStore::new())
        }
    }
}
