/**
 * Server Initialization
 *
 * 1. Select the persistence gateway (Postgres or memory)
 * 2. Build `AppState` around it
 * 3. Configure routes
 * 4. Start the periodic topic cleanup
 *
 * The returned state is kept by the caller so shutdown can close the
 * broadcast router.
 */

use axum::Router;
use std::time::Duration;

use crate::backend::routes::router::create_router;
use crate::backend::server::config::load_store;
use crate::backend::server::state::AppState;
use crate::shared::config::ServerConfig;

/// Create the Axum application and the state behind it
pub async fn create_app(config: ServerConfig) -> (Router<()>, AppState) {
    tracing::info!("[Server] Initializing messaging core");

    let store = load_store(&config).await;
    let cleanup_every = Duration::from_secs(config.room_cleanup_secs);
    let app_state = AppState::new(store, config);
    let app = create_router(app_state.clone());

    spawn_topic_cleanup(&app_state, cleanup_every);
    tracing::info!("[Server] Router configured with periodic topic cleanup");

    (app, app_state)
}

/// Forget empty broadcast topics every `every` until the router shuts down
fn spawn_topic_cleanup(app_state: &AppState, every: Duration) {
    let router = app_state.router.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            if router.is_shut_down() {
                break;
            }
            let pruned = router.prune_empty_topics();
            tracing::debug!(
                "[Server] Pruned {} empty topics, {} connections open",
                pruned,
                router.connection_count()
            );
        }
    });
}
