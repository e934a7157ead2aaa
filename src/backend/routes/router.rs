/**
 * Router Configuration
 *
 * 1. Realtime: `GET /ws`
 * 2. Health: `GET /health`
 * 3. API routes (see `api_routes`)
 * 4. Fallback: JSON 404
 *
 * CORS is permissive and every request is traced.
 */

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::backend::error::BackendError;
use crate::backend::realtime::broadcast::BroadcastRouter;
use crate::backend::realtime::socket::ws_handler;
use crate::backend::routes::api_routes::configure_api_routes;
use crate::backend::server::state::AppState;

/// Create the Axum router with all routes configured
pub fn create_router(app_state: AppState) -> Router<()> {
    let router = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health));

    let router = configure_api_routes(router);

    router
        .fallback(|| async { BackendError::not_found("route not found") })
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(app_state)
}

async fn health(State(router): State<BroadcastRouter>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "connections": router.connection_count(),
    }))
}
