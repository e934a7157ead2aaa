/**
 * Application State
 *
 * `AppState` wires the messaging core together once at startup and is
 * cloned into every Axum handler and socket task. Every component shares
 * the same store and the same broadcast router; nothing is a module-level
 * global.
 *
 * The `FromRef` implementations let handlers extract only the piece they
 * need, e.g. `State(router): State<BroadcastRouter>`.
 */

use axum::extract::FromRef;
use std::sync::Arc;

use crate::backend::chat::membership::MembershipNotifier;
use crate::backend::chat::orchestrator::Orchestrator;
use crate::backend::delivery::DeliveryStateMachine;
use crate::backend::presence::PresenceTracker;
use crate::backend::realtime::broadcast::BroadcastRouter;
use crate::backend::store::Store;
use crate::backend::summary::SummaryProjector;
use crate::backend::viewers::ViewerTracker;
use crate::shared::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Persistence gateway (Postgres or in-memory)
    pub store: Arc<dyn Store>,
    pub router: BroadcastRouter,
    pub viewers: ViewerTracker,
    pub presence: PresenceTracker,
    pub delivery: DeliveryStateMachine,
    pub projector: SummaryProjector,
    pub orchestrator: Orchestrator,
    pub membership: MembershipNotifier,
}

impl AppState {
    /// Build every component around `store` with a fresh router.
    pub fn new(store: Arc<dyn Store>, config: ServerConfig) -> Self {
        let router = BroadcastRouter::new();
        let viewers = ViewerTracker::new(router.clone());
        let delivery = DeliveryStateMachine::new(store.clone(), router.clone());
        let presence = PresenceTracker::new(store.clone(), router.clone(), delivery.clone());
        let projector = SummaryProjector::new(store.clone(), router.clone(), config.preview_length);
        let orchestrator = Orchestrator::new(
            store.clone(),
            router.clone(),
            presence.clone(),
            viewers.clone(),
            projector.clone(),
            config.max_message_length,
        );
        let membership = MembershipNotifier::new(store.clone(), router.clone(), projector.clone());

        Self {
            config: Arc::new(config),
            store,
            router,
            viewers,
            presence,
            delivery,
            projector,
            orchestrator,
            membership,
        }
    }
}

impl FromRef<AppState> for Arc<dyn Store> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.store.clone()
    }
}

impl FromRef<AppState> for BroadcastRouter {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.router.clone()
    }
}

impl FromRef<AppState> for SummaryProjector {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.projector.clone()
    }
}

impl FromRef<AppState> for MembershipNotifier {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.membership.clone()
    }
}
