//! Presence Tracker
//!
//! Online/offline state per user, bound to a single connection handle.
//! The latest `set_online` wins the binding; a disconnect only flips the
//! user offline when it comes from the handle that currently holds it.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::backend::delivery::DeliveryStateMachine;
use crate::backend::error::CoreError;
use crate::backend::realtime::broadcast::{BroadcastRouter, ConnectionId};
use crate::backend::store::{PresenceBinding, Store};
use crate::shared::event::ServerEvent;
use crate::shared::user::{PresenceChange, User};

#[derive(Clone)]
pub struct PresenceTracker {
    store: Arc<dyn Store>,
    router: BroadcastRouter,
    delivery: DeliveryStateMachine,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn Store>, router: BroadcastRouter, delivery: DeliveryStateMachine) -> Self {
        Self {
            store,
            router,
            delivery,
        }
    }

    /// Bind `user_id` to `connection` and mark them online.
    ///
    /// A connection speaks for one user at a time: whoever it was bound to
    /// before goes offline and loses the user-topic subscription. Then the
    /// connection joins the user's own topic, deliveries that waited on this
    /// user are backfilled, and every other user is told.
    pub async fn set_online(&self, connection: ConnectionId, user_id: Uuid) -> Result<User, CoreError> {
        let PresenceBinding { user, displaced } = self
            .store
            .bind_presence(user_id, connection, Utc::now())
            .await?
            .ok_or_else(|| CoreError::invalid(format!("unknown user {user_id}")))?;

        for previous in displaced {
            self.router.unsubscribe_user(connection, previous.id);
            tracing::info!("[Presence] User {} offline, {} rebound to {}", previous.id, connection, user_id);
            self.router
                .broadcast_except_user(previous.id, ServerEvent::UserStatusChanged(PresenceChange::from(&previous)));
        }
        self.router.subscribe_user(connection, user_id);
        tracing::info!("[Presence] User {} online on {}", user_id, connection);

        if let Err(e) = self.delivery.backfill_on_online(user_id).await {
            tracing::error!("[Presence] Delivery backfill for {} failed: {}", user_id, e);
        }

        self.router
            .broadcast_except_user(user_id, ServerEvent::UserStatusChanged(PresenceChange::from(&user)));
        Ok(user)
    }

    /// Release whatever user `connection` is bound to.
    ///
    /// Fails with `StaleConnectionHandle` when a newer connection has
    /// rebound the user, or when the connection never went online.
    pub async fn set_offline(&self, connection: ConnectionId) -> Result<User, CoreError> {
        let user = self
            .store
            .release_presence(connection, Utc::now())
            .await?
            .ok_or(CoreError::StaleConnectionHandle(connection))?;
        tracing::info!("[Presence] User {} offline", user.id);

        self.router
            .broadcast_except_user(user.id, ServerEvent::UserStatusChanged(PresenceChange::from(&user)));
        Ok(user)
    }

    pub async fn is_online(&self, user_id: Uuid) -> Result<bool, CoreError> {
        self.any_online(&[user_id]).await
    }

    pub async fn any_online(&self, user_ids: &[Uuid]) -> Result<bool, CoreError> {
        if user_ids.is_empty() {
            return Ok(false);
        }
        self.store
            .any_online(user_ids)
            .await
            .map_err(CoreError::PresenceLookupFailure)
    }
}
