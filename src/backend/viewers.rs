//! Viewer Tracker
//!
//! Remembers, per connection, which conversation the user is looking at.
//! The orchestrator asks for the active viewers of a conversation when it
//! decides whose unread counter to bump. Records are never persisted.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::backend::realtime::broadcast::{BroadcastRouter, ConnectionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewerRecord {
    pub user_id: Uuid,
    pub chat_id: Uuid,
}

#[derive(Clone)]
pub struct ViewerTracker {
    records: Arc<DashMap<ConnectionId, ViewerRecord>>,
    router: BroadcastRouter,
}

impl ViewerTracker {
    pub fn new(router: BroadcastRouter) -> Self {
        Self {
            records: Default::default(),
            router,
        }
    }

    /// Record that `connection` is displaying `chat_id` for `user_id`.
    pub fn set_viewing(&self, connection: ConnectionId, chat_id: Uuid, user_id: Uuid) {
        self.records.insert(connection, ViewerRecord { user_id, chat_id });
        tracing::debug!("[Viewers] User {} viewing chat {} on {}", user_id, chat_id, connection);
    }

    pub fn clear_viewing(&self, connection: ConnectionId) -> Option<ViewerRecord> {
        self.records.remove(&connection).map(|(_, record)| record)
    }

    pub fn viewing(&self, connection: ConnectionId) -> Option<ViewerRecord> {
        self.records.get(&connection).map(|record| *record)
    }

    /// Users viewing `chat_id` through a connection that is joined to its room
    pub fn active_viewers(&self, chat_id: Uuid) -> HashSet<Uuid> {
        self.router
            .members(chat_id)
            .into_iter()
            .filter_map(|connection| self.viewing(connection))
            .filter(|record| record.chat_id == chat_id)
            .map(|record| record.user_id)
            .collect()
    }
}
