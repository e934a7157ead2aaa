/**
 * Realtime Broadcast Router
 *
 * Fans server events out to connected clients. Every connection owns an
 * unbounded outbox; topics map to the set of connections subscribed to
 * them.
 *
 * # Topics
 *
 * - `Topic::Conversation(id)` - joined explicitly with `join-chat`
 * - `Topic::User(id)` - the user's own channel, subscribed on `user-online`
 *
 * # Lifecycle
 *
 * The router is constructed once at startup and handed to every component
 * that publishes. `shutdown` drops every outbox, which ends the writer
 * task of each connection.
 *
 * # Delivery
 *
 * A publish reaches each connection at most once, even when the connection
 * is subscribed to several of the targeted topics.
 */

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::shared::event::ServerEvent;

/// Ephemeral handle of one realtime connection
pub type ConnectionId = Uuid;

/// Sending half of a connection's outbox
pub type OutboxSender = mpsc::UnboundedSender<Arc<ServerEvent>>;

/// Receiving half of a connection's outbox, drained by the socket writer
pub type Outbox = mpsc::UnboundedReceiver<Arc<ServerEvent>>;

/// A broadcast group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Conversation(Uuid),
    User(Uuid),
}

/// Recipient set of one publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Topic(Topic),
    Connection(ConnectionId),
}

impl Target {
    pub fn conversation(chat_id: Uuid) -> Self {
        Self::Topic(Topic::Conversation(chat_id))
    }

    pub fn user(user_id: Uuid) -> Self {
        Self::Topic(Topic::User(user_id))
    }
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, OutboxSender>,
    topics: HashMap<Topic, HashSet<ConnectionId>>,
    memberships: HashMap<ConnectionId, HashSet<Topic>>,
    closed: bool,
}

impl Registry {
    fn subscribe(&mut self, connection: ConnectionId, topic: Topic) -> bool {
        if !self.connections.contains_key(&connection) {
            return false;
        }
        self.memberships.entry(connection).or_default().insert(topic);
        self.topics.entry(topic).or_default().insert(connection)
    }

    fn unsubscribe(&mut self, connection: ConnectionId, topic: Topic) -> bool {
        if let Some(topics) = self.memberships.get_mut(&connection) {
            topics.remove(&topic);
        }
        self.topics
            .get_mut(&topic)
            .is_some_and(|members| members.remove(&connection))
    }

    fn deliver(&self, connection: &ConnectionId, event: &Arc<ServerEvent>) -> bool {
        match self.connections.get(connection) {
            Some(outbox) => outbox.send(Arc::clone(event)).is_ok(),
            None => false,
        }
    }
}

/// Topic-based router shared by every publisher
#[derive(Clone, Default)]
pub struct BroadcastRouter {
    inner: Arc<Mutex<Registry>>,
}

impl BroadcastRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new connection and return its handle and outbox.
    ///
    /// After `shutdown` the returned outbox is already closed.
    pub fn connect(&self) -> (ConnectionId, Outbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Uuid::new_v4();
        let mut registry = self.registry();
        if registry.closed {
            tracing::warn!("[Realtime] Connection {} refused, router is shut down", connection);
        } else {
            registry.connections.insert(connection, tx);
            tracing::debug!("[Realtime] Connection {} registered", connection);
        }
        (connection, rx)
    }

    /// Join a conversation's broadcast group. Returns false if already joined.
    pub fn join(&self, connection: ConnectionId, chat_id: Uuid) -> bool {
        let joined = self.registry().subscribe(connection, Topic::Conversation(chat_id));
        if joined {
            tracing::debug!("[Realtime] Connection {} joined chat {}", connection, chat_id);
        }
        joined
    }

    pub fn leave(&self, connection: ConnectionId, chat_id: Uuid) -> bool {
        self.registry().unsubscribe(connection, Topic::Conversation(chat_id))
    }

    /// Subscribe a connection to a user's own topic
    pub fn subscribe_user(&self, connection: ConnectionId, user_id: Uuid) -> bool {
        self.registry().subscribe(connection, Topic::User(user_id))
    }

    pub fn unsubscribe_user(&self, connection: ConnectionId, user_id: Uuid) -> bool {
        self.registry().unsubscribe(connection, Topic::User(user_id))
    }

    /// Drop a connection and every subscription it holds
    pub fn disconnect(&self, connection: ConnectionId) {
        let mut registry = self.registry();
        registry.connections.remove(&connection);
        if let Some(topics) = registry.memberships.remove(&connection) {
            for topic in topics {
                if let Some(members) = registry.topics.get_mut(&topic) {
                    members.remove(&connection);
                }
            }
        }
        tracing::debug!("[Realtime] Connection {} removed", connection);
    }

    /// Close every outbox and refuse new connections
    pub fn shutdown(&self) {
        let mut registry = self.registry();
        let count = registry.connections.len();
        registry.connections.clear();
        registry.topics.clear();
        registry.memberships.clear();
        registry.closed = true;
        tracing::info!("[Realtime] Router shut down, {} connections closed", count);
    }

    pub fn is_shut_down(&self) -> bool {
        self.registry().closed
    }

    /// Deliver `event` to every connection named by `targets`.
    ///
    /// Returns the number of connections reached.
    pub fn publish(&self, targets: &[Target], event: ServerEvent, exclude: Option<ConnectionId>) -> usize {
        let event = Arc::new(event);
        let registry = self.registry();
        let mut seen = HashSet::new();
        let mut reached = 0;
        let mut reach = |connection: ConnectionId| {
            if Some(connection) != exclude && seen.insert(connection) && registry.deliver(&connection, &event) {
                reached += 1;
            }
        };
        for target in targets {
            match target {
                Target::Connection(connection) => reach(*connection),
                Target::Topic(topic) => {
                    if let Some(members) = registry.topics.get(topic) {
                        members.iter().copied().for_each(&mut reach);
                    }
                }
            }
        }
        tracing::debug!("[Realtime] {} delivered to {} connections", event.name(), reached);
        reached
    }

    pub fn broadcast_to_conversation(&self, chat_id: Uuid, event: ServerEvent, exclude: Option<ConnectionId>) -> usize {
        self.publish(&[Target::conversation(chat_id)], event, exclude)
    }

    pub fn broadcast_to_user(&self, user_id: Uuid, event: ServerEvent) -> usize {
        self.publish(&[Target::user(user_id)], event, None)
    }

    /// Deliver to every registered connection
    pub fn broadcast_global(&self, event: ServerEvent) -> usize {
        self.broadcast_where(event, |_| true)
    }

    /// Deliver to every connection not subscribed to `user_id`'s own topic
    pub fn broadcast_except_user(&self, user_id: Uuid, event: ServerEvent) -> usize {
        let own = Topic::User(user_id);
        let own_connections = self.registry().topics.get(&own).cloned().unwrap_or_default();
        self.broadcast_where(event, |connection| !own_connections.contains(connection))
    }

    fn broadcast_where(&self, event: ServerEvent, keep: impl Fn(&ConnectionId) -> bool) -> usize {
        let event = Arc::new(event);
        let registry = self.registry();
        let reached = registry
            .connections
            .keys()
            .filter(|connection| keep(*connection))
            .filter(|connection| registry.deliver(*connection, &event))
            .count();
        tracing::debug!("[Realtime] {} delivered globally to {} connections", event.name(), reached);
        reached
    }

    pub fn send_to_connection(&self, connection: ConnectionId, event: ServerEvent) -> bool {
        self.registry().deliver(&connection, &Arc::new(event))
    }

    /// Connections currently joined to a conversation
    pub fn members(&self, chat_id: Uuid) -> Vec<ConnectionId> {
        self.registry()
            .topics
            .get(&Topic::Conversation(chat_id))
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn member_count(&self, topic: Topic) -> usize {
        self.registry().topics.get(&topic).map_or(0, HashSet::len)
    }

    pub fn connection_count(&self) -> usize {
        self.registry().connections.len()
    }

    /// Forget topics nobody is subscribed to. Returns how many were removed.
    pub fn prune_empty_topics(&self) -> usize {
        let mut registry = self.registry();
        let before = registry.topics.len();
        registry.topics.retain(|_, members| !members.is_empty());
        before - registry.topics.len()
    }
}
