//! Shared Module
//!
//! Types that cross the wire or the persistence boundary: users,
//! conversations, messages, realtime events and server configuration.
//! Nothing in here depends on the server runtime, so clients can reuse
//! these types without the `ssr` feature.

/// Message data structures
pub mod message;

/// User and presence data structures
pub mod user;

/// Conversation data structures
pub mod conversation;

/// Real-time event system
pub mod event;

/// Shared error types
pub mod error;

/// Server configuration
pub mod config;

pub use config::{ConfigError, ServerConfig, ServerConfigBuilder};
pub use conversation::{Conversation, ConversationKind, ConversationSummary, LastMessage};
pub use error::SharedError;
pub use event::{Ack, ClientEvent, ServerEvent};
pub use message::{Message, MessageKind, MessageStatus, MessageWithSender, NewMessage, ProvisionalMessage};
pub use user::{PresenceChange, User, UserProfile};
