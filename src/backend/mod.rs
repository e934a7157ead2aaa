//! Backend Module
//!
//! Server side of PeerChat: the realtime messaging core and the Axum
//! server around it. Only compiled with the `ssr` feature.
//!
//! # Components
//!
//! - **`chat`** - send orchestrator, membership notices, socket event handlers, REST handlers
//! - **`presence`** - online/offline binding of users to connections
//! - **`viewers`** - which connection is looking at which conversation
//! - **`delivery`** - sent → delivered → read transitions
//! - **`summary`** - last-message previews and sorted conversation lists
//! - **`realtime`** - broadcast router and WebSocket handling
//! - **`store`** - persistence gateway (Postgres and in-memory)
//! - **`server`** / **`routes`** - state, startup and routing
//! - **`error`** - core and HTTP error types
//!
//! # Module Structure
//!
//! ```text
//! backend/
//! ├── mod.rs
//! ├── main.rs       - server binary
//! ├── chat/
//! ├── realtime/
//! ├── store/
//! ├── server/
//! ├── routes/
//! ├── error/
//! ├── presence.rs
//! ├── viewers.rs
//! ├── delivery.rs
//! └── summary.rs
//! ```
//!
//! # Send path
//!
//! ```text
//! send-message ─► Orchestrator::send ─► ack (provisional) ─► message-received (room)
//!                                    └► spawn ─► store ─► message-confirmed ─► chat-updated
//! ```

/// Server setup and state
pub mod server;

/// Route configuration
pub mod routes;

/// Message send path and chat handlers
pub mod chat;

/// Broadcast router and WebSocket handling
pub mod realtime;

/// Backend error types
pub mod error;

/// Persistence gateway
pub mod store;

/// Presence tracking
pub mod presence;

/// Active viewer tracking
pub mod viewers;

/// Delivery and read receipts
pub mod delivery;

/// Conversation summaries
pub mod summary;

pub use error::{BackendError, CoreError};
pub use server::create_app;
