//! PeerChat - Realtime Messaging Core
//!
//! Delivery and state synchronization for a chat server: a message is
//! echoed to its sender at once, shown provisionally to everyone else in
//! the conversation, persisted in the background and then confirmed under
//! the same temporary id. Unread counters, last-message previews, presence
//! and delivery/read receipts are kept consistent across every connected
//! client.
//!
//! # Module Structure
//!
//! - **`shared`** - wire and domain types (messages, conversations, events,
//!   configuration, errors)
//! - **`backend`** - the Axum server and messaging core (`ssr` feature)
//!
//! # Usage
//!
//! ```rust,no_run
//! use peerchat::backend::server::create_app;
//! use peerchat::shared::config::ServerConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::load()?;
//! let (app, state) = create_app(config).await;
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! state.router.shutdown();
//! # Ok(())
//! # }
//! ```

/// Shared types and data structures
pub mod shared;

/// Backend server-side code
#[cfg(feature = "ssr")]
pub mod backend;
