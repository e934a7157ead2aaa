//! Realtime Module
//!
//! - **`broadcast`** - topic router every component publishes through
//! - **`socket`** - `GET /ws` upgrade and per-connection read/write loops
//!
//! ```text
//! realtime/
//! ├── mod.rs
//! ├── broadcast.rs
//! └── socket.rs
//! ```

/// Topic-based event router
pub mod broadcast;

/// WebSocket connection handling
pub mod socket;

pub use broadcast::{BroadcastRouter, ConnectionId, Target, Topic};
pub use socket::ws_handler;
