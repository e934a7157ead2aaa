//! Chat Backend Module
//!
//! The message path of the realtime core.
//!
//! - **`orchestrator`** - two-phase send (provisional broadcast, then persistence)
//! - **`membership`** - group member added/removed and join-request notices
//! - **`handlers`** - client event dispatch for one connection
//! - **`api`** - REST handlers for history, chat lists and seeding
//!
//! ```text
//! chat/
//! ├── mod.rs
//! ├── orchestrator.rs
//! ├── membership.rs
//! ├── handlers.rs
//! └── api.rs
//! ```

pub mod orchestrator;

pub mod membership;

pub mod handlers;

pub mod api;

pub use handlers::{handle_client_event, handle_disconnect, PersistHandle};
pub use membership::MembershipNotifier;
pub use orchestrator::{Dispatched, Orchestrator};
