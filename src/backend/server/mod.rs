//! Server Module
//!
//! - **`state`** - `AppState` and its `FromRef` implementations
//! - **`config`** - persistence gateway selection
//! - **`init`** - app creation and background tasks
//!
//! ```text
//! server/
//! ├── mod.rs
//! ├── state.rs
//! ├── config.rs
//! └── init.rs
//! ```

/// Application state management
pub mod state;

/// Persistence gateway selection
pub mod config;

/// Server initialization
pub mod init;

pub use init::create_app;
pub use state::AppState;
