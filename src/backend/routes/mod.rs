//! Route Configuration Module
//!
//! - **`router`** - main router creation, middleware and the realtime endpoint
//! - **`api_routes`** - REST endpoints
//!
//! ```text
//! routes/
//! ├── mod.rs
//! ├── router.rs
//! └── api_routes.rs
//! ```

/// Main router creation
pub mod router;

/// REST endpoints
pub mod api_routes;

pub use router::create_router;
