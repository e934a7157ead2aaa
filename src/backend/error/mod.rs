//! Backend Error Module
//!
//! - **`types`** - `CoreError` for the messaging core, `BackendError` for HTTP handlers
//! - **`conversion`** - `IntoResponse` for `BackendError`
//!
//! ```rust,no_run
//! use peerchat::backend::error::BackendError;
//! use axum::http::StatusCode;
//!
//! let err = BackendError::handler(StatusCode::BAD_REQUEST, "Invalid chat id");
//! assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
//! ```

/// Error type definitions
pub mod types;

/// Error conversion implementations
pub mod conversion;

pub use types::{BackendError, CoreError};
