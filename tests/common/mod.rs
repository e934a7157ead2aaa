//! Common test utilities and helpers
//!
//! - `flaky_store` - a store wrapper that can delay or fail selected calls
//! - `client` - a test connection that collects the events it receives
//! - `harness` - an `AppState` plus helpers to seed users and chats
//! - `assertions` - assertion macros

pub mod assertions;
pub mod client;
pub mod flaky_store;
pub mod harness;

pub use client::TestClient;
pub use flaky_store::FlakyStore;
pub use harness::Harness;
