//! Strata is a hierarchical configuration engine.
//!
//! # Features
//!
//! - Configurable override tiers (for example Developer, Provider,
//!   Distributor, Workspace, User)
//!     - most specific tier wins
//!     - a general tier can lock a key or a whole key prefix
//! - Pluggable persistence through the `StoreAdapter` trait
//! - Self-refreshing cache objects
//!     - single-flight refresh
//!     - stale values served while the backend is failing
//!     - circuit breaker with exponential backoff
//! - Process-wide cache registry with module discovery

// Re-export shared types and the adapter trait from strata-types
pub use strata_types::error;
pub use strata_types::key;
pub use strata_types::store_adapter;
pub use strata_types::tier;
pub use strata_types::types;
pub use strata_types::value;

// Core re-exports
pub use strata_core::cache;
pub use strata_core::memory;
pub use strata_core::resolve;
pub use strata_core::settings;
pub use strata_core::store;

// Local modules
pub mod app;
pub mod prelude;
pub mod sweep;

pub use crate::app::AppBuilder;
pub use strata_core::app::App;

// vim: ts=4
