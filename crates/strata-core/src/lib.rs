//! Core of Strata: the tiered value store, setting definitions, the hierarchy
//! resolution engine and self-refreshing caches.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod app;
pub mod cache;
pub mod memory;
pub mod prelude;
pub mod resolve;
pub mod settings;
pub mod store;
pub mod utils;

pub use app::{App, AppBuilderOpts, AppState};
pub use cache::{CacheObject, CacheRegistry, CachedObject};
pub use resolve::{EffectiveSetting, Resolver, ValueSource};
pub use store::TieredStore;

// vim: ts=4
