//! Shared types, the persistence adapter trait and core utilities for Strata.
//!
//! This crate contains the foundational types that are shared between the
//! engine crate and all adapter implementations, so adapters compile without
//! pulling in the engine.

#![forbid(unsafe_code)]

pub mod error;
pub mod key;
pub mod prelude;
pub mod store_adapter;
pub mod tier;
pub mod types;
pub mod value;

pub use key::SettingKey;
pub use store_adapter::{KeyFilter, OverrideRecord, StoreAdapter};
pub use tier::{Coord, TierDef, TierPath, TierRank, Tiers};
pub use value::SettingValue;

// vim: ts=4
