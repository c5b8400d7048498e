//! Self-refreshing cache objects and their registry

pub mod builtin;
pub mod object;
pub mod registry;

pub use object::{AnyValue, BreakerPolicy, CacheObject, CacheStats, CachedObject, RefreshFn};
pub use registry::{CacheFactory, CacheRegistry, SweepReport};

// vim: ts=4
