//! App state type

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cache::{BreakerPolicy, CacheRegistry};
use crate::prelude::*;
use crate::resolve::Resolver;
use crate::settings::FrozenSettingsRegistry;
use crate::store::TieredStore;
use strata_types::{StoreAdapter, Tiers};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone)]
pub struct AppBuilderOpts {
	pub tiers: Tiers,
	/// Period of the background refresh of expired caches
	pub sweep_interval: Duration,
	pub breaker: BreakerPolicy,
	/// Lifetime of the known-ids caches
	pub tier_ids_refresh: Duration,
}

impl Default for AppBuilderOpts {
	fn default() -> Self {
		Self {
			tiers: Tiers::standard(),
			sweep_interval: Duration::from_secs(30),
			breaker: BreakerPolicy::default(),
			tier_ids_refresh: Duration::from_secs(300),
		}
	}
}

pub struct AppState {
	pub opts: AppBuilderOpts,
	pub tiers: Arc<Tiers>,
	pub store: TieredStore,
	pub settings_registry: Arc<FrozenSettingsRegistry>,
	pub resolver: Arc<Resolver>,
	pub caches: CacheRegistry,
	/// Cancelled on shutdown; background tasks stop when it fires
	pub cancel: CancellationToken,
}

impl AppState {
	pub fn new(
		opts: AppBuilderOpts,
		adapter: Arc<dyn StoreAdapter>,
		settings_registry: FrozenSettingsRegistry,
	) -> Self {
		let tiers = Arc::new(opts.tiers.clone());
		let store = TieredStore::new(adapter, tiers.clone());
		let settings_registry = Arc::new(settings_registry);
		let resolver = Arc::new(Resolver::new(store.clone(), settings_registry.clone()));
		Self {
			opts,
			tiers,
			store,
			settings_registry,
			resolver,
			caches: CacheRegistry::new(),
			cancel: CancellationToken::new(),
		}
	}

	pub fn is_shutting_down(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Stop background work and release every cache
	pub fn shutdown(&self) {
		if self.cancel.is_cancelled() {
			return;
		}
		info!("Shutting down");
		self.cancel.cancel();
		self.caches.clear();
	}
}

impl std::fmt::Debug for AppState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AppState")
			.field("opts", &self.opts)
			.field("caches", &self.caches)
			.finish_non_exhaustive()
	}
}

pub type App = Arc<AppState>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
	use super::*;
	use crate::memory::MemoryStoreAdapter;

	#[tokio::test]
	async fn test_shutdown_clears_caches() {
		let app = AppState::new(
			AppBuilderOpts::default(),
			Arc::new(MemoryStoreAdapter::new()),
			FrozenSettingsRegistry::empty(),
		);
		let factories = crate::cache::builtin::cache_factories();
		// Developer, Provider, Distributor and Workspace can lock
		assert_eq!(app.caches.discover(&factories, &app), 4);
		assert!(app.caches.contains("tiers/workspace/ids"));

		app.shutdown();
		assert!(app.is_shutting_down());
		assert!(app.caches.is_empty());
	}
}

// vim: ts=4
