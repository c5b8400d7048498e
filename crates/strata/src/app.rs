//! App builder - constructs and runs the Strata engine

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use crate::prelude::*;
use strata_core::cache::{BreakerPolicy, CacheFactory, builtin};
use strata_core::settings::SettingsRegistry;
use strata_types::{StoreAdapter, Tiers};

pub use strata_core::app::{AppBuilderOpts, AppState, VERSION};

/// Type alias for async initialization callbacks
type InitCallback =
	Box<dyn FnOnce(App) -> Pin<Box<dyn Future<Output = StResult<()>> + Send>> + Send>;

/// A module's setting definitions
pub type RegisterSettingsFn = fn(&mut SettingsRegistry) -> StResult<()>;

pub struct AppBuilder {
	opts: AppBuilderOpts,
	store_adapter: Option<Arc<dyn StoreAdapter>>,
	settings_modules: Vec<RegisterSettingsFn>,
	cache_factories: Vec<(&'static str, CacheFactory<AppState>)>,
	validate_required: bool,
	on_init: Vec<InitCallback>,
}

impl AppBuilder {
	pub fn new() -> Self {
		let installed = tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.with_target(false)
			.try_init();
		if installed.is_err() {
			debug!("Tracing subscriber already installed");
		}

		AppBuilder {
			opts: AppBuilderOpts::default(),
			store_adapter: None,
			settings_modules: Vec::new(),
			cache_factories: builtin::cache_factories(),
			validate_required: true,
			on_init: Vec::new(),
		}
	}

	// Opts
	pub fn tiers(&mut self, tiers: Tiers) -> &mut Self {
		self.opts.tiers = tiers;
		self
	}

	pub fn sweep_interval(&mut self, interval: Duration) -> &mut Self {
		self.opts.sweep_interval = interval;
		self
	}

	pub fn breaker(&mut self, policy: BreakerPolicy) -> &mut Self {
		self.opts.breaker = policy;
		self
	}

	pub fn tier_ids_refresh(&mut self, refresh: Duration) -> &mut Self {
		self.opts.tier_ids_refresh = refresh;
		self
	}

	/// Fail `build()` when a required setting has no value at the root tier
	pub fn validate_required(&mut self, validate: bool) -> &mut Self {
		self.validate_required = validate;
		self
	}

	// Adapters
	pub fn store_adapter(&mut self, store_adapter: Arc<dyn StoreAdapter>) -> &mut Self {
		self.store_adapter = Some(store_adapter);
		self
	}

	// Modules
	pub fn settings(&mut self, register: RegisterSettingsFn) -> &mut Self {
		self.settings_modules.push(register);
		self
	}

	pub fn cache_factory(&mut self, module: &'static str, factory: CacheFactory<AppState>) -> &mut Self {
		self.cache_factories.push((module, factory));
		self
	}

	/// Register an async initialization callback that runs after App is created
	/// but before the cache sweeper starts.
	pub fn on_init<F, Fut>(&mut self, f: F) -> &mut Self
	where
		F: FnOnce(App) -> Fut + Send + 'static,
		Fut: Future<Output = StResult<()>> + Send + 'static,
	{
		self.on_init.push(Box::new(move |app| Box::pin(f(app))));
		self
	}

	/// Construct the app state: settings registry, resolver and caches
	pub async fn build(self) -> StResult<App> {
		info!("Strata V{}", VERSION);
		info!(
			"Tiers: {}",
			self.opts.tiers.iter().map(|(_, def)| &*def.name).collect::<Vec<_>>().join(" < ")
		);

		let Some(store_adapter) = self.store_adapter else {
			error!("FATAL: No store adapter configured");
			return Err(Error::ConfigError("No store adapter configured".to_string()));
		};

		// Register settings from all modules
		let mut settings_registry = SettingsRegistry::new();
		for register in &self.settings_modules {
			register(&mut settings_registry).inspect_err(|err| {
				error!("FATAL: Settings registration failed: {}", err);
			})?;
		}
		info!("Registered {} settings", settings_registry.len());

		let app: App = Arc::new(AppState::new(self.opts, store_adapter, settings_registry.freeze()));

		if self.validate_required {
			app.resolver.validate_required_settings(&app.cancel).await.inspect_err(|err| {
				error!("FATAL: {}", err);
			})?;
			info!("Settings subsystem initialized and validated");
		}

		let registered = app.caches.discover(&self.cache_factories, app.as_ref());
		info!("Cache registry ready with {} cache(s)", registered);

		// Run custom init callbacks
		for callback in self.on_init {
			callback(app.clone()).await?;
		}

		Ok(app)
	}

	/// Build, then keep caches fresh until Ctrl-C or `AppState::shutdown()`
	pub async fn run(self) -> StResult<()> {
		let app = self.build().await?;
		let sweeper = crate::sweep::spawn_sweeper(app.clone());

		tokio::select! {
			res = tokio::signal::ctrl_c() => {
				if let Err(err) = res {
					error!("Cannot listen for shutdown signal: {}", err);
				}
			}
			() = app.cancel.cancelled() => {}
		}

		app.shutdown();
		if let Err(err) = sweeper.await {
			warn!("Cache sweeper ended abnormally: {}", err);
		}
		Ok(())
	}
}

impl Default for AppBuilder {
	fn default() -> Self {
		Self::new()
	}
}

// vim: ts=4
