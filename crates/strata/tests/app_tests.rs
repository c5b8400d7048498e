//! App builder tests
//!
//! Module registration, required settings validation, cache discovery and the
//! background sweeper, all over the in-memory store.

#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use strata::AppBuilder;
use strata::app::AppState;
use strata::cache::builtin::tier_ids_key;
use strata::cache::{CacheObject, CachedObject};
use strata::memory::MemoryStoreAdapter;
use strata::prelude::*;
use strata::settings::{SettingDefinition, SettingsRegistry};
use strata_types::{SettingKey, SettingValue, TierPath, Tiers};
use tokio_util::sync::CancellationToken;

fn register_ui(registry: &mut SettingsRegistry) -> StResult<()> {
	registry.register(
		SettingDefinition::builder("ui/theme").description("Colour theme").default("light").build()?,
	)
}

fn register_required(registry: &mut SettingsRegistry) -> StResult<()> {
	registry.register(SettingDefinition::builder("server/name").description("Instance name").build()?)
}

fn register_ui_again(registry: &mut SettingsRegistry) -> StResult<()> {
	register_ui(registry)
}

fn clock_factory(_: &AppState) -> StResult<Vec<Arc<dyn CachedObject>>> {
	let cache = CacheObject::new("test/clock", Some(Duration::from_secs(5)), |_| async {
		Ok::<_, Error>(Timestamp::now())
	});
	Ok(vec![Arc::new(cache)])
}

fn builder(adapter: Arc<MemoryStoreAdapter>) -> AppBuilder {
	let mut builder = AppBuilder::new();
	builder.tiers(Tiers::simple()).store_adapter(adapter).settings(register_ui);
	builder
}

#[tokio::test]
async fn test_build_registers_modules() {
	let mut builder = builder(Arc::new(MemoryStoreAdapter::new()));
	builder.cache_factory("clock", clock_factory);
	let app = builder.build().await.expect("Should build");

	assert_eq!(app.settings_registry.len(), 1);
	// System and Workspace ids plus the clock
	assert_eq!(app.caches.len(), 3);
	assert!(app.caches.contains(&tier_ids_key("System")));
	assert!(app.caches.contains("test/clock"));

	let eff = app
		.resolver
		.resolve(
			&SettingKey::new("ui/theme").expect("key"),
			&TierPath::from_strings(&["*", "w1", "u1"]).expect("path"),
			&app.cancel,
		)
		.await
		.expect("Should resolve");
	assert_eq!(eff.value, SettingValue::from("light"));
}

#[tokio::test]
async fn test_build_without_adapter_fails() {
	let res = AppBuilder::new().build().await;
	assert!(matches!(res, Err(Error::ConfigError(_))));
}

#[tokio::test]
async fn test_duplicate_setting_fails() {
	let mut builder = builder(Arc::new(MemoryStoreAdapter::new()));
	builder.settings(register_ui_again);
	assert!(matches!(builder.build().await, Err(Error::ConfigError(_))));
}

#[tokio::test]
async fn test_required_settings_validation() {
	let adapter = Arc::new(MemoryStoreAdapter::new());
	let mut strict = builder(adapter.clone());
	strict.settings(register_required);
	assert!(matches!(strict.build().await, Err(Error::ValidationError(_))));

	let mut lenient = builder(adapter);
	lenient.settings(register_required).validate_required(false);
	assert!(lenient.build().await.is_ok());
}

#[tokio::test]
async fn test_on_init_runs() {
	let mut builder = builder(Arc::new(MemoryStoreAdapter::new()));
	builder.on_init(|app| async move {
		let key = SettingKey::new("ui/theme")?;
		let root = TierPath::from_strings(&["*"])?;
		app.resolver.set(&key, &root, "dark".into(), "init", &CancellationToken::new()).await?;
		Ok::<(), Error>(())
	});
	let app = builder.build().await.expect("Should build");
	let root = TierPath::from_strings(&["*"]).expect("path");
	let stored = app.store.get(&SettingKey::new("ui/theme").expect("key"), &root).await;
	assert!(stored.expect("read").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_warms_and_stops() {
	let mut builder = builder(Arc::new(MemoryStoreAdapter::new()));
	builder.cache_factory("clock", clock_factory).sweep_interval(Duration::from_secs(1));
	let app = builder.build().await.expect("Should build");
	assert!(app.caches.stats().iter().all(|s| !s.loaded));

	let sweeper = strata::sweep::spawn_sweeper(app.clone());
	tokio::time::sleep(Duration::from_millis(10)).await;
	assert!(app.caches.stats().iter().all(|s| s.loaded));

	app.shutdown();
	tokio::time::timeout(Duration::from_secs(5), sweeper)
		.await
		.expect("sweeper stops")
		.expect("sweeper task");
	assert!(app.caches.is_empty());
}

// vim: ts=4
