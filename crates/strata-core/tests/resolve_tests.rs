//! Hierarchy resolution tests
//!
//! Lock precedence, most-specific-wins, prefix locks and write semantics over
//! the in-memory store.

#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use strata_core::memory::MemoryStoreAdapter;
use strata_core::resolve::{Resolver, ValueSource};
use strata_core::settings::{SettingDefinition, SettingsRegistry};
use strata_core::store::TieredStore;
use strata_types::prelude::*;
use strata_types::{SettingKey, SettingValue, TierPath, TierRank, Tiers};
use tokio_util::sync::CancellationToken;

fn key(s: &str) -> SettingKey {
	SettingKey::new(s).expect("valid key")
}

fn path(ids: &[&str]) -> TierPath {
	TierPath::from_strings(ids).expect("valid path")
}

fn create_resolver(registry: SettingsRegistry) -> (Resolver, Arc<MemoryStoreAdapter>) {
	let adapter = Arc::new(MemoryStoreAdapter::new());
	let store = TieredStore::new(adapter.clone(), Arc::new(Tiers::simple()));
	(Resolver::new(store, Arc::new(registry.freeze())), adapter)
}

fn ui_registry() -> SettingsRegistry {
	let mut registry = SettingsRegistry::new();
	registry
		.register(
			SettingDefinition::builder("ui/theme")
				.description("Colour theme")
				.default("light")
				.build()
				.expect("valid definition"),
		)
		.expect("registered");
	registry
		.register(
			SettingDefinition::builder("ui/font-size")
				.description("Font size in points")
				.default(12_i64)
				.max_tier(TierRank(1))
				.build()
				.expect("valid definition"),
		)
		.expect("registered");
	registry
}

#[tokio::test]
async fn test_system_lock_scenario() {
	let (resolver, _) = create_resolver(SettingsRegistry::new());
	let c = CancellationToken::new();
	let theme = key("Theme");
	let system = path(&["*"]);
	let workspace = path(&["*", "w"]);
	let user = path(&["*", "w", "u"]);

	resolver.set(&theme, &workspace, "Light".into(), "admin", &c).await.expect("workspace set");
	resolver.set(&theme, &user, "Blue".into(), "alice", &c).await.expect("user set");
	resolver.set(&theme, &system, "Dark".into(), "root", &c).await.expect("system set");
	resolver.set_lock(&theme, &system, true, "root", &c).await.expect("lock");

	let eff = resolver.resolve(&theme, &user, &c).await.expect("resolve");
	assert_eq!(eff.value, SettingValue::from("Dark"));
	assert!(!eff.editable);
	assert_eq!(eff.locked_by, Some(TierRank(0)));
	assert_eq!(eff.source, ValueSource::Tier(TierRank(0)));

	let res = resolver.set(&theme, &workspace, "Red".into(), "admin", &c).await;
	assert!(
		matches!(&res, Err(Error::Locked { tier, .. }) if &**tier == "System"),
		"expected Locked, got {:?}",
		res
	);
	assert!(resolver.is_locked(&theme, &user, &c).await.expect("is_locked"));

	resolver.set_lock(&theme, &system, false, "root", &c).await.expect("unlock");
	let eff = resolver.resolve(&theme, &user, &c).await.expect("resolve");
	assert_eq!(eff.value, SettingValue::from("Blue"));
	assert!(eff.editable);
	assert_eq!(eff.source, ValueSource::Tier(TierRank(2)));

	// Unlocking keeps the System value for callers above the User tier
	let eff = resolver.resolve(&theme, &path(&["*", "other"]), &c).await.expect("resolve");
	assert_eq!(eff.value, SettingValue::from("Dark"));
}

#[tokio::test]
async fn test_most_specific_wins() {
	let (resolver, _) = create_resolver(ui_registry());
	let c = CancellationToken::new();
	let theme = key("ui/theme");

	resolver.set(&theme, &path(&["*", "w1"]), "dark".into(), "admin", &c).await.expect("set");
	let user = path(&["*", "w1", "u1"]);
	assert_eq!(
		resolver.resolve(&theme, &user, &c).await.expect("resolve").value,
		SettingValue::from("dark")
	);

	// Other workspaces still see the default
	let eff = resolver.resolve(&theme, &path(&["*", "w2", "u1"]), &c).await.expect("resolve");
	assert_eq!(eff.source, ValueSource::Default);
	assert_eq!(eff.value, SettingValue::from("light"));
}

#[tokio::test]
async fn test_wildcard_coordinate_loses_to_concrete() {
	let (resolver, _) = create_resolver(SettingsRegistry::new());
	let c = CancellationToken::new();
	let k = key("ui/accent");

	resolver.set(&k, &path(&["*", "*"]), "grey".into(), "admin", &c).await.expect("set");
	resolver.set(&k, &path(&["*", "w1"]), "green".into(), "admin", &c).await.expect("set");

	let ctx = path(&["*", "w1", "u1"]);
	assert_eq!(resolver.resolve(&k, &ctx, &c).await.expect("resolve").value, SettingValue::from("green"));
	let ctx = path(&["*", "w2", "u1"]);
	assert_eq!(resolver.resolve(&k, &ctx, &c).await.expect("resolve").value, SettingValue::from("grey"));
}

#[tokio::test]
async fn test_prefix_lock_freezes_subtree() {
	let (resolver, _) = create_resolver(ui_registry());
	let c = CancellationToken::new();
	let ws = path(&["*", "w1"]);
	let user = path(&["*", "w1", "u1"]);

	resolver.set(&key("ui/theme"), &ws, "dark".into(), "admin", &c).await.expect("set");
	resolver.set(&key("ui/theme"), &user, "blue".into(), "alice", &c).await.expect("set");
	resolver.set(&key("ui"), &ws, SettingValue::Bool(true), "admin", &c).await.expect("set");
	resolver.set_lock(&key("ui"), &ws, true, "admin", &c).await.expect("lock");

	// The key itself falls back to the most specific value at or above the lock
	let eff = resolver.resolve(&key("ui/theme"), &user, &c).await.expect("resolve");
	assert_eq!(eff.value, SettingValue::from("dark"));
	assert_eq!(eff.locked_by, Some(TierRank(1)));
	assert!(!eff.editable);

	let res = resolver.set(&key("ui/theme"), &user, "red".into(), "alice", &c).await;
	assert!(matches!(res, Err(Error::Locked { .. })));

	// Keys outside the locked prefix are unaffected
	let res = resolver.set(&key("editor/tabs"), &user, SettingValue::Int(4), "alice", &c).await;
	assert!(res.is_ok());
}

#[tokio::test]
async fn test_lock_materialises_effective_value() {
	let (resolver, adapter) = create_resolver(ui_registry());
	let c = CancellationToken::new();
	let ws = path(&["*", "w1"]);

	resolver.set_lock(&key("ui/theme"), &ws, true, "admin", &c).await.expect("lock");
	assert_eq!(adapter.len(), 1);
	let eff = resolver.resolve(&key("ui/theme"), &path(&["*", "w1", "u1"]), &c).await.expect("resolve");
	assert_eq!(eff.value, SettingValue::from("light"));
	assert_eq!(eff.source, ValueSource::Tier(TierRank(1)));
	assert!(!eff.editable);

	// Locking twice is a no-op, locking an unknown key fails
	resolver.set_lock(&key("ui/theme"), &ws, true, "admin", &c).await.expect("relock");
	let res = resolver.set_lock(&key("ui/unknown"), &ws, true, "admin", &c).await;
	assert!(matches!(res, Err(Error::KeyNotFound(_))));
}

#[tokio::test]
async fn test_lock_rules() {
	let (resolver, _) = create_resolver(ui_registry());
	let c = CancellationToken::new();
	let theme = key("ui/theme");

	// The User tier cannot hold locks
	let res = resolver.set_lock(&theme, &path(&["*", "w1", "u1"]), true, "alice", &c).await;
	assert!(matches!(res, Err(Error::Forbidden(_))));

	// A lock below an existing more general lock is rejected
	resolver.set_lock(&theme, &path(&["*"]), true, "root", &c).await.expect("lock");
	let res = resolver.set_lock(&theme, &path(&["*", "w1"]), true, "admin", &c).await;
	assert!(matches!(res, Err(Error::Locked { .. })));

	// Unlocking where nothing is stored is a no-op
	resolver.set_lock(&theme, &path(&["*", "w1"]), false, "admin", &c).await.expect("unlock");
}

#[tokio::test]
async fn test_definition_checks() {
	let (resolver, _) = create_resolver(ui_registry());
	let c = CancellationToken::new();
	let size = key("ui/font-size");

	let res = resolver.set(&size, &path(&["*", "w1"]), "big".into(), "admin", &c).await;
	assert!(matches!(res, Err(Error::ValidationError(_))));

	// Above max_tier
	let res = resolver.set(&size, &path(&["*", "w1", "u1"]), SettingValue::Int(14), "alice", &c).await;
	assert!(matches!(res, Err(Error::Forbidden(_))));

	resolver.set(&size, &path(&["*", "w1"]), SettingValue::Int(14), "admin", &c).await.expect("set");
}

#[tokio::test]
async fn test_reset_is_idempotent() {
	let (resolver, _) = create_resolver(ui_registry());
	let c = CancellationToken::new();
	let theme = key("ui/theme");
	let ws = path(&["*", "w1"]);
	let user = path(&["*", "w1", "u1"]);

	resolver.set(&theme, &ws, "dark".into(), "admin", &c).await.expect("set");
	resolver.set(&theme, &user, "blue".into(), "alice", &c).await.expect("set");

	assert_eq!(resolver.reset(&theme, &user, false, &c).await.expect("reset"), 1);
	let first = resolver.resolve(&theme, &user, &c).await.expect("resolve");
	assert_eq!(resolver.reset(&theme, &user, false, &c).await.expect("reset"), 0);
	let second = resolver.resolve(&theme, &user, &c).await.expect("resolve");

	assert_eq!(first, second);
	assert_eq!(second.value, SettingValue::from("dark"));
}

#[tokio::test]
async fn test_reset_descendants() {
	let (resolver, adapter) = create_resolver(SettingsRegistry::new());
	let c = CancellationToken::new();
	let ws = path(&["*", "w1"]);

	for k in ["ui", "ui/theme", "ui/colors/bg", "uix"] {
		resolver.set(&key(k), &ws, "x".into(), "admin", &c).await.expect("set");
	}
	assert_eq!(resolver.reset(&key("ui"), &ws, true, &c).await.expect("reset"), 3);
	assert_eq!(adapter.len(), 1);
}

#[tokio::test]
async fn test_get_all_at_tier() {
	let (resolver, _) = create_resolver(SettingsRegistry::new());
	let c = CancellationToken::new();
	let ws = path(&["*", "w1"]);
	let user = path(&["*", "w1", "u1"]);

	resolver.set(&key("a"), &ws, "ws".into(), "admin", &c).await.expect("set");
	resolver.set(&key("b"), &ws, "ws".into(), "admin", &c).await.expect("set");
	resolver.set(&key("b"), &user, "user".into(), "alice", &c).await.expect("set");
	resolver.set(&key("c"), &path(&["*", "w2"]), "other".into(), "admin", &c).await.expect("set");

	let all = resolver.get_all_at_tier(TierRank(1), &user, &c).await.expect("list");
	let listed: Vec<(&str, SettingValue)> =
		all.iter().map(|s| (s.key.as_str(), s.value.clone())).collect();
	assert_eq!(listed, vec![("a", SettingValue::from("ws")), ("b", SettingValue::from("user"))]);

	let res = resolver.get_all_at_tier(TierRank(2), &ws, &c).await;
	assert!(matches!(res, Err(Error::ValidationError(_))));
}

#[tokio::test]
async fn test_get_children() {
	let (resolver, _) = create_resolver(ui_registry());
	let c = CancellationToken::new();
	let user = path(&["*", "w1", "u1"]);

	resolver.set(&key("ui/colors/bg"), &path(&["*", "w1"]), "#fff".into(), "admin", &c).await.expect("set");
	resolver.set(&key("editor/tabs"), &user, SettingValue::Int(2), "alice", &c).await.expect("set");

	let children = resolver.get_children(&key("ui"), &user, &c).await.expect("children");
	let keys: Vec<&str> = children.iter().map(|s| s.key.as_str()).collect();
	assert_eq!(keys, vec!["ui/colors/bg", "ui/font-size", "ui/theme"]);
	assert_eq!(children[1].source, ValueSource::Default);
}

#[tokio::test]
async fn test_typed_getters() {
	let (resolver, _) = create_resolver(ui_registry());
	let c = CancellationToken::new();
	let user = path(&["*", "w1", "u1"]);

	assert_eq!(resolver.get_string(&key("ui/theme"), &user, &c).await.expect("string"), "light");
	assert_eq!(resolver.get_int(&key("ui/font-size"), &user, &c).await.expect("int"), 12);
	let res = resolver.get_bool(&key("ui/theme"), &user, &c).await;
	assert!(matches!(res, Err(Error::TypeMismatch { expected: "bool", .. })));
}

#[tokio::test]
async fn test_cancelled_resolution() {
	let (resolver, _) = create_resolver(ui_registry());
	let c = CancellationToken::new();
	c.cancel();
	let res = resolver.resolve(&key("ui/theme"), &path(&["*"]), &c).await;
	assert!(matches!(res, Err(Error::Cancelled)));
}

// vim: ts=4
