//! Hierarchy resolution engine
//!
//! Computes the effective value of a setting for a caller's tier path.
//!
//! # Precedence
//!
//! Tiers are scanned from the most general to the caller's own tier. The first
//! lock found (on the key itself or on one of its prefixes) vetoes every more
//! specific tier: the value comes from the locked record, or for a prefix lock
//! from the most specific record at or above the locking tier. Without any
//! lock, the most specific tier holding a record wins. Inside one tier a
//! concrete coordinate beats a wildcard. If nothing matches, the registered
//! default is used.
//!
//! Every resolution works on one [`Cascade`], the snapshot of a single store
//! read, so records fetched at different instants are never mixed.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::prelude::*;
use crate::settings::FrozenSettingsRegistry;
use crate::store::TieredStore;
use crate::utils::cancellable;
use strata_types::{
	KeyFilter, OverrideRecord, SettingKey, SettingValue, TierPath, TierRank, Tiers,
	types::{AuditInfo, serialize_timestamp_iso_opt},
};

/// Where an effective value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
	Tier(TierRank),
	Default,
}

/// The outcome of a resolution
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveSetting {
	pub key: SettingKey,
	pub value: SettingValue,
	pub source: ValueSource,
	/// Tier holding the lock that froze this setting
	pub locked_by: Option<TierRank>,
	/// Whether the caller may write an override at its own tier
	pub editable: bool,
	#[serde(serialize_with = "serialize_timestamp_iso_opt")]
	pub modified_at: Option<Timestamp>,
	pub modified_by: Option<Box<str>>,
}

impl EffectiveSetting {
	fn from_record(key: &SettingKey, record: &OverrideRecord, locked_by: Option<TierRank>) -> Self {
		Self {
			key: key.clone(),
			value: record.value.clone(),
			source: ValueSource::Tier(record.tier()),
			locked_by,
			editable: locked_by.is_none(),
			modified_at: Some(record.audit.modified_at),
			modified_by: Some(record.audit.modified_by.clone()),
		}
	}

	fn from_default(key: &SettingKey, value: SettingValue, locked_by: Option<TierRank>) -> Self {
		Self {
			key: key.clone(),
			value,
			source: ValueSource::Default,
			locked_by,
			editable: locked_by.is_none(),
			modified_at: None,
			modified_by: None,
		}
	}
}

// Cascade //
//*********//
/// Records of one store read, grouped per key and per tier.
/// Each tier's records are ordered most specific first.
#[derive(Debug)]
pub struct Cascade {
	context_tier: TierRank,
	by_key: BTreeMap<SettingKey, Vec<Vec<OverrideRecord>>>,
}

/// A lock found while scanning a cascade
#[derive(Debug)]
struct LockHit<'a> {
	tier: TierRank,
	record: &'a OverrideRecord,
}

impl Cascade {
	pub fn new(context: &TierPath, records: Vec<OverrideRecord>) -> Self {
		let depth = context.len();
		let mut by_key: BTreeMap<SettingKey, Vec<Vec<OverrideRecord>>> = BTreeMap::new();
		for record in records {
			// Adapters may over-fetch; only records applying to the context count
			if !record.path.applies_to(context) {
				continue;
			}
			let tiers = by_key.entry(record.key.clone()).or_insert_with(|| vec![Vec::new(); depth]);
			if let Some(slot) = tiers.get_mut(record.tier().index()) {
				slot.push(record);
			}
		}
		for slot in by_key.values_mut().flatten() {
			slot.sort_by(|a, b| {
				b.path
					.cmp_specificity(&a.path)
					.then_with(|| b.audit.modified_at.cmp(&a.audit.modified_at))
			});
		}
		Self { context_tier: context.tier(), by_key }
	}

	pub fn keys(&self) -> impl Iterator<Item = &SettingKey> {
		self.by_key.keys()
	}

	pub fn records(&self) -> impl Iterator<Item = &OverrideRecord> {
		self.by_key.values().flatten().flatten()
	}

	pub fn is_empty(&self) -> bool {
		self.by_key.is_empty()
	}

	fn at(&self, key: &SettingKey, tier: TierRank) -> &[OverrideRecord] {
		self.by_key
			.get(key)
			.and_then(|tiers| tiers.get(tier.index()))
			.map_or(&[], Vec::as_slice)
	}

	/// The record supplying `key` at `tier` after the tie-break
	fn winner(&self, key: &SettingKey, tier: TierRank) -> Option<&OverrideRecord> {
		self.at(key, tier).first()
	}

	fn record_at(&self, key: &SettingKey, path: &TierPath) -> Option<&OverrideRecord> {
		self.at(key, path.tier()).iter().find(|rec| &rec.path == path)
	}

	/// Most specific tier first, starting at `upto` (clamped to the context)
	fn tiers_down_from(&self, upto: TierRank) -> impl Iterator<Item = TierRank> {
		(0..=upto.min(self.context_tier).0).rev().map(TierRank)
	}

	/// First lock on `key` or one of its prefixes, scanning general to specific
	/// up to `upto`. At one tier a lock on the key itself is preferred.
	fn find_lock(&self, key: &SettingKey, upto: TierRank) -> Option<LockHit<'_>> {
		let mut lineage = key.lineage();
		lineage.reverse();
		(0..=upto.min(self.context_tier).0).map(TierRank).find_map(|tier| {
			lineage
				.iter()
				.find_map(|k| self.at(k, tier).iter().find(|rec| rec.locked))
				.map(|record| LockHit { tier, record })
		})
	}
}

// Resolver //
//**********//
pub struct Resolver {
	tiers: Arc<Tiers>,
	store: TieredStore,
	definitions: Arc<FrozenSettingsRegistry>,
}

impl Resolver {
	pub fn new(store: TieredStore, definitions: Arc<FrozenSettingsRegistry>) -> Self {
		Self { tiers: store.tiers().clone(), store, definitions }
	}

	pub fn tiers(&self) -> &Arc<Tiers> {
		&self.tiers
	}

	pub fn store(&self) -> &TieredStore {
		&self.store
	}

	pub fn definitions(&self) -> &Arc<FrozenSettingsRegistry> {
		&self.definitions
	}

	async fn cascade(
		&self,
		filter: KeyFilter<'_>,
		context: &TierPath,
		cancel: &CancellationToken,
	) -> StResult<Cascade> {
		let records = cancellable(cancel, self.store.fetch_applicable(filter, context)).await?;
		Ok(Cascade::new(context, records))
	}

	fn locked_error(&self, key: &SettingKey, tier: TierRank) -> Error {
		Error::Locked { key: key.as_str().into(), tier: self.tiers.name(tier).into() }
	}

	/// Resolve `key` against an already fetched cascade
	pub fn resolve_in(&self, cascade: &Cascade, key: &SettingKey) -> StResult<EffectiveSetting> {
		let lock = cascade.find_lock(key, cascade.context_tier);
		let locked_by = lock.as_ref().map(|hit| hit.tier);

		let record = match &lock {
			Some(hit) if &hit.record.key == key => Some(hit.record),
			Some(hit) => cascade.tiers_down_from(hit.tier).find_map(|t| cascade.winner(key, t)),
			None => cascade.tiers_down_from(cascade.context_tier).find_map(|t| cascade.winner(key, t)),
		};

		if let Some(record) = record {
			return Ok(EffectiveSetting::from_record(key, record, locked_by));
		}
		match self.definitions.get(key).and_then(|def| def.default.clone()) {
			Some(default) => Ok(EffectiveSetting::from_default(key, default, locked_by)),
			None => Err(Error::KeyNotFound(key.as_str().into())),
		}
	}

	/// Resolve several keys from one cascade, skipping keys with no value
	fn resolve_many<'a>(
		&self,
		cascade: &Cascade,
		keys: impl IntoIterator<Item = &'a SettingKey>,
	) -> StResult<Vec<EffectiveSetting>> {
		let mut settings = Vec::new();
		for key in keys {
			match self.resolve_in(cascade, key) {
				Ok(setting) => settings.push(setting),
				Err(Error::KeyNotFound(_)) => {}
				Err(err) => return Err(err),
			}
		}
		Ok(settings)
	}

	/// Compute the effective value of `key` for `context`
	pub async fn resolve(
		&self,
		key: &SettingKey,
		context: &TierPath,
		cancel: &CancellationToken,
	) -> StResult<EffectiveSetting> {
		let lineage = key.lineage();
		let cascade = self.cascade(KeyFilter::Keys(&lineage), context, cancel).await?;
		let setting = self.resolve_in(&cascade, key)?;
		debug!(
			"Resolved '{}' for {} from {:?} (locked_by={:?})",
			key, context, setting.source, setting.locked_by
		);
		Ok(setting)
	}

	/// Effective value, falling back to `default` when the key is not configured
	pub async fn get_effective_value(
		&self,
		key: &SettingKey,
		context: &TierPath,
		default: SettingValue,
		cancel: &CancellationToken,
	) -> StResult<SettingValue> {
		match self.resolve(key, context, cancel).await {
			Ok(setting) => Ok(setting.value),
			Err(Error::KeyNotFound(_)) => Ok(default),
			Err(err) => Err(err),
		}
	}

	/// Write an override at the caller's own tier
	pub async fn set(
		&self,
		key: &SettingKey,
		context: &TierPath,
		value: SettingValue,
		modified_by: &str,
		cancel: &CancellationToken,
	) -> StResult<OverrideRecord> {
		self.tiers.validate_path(context)?;
		if let Some(def) = self.definitions.get(key) {
			def.check(&value, context.tier())?;
		}

		let lineage = key.lineage();
		let cascade = self.cascade(KeyFilter::Keys(&lineage), context, cancel).await?;
		if let Some(hit) = cascade.find_lock(key, context.tier()) {
			warn!(
				"Rejected write of '{}' at {}: locked at tier {} by '{}'",
				key,
				context,
				self.tiers.name(hit.tier),
				hit.record.key
			);
			return Err(self.locked_error(key, hit.tier));
		}

		let record = OverrideRecord::new(key.clone(), context.clone(), value, modified_by);
		cancellable(cancel, self.store.upsert(&record)).await?;
		info!("Setting '{}' set at {} by {}", key, context, modified_by);
		Ok(record)
	}

	/// Lock or unlock the override stored at `path`
	///
	/// Locking a location without a record stores the currently effective value
	/// there. Unlocking keeps the value.
	pub async fn set_lock(
		&self,
		key: &SettingKey,
		path: &TierPath,
		locked: bool,
		modified_by: &str,
		cancel: &CancellationToken,
	) -> StResult<()> {
		self.tiers.validate_path(path)?;
		let tier = path.tier();
		if !self.tiers.can_lock(tier) {
			return Err(Error::Forbidden(format!(
				"tier '{}' cannot hold locks",
				self.tiers.name(tier)
			)));
		}

		let lineage = key.lineage();
		let cascade = self.cascade(KeyFilter::Keys(&lineage), path, cancel).await?;
		let existing = cascade.record_at(key, path);

		if !locked {
			match existing {
				Some(record) if record.locked => {
					let mut record = record.clone();
					record.locked = false;
					record.audit = AuditInfo::now(modified_by);
					cancellable(cancel, self.store.upsert(&record)).await?;
					info!("Setting '{}' unlocked at {} by {}", key, path, modified_by);
				}
				_ => debug!("Setting '{}' is not locked at {}", key, path),
			}
			return Ok(());
		}

		if let Some(hit) = cascade.find_lock(key, tier) {
			if &hit.record.key == key && &hit.record.path == path {
				debug!("Setting '{}' is already locked at {}", key, path);
				return Ok(());
			}
			return Err(self.locked_error(key, hit.tier));
		}

		let mut record = match existing {
			Some(record) => record.clone(),
			None => {
				let effective = self.resolve_in(&cascade, key)?;
				OverrideRecord::new(key.clone(), path.clone(), effective.value, modified_by)
			}
		};
		record.locked = true;
		record.audit = AuditInfo::now(modified_by);
		cancellable(cancel, self.store.upsert(&record)).await?;
		info!("Setting '{}' locked at {} by {}", key, path, modified_by);
		Ok(())
	}

	/// Whether a lock at or above the caller's tier freezes `key`
	pub async fn is_locked(
		&self,
		key: &SettingKey,
		context: &TierPath,
		cancel: &CancellationToken,
	) -> StResult<bool> {
		let lineage = key.lineage();
		let cascade = self.cascade(KeyFilter::Keys(&lineage), context, cancel).await?;
		Ok(cascade.find_lock(key, context.tier()).is_some())
	}

	/// Delete the override at exactly `context`, optionally with every key below it.
	/// Resetting a missing override is not an error.
	pub async fn reset(
		&self,
		key: &SettingKey,
		context: &TierPath,
		include_descendants: bool,
		cancel: &CancellationToken,
	) -> StResult<u64> {
		let removed = if include_descendants {
			cancellable(cancel, self.store.delete_subtree(key, context)).await?
		} else {
			u64::from(cancellable(cancel, self.store.delete(key, context)).await?)
		};
		info!(
			"Reset '{}'{} at {}: {} override(s) removed",
			key,
			if include_descendants { " and descendants" } else { "" },
			context,
			removed
		);
		Ok(removed)
	}

	/// Effective settings for every key overridden at `tier` on the caller's path
	pub async fn get_all_at_tier(
		&self,
		tier: TierRank,
		context: &TierPath,
		cancel: &CancellationToken,
	) -> StResult<Vec<EffectiveSetting>> {
		let at = context.prefix(tier).ok_or_else(|| {
			Error::ValidationError(format!(
				"tier '{}' is more specific than context {}",
				self.tiers.name(tier),
				context
			))
		})?;
		let cascade = self.cascade(KeyFilter::All, context, cancel).await?;
		let keys: BTreeSet<&SettingKey> =
			cascade.records().filter(|rec| rec.path == at).map(|rec| &rec.key).collect();
		self.resolve_many(&cascade, keys)
	}

	/// Effective settings for every key strictly below `prefix` that is either
	/// overridden on the caller's path or has a registered default
	pub async fn get_children(
		&self,
		prefix: &SettingKey,
		context: &TierPath,
		cancel: &CancellationToken,
	) -> StResult<Vec<EffectiveSetting>> {
		let cascade = self.cascade(KeyFilter::Lineage(prefix), context, cancel).await?;
		let mut keys: BTreeSet<&SettingKey> =
			cascade.keys().filter(|key| key.is_descendant_of(prefix)).collect();
		keys.extend(
			self.definitions
				.list_by_prefix(prefix)
				.filter(|def| def.default.is_some())
				.map(|def| &def.key),
		);
		self.resolve_many(&cascade, keys)
	}

	/// Validate that all required settings (no default and not optional) are
	/// configured at the most general tier
	pub async fn validate_required_settings(&self, cancel: &CancellationToken) -> StResult<()> {
		let root = TierPath::wildcard(TierRank(0));
		for def in self.definitions.list() {
			if def.optional || def.wildcard || def.default.is_some() {
				continue;
			}
			if cancellable(cancel, self.store.get(&def.key, &root)).await?.is_none() {
				return Err(Error::ValidationError(format!(
					"Required setting '{}' is not configured",
					def.key
				)));
			}
		}
		Ok(())
	}

	/// Type-safe getters (required - returns error if not found)
	pub async fn get_string(
		&self,
		key: &SettingKey,
		context: &TierPath,
		cancel: &CancellationToken,
	) -> StResult<String> {
		match self.resolve(key, context, cancel).await?.value {
			SettingValue::String(s) => Ok(s),
			v => Err(self.type_error(key, "string", &v)),
		}
	}

	pub async fn get_int(
		&self,
		key: &SettingKey,
		context: &TierPath,
		cancel: &CancellationToken,
	) -> StResult<i64> {
		match self.resolve(key, context, cancel).await?.value {
			SettingValue::Int(i) => Ok(i),
			v => Err(self.type_error(key, "int", &v)),
		}
	}

	pub async fn get_bool(
		&self,
		key: &SettingKey,
		context: &TierPath,
		cancel: &CancellationToken,
	) -> StResult<bool> {
		match self.resolve(key, context, cancel).await?.value {
			SettingValue::Bool(b) => Ok(b),
			v => Err(self.type_error(key, "bool", &v)),
		}
	}

	fn type_error(&self, key: &SettingKey, expected: &'static str, got: &SettingValue) -> Error {
		debug!("Setting '{}' requested as {}, holds {}", key, expected, got.type_name());
		Error::TypeMismatch { key: key.as_str().into(), expected }
	}
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
	use super::*;
	use crate::memory::MemoryStoreAdapter;
	use crate::settings::{SettingDefinition, SettingsRegistry};
	use strata_types::StoreAdapter;

	fn key(s: &str) -> SettingKey {
		SettingKey::new(s).unwrap()
	}

	fn path(ids: &[&str]) -> TierPath {
		TierPath::from_strings(ids).unwrap()
	}

	fn record(k: &str, p: &[&str], value: &str, locked: bool) -> OverrideRecord {
		let mut rec = OverrideRecord::new(key(k), path(p), SettingValue::from(value), "test");
		rec.locked = locked;
		rec
	}

	#[test]
	fn test_cascade_tie_break_prefers_concrete() {
		let ctx = path(&["*", "w1", "u1"]);
		let cascade = Cascade::new(
			&ctx,
			vec![
				record("theme", &["*", "*"], "wildcard", false),
				record("theme", &["*", "w1"], "concrete", false),
				record("theme", &["*", "w2"], "other", false),
			],
		);
		let winner = cascade.winner(&key("theme"), TierRank(1)).unwrap();
		assert_eq!(winner.value, SettingValue::from("concrete"));
		assert_eq!(cascade.records().count(), 2);
	}

	#[test]
	fn test_cascade_most_general_lock_wins() {
		let ctx = path(&["*", "w1", "u1"]);
		let cascade = Cascade::new(
			&ctx,
			vec![
				record("theme", &["*"], "dark", true),
				record("theme", &["*", "w1"], "light", true),
			],
		);
		let hit = cascade.find_lock(&key("theme"), ctx.tier()).unwrap();
		assert_eq!(hit.tier, TierRank(0));
		assert_eq!(hit.record.value, SettingValue::from("dark"));
	}

	#[tokio::test]
	async fn test_resolve_uses_single_read() {
		let adapter = Arc::new(MemoryStoreAdapter::new());
		let store = TieredStore::new(adapter.clone(), Arc::new(Tiers::simple()));
		let resolver = Resolver::new(store, Arc::new(FrozenSettingsRegistry::empty()));
		adapter.upsert_record(&record("a/b", &["*"], "x", false)).await.unwrap();

		let cancel = CancellationToken::new();
		let before = adapter.read_count();
		resolver.resolve(&key("a/b"), &path(&["*", "w", "u"]), &cancel).await.unwrap();
		assert_eq!(adapter.read_count(), before + 1);
	}

	#[tokio::test]
	async fn test_default_and_not_found() {
		let mut registry = SettingsRegistry::new();
		registry
			.register(
				SettingDefinition::builder("ui/font-size")
					.description("Font size")
					.default(12_i64)
					.build()
					.unwrap(),
			)
			.unwrap();
		let store =
			TieredStore::new(Arc::new(MemoryStoreAdapter::new()), Arc::new(Tiers::simple()));
		let resolver = Resolver::new(store, Arc::new(registry.freeze()));
		let cancel = CancellationToken::new();
		let ctx = path(&["*", "w1"]);

		let setting = resolver.resolve(&key("ui/font-size"), &ctx, &cancel).await.unwrap();
		assert_eq!(setting.source, ValueSource::Default);
		assert_eq!(setting.value, SettingValue::Int(12));
		assert!(setting.editable);

		let missing = resolver.resolve(&key("ui/missing"), &ctx, &cancel).await;
		assert!(matches!(missing, Err(Error::KeyNotFound(_))));

		let fallback = resolver
			.get_effective_value(&key("ui/missing"), &ctx, SettingValue::from("fb"), &cancel)
			.await
			.unwrap();
		assert_eq!(fallback, SettingValue::from("fb"));
		assert_eq!(resolver.get_int(&key("ui/font-size"), &ctx, &cancel).await.unwrap(), 12);
		assert!(resolver.get_bool(&key("ui/font-size"), &ctx, &cancel).await.is_err());
	}

	#[tokio::test]
	async fn test_backend_failure_propagates() {
		let adapter = Arc::new(MemoryStoreAdapter::new());
		let store = TieredStore::new(adapter.clone(), Arc::new(Tiers::simple()));
		let resolver = Resolver::new(store, Arc::new(FrozenSettingsRegistry::empty()));
		adapter.set_unavailable(true);

		let res = resolver.resolve(&key("a"), &path(&["*"]), &CancellationToken::new()).await;
		assert!(matches!(res, Err(Error::BackendUnavailable(_))));
	}

	#[tokio::test]
	async fn test_required_settings() {
		let mut registry = SettingsRegistry::new();
		registry
			.register(SettingDefinition::builder("server/name").description("Name").build().unwrap())
			.unwrap();
		let adapter = Arc::new(MemoryStoreAdapter::new());
		let store = TieredStore::new(adapter.clone(), Arc::new(Tiers::simple()));
		let resolver = Resolver::new(store, Arc::new(registry.freeze()));
		let cancel = CancellationToken::new();

		assert!(resolver.validate_required_settings(&cancel).await.is_err());
		adapter.upsert_record(&record("server/name", &["*"], "strata", false)).await.unwrap();
		assert!(resolver.validate_required_settings(&cancel).await.is_ok());
	}
}

// vim: ts=4
