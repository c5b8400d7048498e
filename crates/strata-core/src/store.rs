//! Tiered value store
//!
//! Thin wrapper over the persistence adapter: point and bulk access to
//! override records, with tier paths validated against the configured tiers.
//! No resolution logic lives here.

use std::collections::HashMap;
use std::sync::Arc;

use crate::prelude::*;
use strata_types::{KeyFilter, OverrideRecord, SettingKey, StoreAdapter, TierPath, TierRank, Tiers};

#[derive(Clone, Debug)]
pub struct TieredStore {
	adapter: Arc<dyn StoreAdapter>,
	tiers: Arc<Tiers>,
}

impl TieredStore {
	pub fn new(adapter: Arc<dyn StoreAdapter>, tiers: Arc<Tiers>) -> Self {
		Self { adapter, tiers }
	}

	pub fn tiers(&self) -> &Arc<Tiers> {
		&self.tiers
	}

	/// Point lookup; a missing record is `None`, not an error
	pub async fn get(&self, key: &SettingKey, path: &TierPath) -> StResult<Option<OverrideRecord>> {
		self.tiers.validate_path(path)?;
		match self.adapter.read_record(key, path).await {
			Ok(record) => Ok(record),
			Err(Error::KeyNotFound(_)) => Ok(None),
			Err(err) => Err(err),
		}
	}

	/// All records stored at `tier` for the given coordinates, by key
	pub async fn get_all_at_tier(
		&self,
		tier: TierRank,
		coords: &TierPath,
	) -> StResult<HashMap<SettingKey, OverrideRecord>> {
		let path = coords.prefix(tier).ok_or_else(|| {
			Error::ValidationError(format!(
				"coordinates {} do not reach tier '{}'",
				coords,
				self.tiers.name(tier)
			))
		})?;
		self.tiers.validate_path(&path)?;
		let records = self.adapter.list_at_path(&path).await?;
		Ok(records.into_iter().map(|rec| (rec.key.clone(), rec)).collect())
	}

	/// The combined read used by resolution: every record relevant to `context`
	/// for the filtered keys, from one adapter call
	pub async fn fetch_applicable(
		&self,
		filter: KeyFilter<'_>,
		context: &TierPath,
	) -> StResult<Vec<OverrideRecord>> {
		self.tiers.validate_path(context)?;
		let records = self.adapter.list_applicable(filter, context).await?;
		debug!("Fetched {} records for context {}", records.len(), context);
		Ok(records)
	}

	pub async fn upsert(&self, record: &OverrideRecord) -> StResult<()> {
		self.tiers.validate_path(&record.path)?;
		self.adapter.upsert_record(record).await
	}

	pub async fn delete(&self, key: &SettingKey, path: &TierPath) -> StResult<bool> {
		self.tiers.validate_path(path)?;
		self.adapter.delete_record(key, path).await
	}

	pub async fn delete_subtree(&self, prefix: &SettingKey, path: &TierPath) -> StResult<u64> {
		self.tiers.validate_path(path)?;
		self.adapter.delete_subtree(prefix, path).await
	}

	/// Distinct concrete ids known at a tier, sorted
	pub async fn known_ids(&self, tier: TierRank) -> StResult<Vec<Box<str>>> {
		if self.tiers.get(tier).is_none() {
			return Err(Error::ValidationError(format!("unknown tier rank {}", tier)));
		}
		let mut ids = self.adapter.list_ids_at_tier(tier).await?;
		ids.sort();
		ids.dedup();
		Ok(ids)
	}
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
	use super::*;
	use crate::memory::MemoryStoreAdapter;
	use strata_types::SettingValue;

	fn key(s: &str) -> SettingKey {
		SettingKey::new(s).unwrap()
	}

	fn path(ids: &[&str]) -> TierPath {
		TierPath::from_strings(ids).unwrap()
	}

	fn store() -> TieredStore {
		TieredStore::new(Arc::new(MemoryStoreAdapter::new()), Arc::new(Tiers::simple()))
	}

	#[tokio::test]
	async fn test_get_missing_is_none() {
		let store = store();
		assert!(store.get(&key("theme"), &path(&["*"])).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_rejects_paths_deeper_than_tiers() {
		let store = store();
		let record = OverrideRecord::new(
			key("theme"),
			path(&["*", "w", "u", "extra"]),
			SettingValue::from("dark"),
			"test",
		);
		assert!(matches!(store.upsert(&record).await, Err(Error::ValidationError(_))));
	}

	#[tokio::test]
	async fn test_get_all_at_tier() {
		let store = store();
		for (k, p) in [("a", ["*", "w1"]), ("b", ["*", "w1"]), ("c", ["*", "w2"])] {
			let rec = OverrideRecord::new(key(k), path(&p), SettingValue::from(true), "test");
			store.upsert(&rec).await.unwrap();
		}

		let at_w1 = store.get_all_at_tier(TierRank(1), &path(&["*", "w1", "u1"])).await.unwrap();
		assert_eq!(at_w1.len(), 2);
		assert!(at_w1.contains_key(&key("a")));
		assert!(at_w1.contains_key(&key("b")));

		assert!(store.get_all_at_tier(TierRank(2), &path(&["*", "w1"])).await.is_err());
		assert_eq!(store.known_ids(TierRank(1)).await.unwrap(), vec![Box::<str>::from("w1"), Box::from("w2")]);
	}
}

// vim: ts=4
