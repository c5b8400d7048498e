//! In-memory store adapter
//!
//! Keeps override records in a `BTreeMap` behind a read-write lock. Used by
//! tests and by embedders that do not need persistence. Backend failures can
//! be injected with [`MemoryStoreAdapter::set_unavailable`].

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::prelude::*;
use strata_types::{
	Coord, KeyFilter, OverrideRecord, SettingKey, StoreAdapter, TierPath, TierRank,
};

type RecordKey = (SettingKey, TierPath);

#[derive(Debug, Default)]
pub struct MemoryStoreAdapter {
	records: RwLock<BTreeMap<RecordKey, OverrideRecord>>,
	unavailable: AtomicBool,
	reads: AtomicU64,
}

impl MemoryStoreAdapter {
	pub fn new() -> Self {
		Self::default()
	}

	/// Make every call fail with `BackendUnavailable` until reset
	pub fn set_unavailable(&self, unavailable: bool) {
		self.unavailable.store(unavailable, Ordering::SeqCst);
	}

	/// Number of read calls served so far
	pub fn read_count(&self) -> u64 {
		self.reads.load(Ordering::SeqCst)
	}

	pub fn len(&self) -> usize {
		self.records.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.read().is_empty()
	}

	fn check(&self) -> StResult<()> {
		if self.unavailable.load(Ordering::SeqCst) {
			return Err(Error::BackendUnavailable("memory store marked unavailable".into()));
		}
		Ok(())
	}

	fn read_access(&self) -> StResult<()> {
		self.check()?;
		self.reads.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

#[async_trait]
impl StoreAdapter for MemoryStoreAdapter {
	async fn read_record(
		&self,
		key: &SettingKey,
		path: &TierPath,
	) -> StResult<Option<OverrideRecord>> {
		self.read_access()?;
		Ok(self.records.read().get(&(key.clone(), path.clone())).cloned())
	}

	async fn list_at_path(&self, path: &TierPath) -> StResult<Vec<OverrideRecord>> {
		self.read_access()?;
		Ok(self.records.read().values().filter(|rec| &rec.path == path).cloned().collect())
	}

	async fn list_applicable(
		&self,
		filter: KeyFilter<'_>,
		context: &TierPath,
	) -> StResult<Vec<OverrideRecord>> {
		self.read_access()?;
		// One read guard for the whole scan keeps the snapshot consistent
		let records = self.records.read();
		Ok(records
			.values()
			.filter(|rec| filter.matches(&rec.key) && rec.path.applies_to(context))
			.cloned()
			.collect())
	}

	async fn list_ids_at_tier(&self, tier: TierRank) -> StResult<Vec<Box<str>>> {
		self.read_access()?;
		let ids: BTreeSet<Box<str>> = self
			.records
			.read()
			.values()
			.filter_map(|rec| match rec.path.get(tier) {
				Some(Coord::Id(id)) => Some(id.clone()),
				_ => None,
			})
			.collect();
		Ok(ids.into_iter().collect())
	}

	async fn upsert_record(&self, record: &OverrideRecord) -> StResult<()> {
		self.check()?;
		self.records
			.write()
			.insert((record.key.clone(), record.path.clone()), record.clone());
		Ok(())
	}

	async fn delete_record(&self, key: &SettingKey, path: &TierPath) -> StResult<bool> {
		self.check()?;
		Ok(self.records.write().remove(&(key.clone(), path.clone())).is_some())
	}

	async fn delete_subtree(&self, prefix: &SettingKey, path: &TierPath) -> StResult<u64> {
		self.check()?;
		let mut records = self.records.write();
		let before = records.len();
		records.retain(|(key, rec_path), _| !(rec_path == path && key.starts_with(prefix)));
		Ok(u64::try_from(before - records.len()).unwrap_or(u64::MAX))
	}
}


// vim: ts=4
