//! Adapter that persists override records.
//!
//! The engine treats the adapter as a black box: it reads and writes single
//! records by `(key, path)` and performs the combined cascade read used by
//! resolution. Uniqueness per `(key, path)` is the adapter's responsibility.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::prelude::*;
use crate::{
	key::SettingKey,
	tier::{TierPath, TierRank},
	types::AuditInfo,
	value::SettingValue,
};

/// The persisted unit: one value for one key at one location in the hierarchy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRecord {
	pub key: SettingKey,
	pub path: TierPath,
	pub value: SettingValue,
	pub locked: bool,
	#[serde(flatten)]
	pub audit: AuditInfo,
}

impl OverrideRecord {
	pub fn new(key: SettingKey, path: TierPath, value: SettingValue, modified_by: &str) -> Self {
		Self { key, path, value, locked: false, audit: AuditInfo::now(modified_by) }
	}

	pub fn tier(&self) -> TierRank {
		self.path.tier()
	}

	pub fn type_name(&self) -> &'static str {
		self.value.type_name()
	}
}

/// Which keys a cascade read covers
#[derive(Clone, Copy, Debug)]
pub enum KeyFilter<'a> {
	/// Exactly these keys
	Keys(&'a [SettingKey]),
	/// The key, its ancestors and all of its descendants
	Lineage(&'a SettingKey),
	All,
}

impl KeyFilter<'_> {
	pub fn matches(&self, key: &SettingKey) -> bool {
		match self {
			KeyFilter::Keys(keys) => keys.contains(key),
			KeyFilter::Lineage(prefix) => key.starts_with(prefix) || prefix.is_descendant_of(key),
			KeyFilter::All => true,
		}
	}
}

#[async_trait]
pub trait StoreAdapter: Debug + Send + Sync {
	/// Point lookup of the record stored exactly at `path`
	async fn read_record(
		&self,
		key: &SettingKey,
		path: &TierPath,
	) -> StResult<Option<OverrideRecord>>;

	/// All records stored exactly at `path`, any key
	async fn list_at_path(&self, path: &TierPath) -> StResult<Vec<OverrideRecord>>;

	/// All records whose path applies to `context` and whose key passes `filter`.
	/// Must be served from one consistent read.
	async fn list_applicable(
		&self,
		filter: KeyFilter<'_>,
		context: &TierPath,
	) -> StResult<Vec<OverrideRecord>>;

	/// Distinct concrete ids stored at the coordinate position of `tier`
	async fn list_ids_at_tier(&self, tier: TierRank) -> StResult<Vec<Box<str>>>;

	/// Create or replace the record at `(record.key, record.path)`
	async fn upsert_record(&self, record: &OverrideRecord) -> StResult<()>;

	/// Delete one record, returns whether it existed
	async fn delete_record(&self, key: &SettingKey, path: &TierPath) -> StResult<bool>;

	/// Delete `prefix` and every key below it stored exactly at `path`
	async fn delete_subtree(&self, prefix: &SettingKey, path: &TierPath) -> StResult<u64>;
}


// vim: ts=4
