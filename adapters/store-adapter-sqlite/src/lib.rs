//! SQLite store adapter for Strata
//!
//! Persists override records in a single `overrides` table keyed by
//! `(key, path)`. Cascade reads are one `SELECT`, so a resolution always sees
//! a consistent snapshot.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use sqlx::sqlite::{self, SqlitePool};
use std::path::Path;

use strata_types::prelude::*;
use strata_types::{KeyFilter, OverrideRecord, SettingKey, StoreAdapter, TierPath, TierRank};

mod record;
mod schema;
mod utils;

use schema::init_db;

#[derive(Debug)]
pub struct StoreAdapterSqlite {
	db: SqlitePool,
}

impl StoreAdapterSqlite {
	/// Open (or create) the database file at `path`
	pub async fn new(path: impl AsRef<Path>) -> StResult<Self> {
		let opts = sqlite::SqliteConnectOptions::new()
			.filename(path.as_ref())
			.create_if_missing(true)
			.journal_mode(sqlite::SqliteJournalMode::Wal);
		let db = sqlite::SqlitePoolOptions::new()
			.max_connections(5)
			.connect_with(opts)
			.await
			.inspect_err(|err| error!("DB: cannot open {}: {:#?}", path.as_ref().display(), err))
			.map_err(|err| Error::BackendUnavailable(err.to_string()))?;

		init_db(&db)
			.await
			.inspect_err(|err| error!("DB: schema init failed: {:#?}", err))
			.map_err(|err| Error::DbError(err.to_string()))?;

		info!("Store adapter opened at {}", path.as_ref().display());
		Ok(Self { db })
	}

	/// Close the pool; later calls fail with `BackendUnavailable`
	pub async fn close(&self) {
		self.db.close().await;
	}
}

#[async_trait]
impl StoreAdapter for StoreAdapterSqlite {
	async fn read_record(
		&self,
		key: &SettingKey,
		path: &TierPath,
	) -> StResult<Option<OverrideRecord>> {
		record::read(&self.db, key, path).await
	}

	async fn list_at_path(&self, path: &TierPath) -> StResult<Vec<OverrideRecord>> {
		record::list_at_path(&self.db, path).await
	}

	async fn list_applicable(
		&self,
		filter: KeyFilter<'_>,
		context: &TierPath,
	) -> StResult<Vec<OverrideRecord>> {
		record::list_applicable(&self.db, filter, context).await
	}

	async fn list_ids_at_tier(&self, tier: TierRank) -> StResult<Vec<Box<str>>> {
		record::list_ids_at_tier(&self.db, tier).await
	}

	async fn upsert_record(&self, record: &OverrideRecord) -> StResult<()> {
		record::upsert(&self.db, record).await
	}

	async fn delete_record(&self, key: &SettingKey, path: &TierPath) -> StResult<bool> {
		record::delete(&self.db, key, path).await
	}

	async fn delete_subtree(&self, prefix: &SettingKey, path: &TierPath) -> StResult<u64> {
		record::delete_subtree(&self.db, prefix, path).await
	}
}

// vim: ts=4
