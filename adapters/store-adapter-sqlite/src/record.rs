//! Override record queries

use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::utils::{collect_records, db_err, path_to_sql, record_from_row};
use strata_types::prelude::*;
use strata_types::{KeyFilter, OverrideRecord, SettingKey, TierPath, TierRank};

const COLUMNS: &str = "key, path, tier, type, value, locked, modified_at, modified_by";

/// Read a single record by key and exact path
pub(crate) async fn read(
	db: &SqlitePool,
	key: &SettingKey,
	path: &TierPath,
) -> StResult<Option<OverrideRecord>> {
	let row = sqlx::query(&format!("SELECT {COLUMNS} FROM overrides WHERE key = ? AND path = ?"))
		.bind(key.as_str())
		.bind(path_to_sql(path)?)
		.fetch_optional(db)
		.await
		.map_err(db_err)?;

	row.as_ref().map(record_from_row).transpose()
}

/// List every record stored exactly at a path
pub(crate) async fn list_at_path(db: &SqlitePool, path: &TierPath) -> StResult<Vec<OverrideRecord>> {
	let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM overrides WHERE path = ? ORDER BY key"))
		.bind(path_to_sql(path)?)
		.fetch_all(db)
		.await
		.map_err(db_err)?;

	collect_records(&rows)
}

/// The cascade read: one SELECT over every tier up to the context's.
/// Coordinates are matched in Rust, the query only narrows by tier and key.
pub(crate) async fn list_applicable(
	db: &SqlitePool,
	filter: KeyFilter<'_>,
	context: &TierPath,
) -> StResult<Vec<OverrideRecord>> {
	let mut query: QueryBuilder<Sqlite> =
		QueryBuilder::new(format!("SELECT {COLUMNS} FROM overrides WHERE tier <= "));
	query.push_bind(i64::from(context.tier().0));

	match filter {
		KeyFilter::Keys(keys) => {
			if keys.is_empty() {
				return Ok(Vec::new());
			}
			query.push(" AND key IN ");
			push_in(&mut query, keys.iter().map(SettingKey::as_str));
		}
		KeyFilter::Lineage(prefix) => {
			let lineage = prefix.lineage();
			query.push(" AND (key IN ");
			push_in(&mut query, lineage.iter().map(SettingKey::as_str));
			// SQLite counts characters, not bytes
			query.push(" OR substr(key, 1, length(");
			query.push_bind(prefix.as_str().to_owned());
			query.push(") + 1) = ");
			query.push_bind(format!("{}/", prefix));
			query.push(")");
		}
		KeyFilter::All => {}
	}

	let rows = query.build().fetch_all(db).await.map_err(db_err)?;
	Ok(collect_records(&rows)?
		.into_iter()
		.filter(|rec| filter.matches(&rec.key) && rec.path.applies_to(context))
		.collect())
}

/// Build an IN list with parameterized values
fn push_in<'a>(query: &mut QueryBuilder<'_, Sqlite>, values: impl Iterator<Item = &'a str>) {
	query.push("(");
	let mut separated = query.separated(", ");
	for value in values {
		separated.push_bind(value.to_owned());
	}
	separated.push_unseparated(")");
}

/// Distinct concrete coordinates stored at a tier position
pub(crate) async fn list_ids_at_tier(db: &SqlitePool, tier: TierRank) -> StResult<Vec<Box<str>>> {
	let rows = sqlx::query(
		"SELECT DISTINCT json_extract(path, ?) AS id FROM overrides WHERE tier >= ? ORDER BY id",
	)
	.bind(format!("$[{}]", tier.index()))
	.bind(i64::from(tier.0))
	.fetch_all(db)
	.await
	.map_err(db_err)?;

	let mut ids = Vec::with_capacity(rows.len());
	for row in rows {
		let id: Option<String> = row.try_get("id").map_err(db_err)?;
		match id {
			Some(id) if id != strata_types::tier::WILDCARD => ids.push(id.into()),
			_ => {}
		}
	}
	Ok(ids)
}

/// Create or replace a record
pub(crate) async fn upsert(db: &SqlitePool, record: &OverrideRecord) -> StResult<()> {
	sqlx::query(&format!(
		"INSERT OR REPLACE INTO overrides ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
	))
	.bind(record.key.as_str())
	.bind(path_to_sql(&record.path)?)
	.bind(i64::from(record.tier().0))
	.bind(record.type_name())
	.bind(record.value.to_json().to_string())
	.bind(record.locked)
	.bind(record.audit.modified_at.0)
	.bind(&*record.audit.modified_by)
	.execute(db)
	.await
	.map_err(db_err)?;

	Ok(())
}

pub(crate) async fn delete(db: &SqlitePool, key: &SettingKey, path: &TierPath) -> StResult<bool> {
	let res = sqlx::query("DELETE FROM overrides WHERE key = ? AND path = ?")
		.bind(key.as_str())
		.bind(path_to_sql(path)?)
		.execute(db)
		.await
		.map_err(db_err)?;

	Ok(res.rows_affected() > 0)
}

/// Delete a key and all keys below it at one path
pub(crate) async fn delete_subtree(
	db: &SqlitePool,
	prefix: &SettingKey,
	path: &TierPath,
) -> StResult<u64> {
	let res = sqlx::query(
		"DELETE FROM overrides WHERE path = ? AND (key = ? OR substr(key, 1, length(?) + 1) = ? || '/')",
	)
	.bind(path_to_sql(path)?)
	.bind(prefix.as_str())
	.bind(prefix.as_str())
	.bind(prefix.as_str())
	.execute(db)
	.await
	.map_err(db_err)?;

	Ok(res.rows_affected())
}

// vim: ts=4
