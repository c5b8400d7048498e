//! Shared utilities for SQLite adapter
//!
//! Error mapping and row decoding used by the record queries.

use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use strata_types::prelude::*;
use strata_types::types::AuditInfo;
use strata_types::{OverrideRecord, SettingKey, SettingValue, TierPath};

/// Log database error for debugging
pub(crate) fn inspect(err: &sqlx::Error) {
	warn!("DB: {:#?}", err);
}

/// Translate a SQL error; connection problems are transient
pub(crate) fn db_err(err: sqlx::Error) -> Error {
	inspect(&err);
	match &err {
		sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
			Error::BackendUnavailable(err.to_string())
		}
		_ => Error::DbError(err.to_string()),
	}
}

/// Serialized form of a tier path as stored in the `path` column
pub(crate) fn path_to_sql(path: &TierPath) -> StResult<String> {
	Ok(serde_json::to_string(path)?)
}

pub(crate) fn record_from_row(row: &SqliteRow) -> StResult<OverrideRecord> {
	let key: String = row.try_get("key").map_err(db_err)?;
	let path: String = row.try_get("path").map_err(db_err)?;
	let type_name: String = row.try_get("type").map_err(db_err)?;
	let value: String = row.try_get("value").map_err(db_err)?;
	let locked: bool = row.try_get("locked").map_err(db_err)?;
	let modified_at: i64 = row.try_get("modified_at").map_err(db_err)?;
	let modified_by: String = row.try_get("modified_by").map_err(db_err)?;

	let path: Vec<String> = serde_json::from_str(&path)?;
	Ok(OverrideRecord {
		key: SettingKey::new(&key)?,
		path: TierPath::from_strings(&path)?,
		value: SettingValue::from_typed(&type_name, serde_json::from_str(&value)?)?,
		locked,
		audit: AuditInfo { modified_at: Timestamp(modified_at), modified_by: modified_by.into() },
	})
}

/// Decode every row, failing on the first malformed one
pub(crate) fn collect_records(rows: &[SqliteRow]) -> StResult<Vec<OverrideRecord>> {
	rows.iter()
		.map(|row| {
			record_from_row(row).inspect_err(|err| warn!("DB: malformed override row: {}", err))
		})
		.collect()
}

// vim: ts=4
