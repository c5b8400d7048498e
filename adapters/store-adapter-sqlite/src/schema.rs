//! Database schema initialization
//!
//! Creates the override table and its indexes, and records the schema version
//! so later versions can migrate in place.

use sqlx::SqlitePool;

pub(crate) const SCHEMA_VERSION: &str = "1";

/// Initialize the database schema with all required tables and indexes
pub(crate) async fn init_db(db: &SqlitePool) -> Result<(), sqlx::Error> {
	let mut tx = db.begin().await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS globals (
			key text NOT NULL,
			value text,
			PRIMARY KEY(key)
	)",
	)
	.execute(&mut *tx)
	.await?;

	// Overrides
	//***********
	// path is the JSON array of tier coordinates, tier its length minus one
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS overrides (
		key text NOT NULL,
		path text NOT NULL,
		tier integer NOT NULL,
		type text NOT NULL,
		value text NOT NULL,
		locked boolean NOT NULL DEFAULT 0,
		modified_at integer NOT NULL,
		modified_by text NOT NULL,
		PRIMARY KEY(key, path)
	)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query("CREATE INDEX IF NOT EXISTS idx_overrides_tier_key ON overrides(tier, key)")
		.execute(&mut *tx)
		.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_overrides_path ON overrides(path)")
		.execute(&mut *tx)
		.await?;

	sqlx::query("INSERT OR IGNORE INTO globals (key, value) VALUES ('schema_version', ?)")
		.bind(SCHEMA_VERSION)
		.execute(&mut *tx)
		.await?;

	tx.commit().await?;
	Ok(())
}

// vim: ts=4
