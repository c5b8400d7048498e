use std::{env, path::PathBuf, sync::Arc, time::Duration};

use strata::AppBuilder;
use strata::prelude::*;
use strata::tier::Tiers;
use strata_store_adapter_sqlite::StoreAdapterSqlite;

mod settings;

pub struct Config {
	pub db_path: PathBuf,
	pub tiers: Option<Tiers>,
	pub sweep_interval: Option<Duration>,
}

impl Config {
	fn from_env() -> StResult<Self> {
		let db_path =
			PathBuf::from(env::var("STRATA_DB").unwrap_or_else(|_| "./data/strata.db".to_string()));
		let tiers = env::var("STRATA_TIERS").ok().map(|list| Tiers::parse(&list)).transpose()?;
		let sweep_interval = env::var("STRATA_SWEEP_SECS")
			.ok()
			.map(|secs| {
				secs.parse::<u64>().map(Duration::from_secs).map_err(|_| {
					Error::ConfigError(format!("STRATA_SWEEP_SECS is not a number: '{}'", secs))
				})
			})
			.transpose()?;
		Ok(Self { db_path, tiers, sweep_interval })
	}
}

#[tokio::main]
async fn main() -> StResult<()> {
	let config = Config::from_env()?;

	if let Some(dir) = config.db_path.parent() {
		tokio::fs::create_dir_all(dir)
			.await
			.map_err(|err| Error::ConfigError(format!("Cannot create {}: {}", dir.display(), err)))?;
	}

	let mut builder = AppBuilder::new();
	let store_adapter = Arc::new(StoreAdapterSqlite::new(&config.db_path).await?);
	builder.store_adapter(store_adapter).settings(settings::register_settings);
	if let Some(tiers) = config.tiers {
		builder.tiers(tiers);
	}
	if let Some(interval) = config.sweep_interval {
		builder.sweep_interval(interval);
	}

	builder.run().await
}

// vim: ts=4
