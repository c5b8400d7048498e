//! Process-wide directory of named cache objects

use dashmap::{DashMap, mapref::entry::Entry};
use std::any::TypeId;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::object::{CacheObject, CacheStats, CachedObject};
use crate::prelude::*;

/// Instantiates the cache objects of one module from its dependencies
pub type CacheFactory<D> = fn(&D) -> StResult<Vec<Arc<dyn CachedObject>>>;

/// Outcome of a [`CacheRegistry::refresh_expired`] sweep
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
	/// Expired objects found
	pub expired: usize,
	pub refreshed: usize,
	/// Serving a stale value after a failed or skipped refresh
	pub degraded: usize,
	/// Failed without any value to fall back to
	pub failed: usize,
}

#[derive(Default)]
pub struct CacheRegistry {
	entries: DashMap<Box<str>, Arc<dyn CachedObject>>,
}

impl std::fmt::Debug for CacheRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CacheRegistry").field("entries", &self.entries.len()).finish()
	}
}

impl CacheRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register an object under its own key
	pub fn register(&self, object: Arc<dyn CachedObject>) -> StResult<()> {
		let key: Box<str> = object.key().into();
		match self.entries.entry(key) {
			Entry::Occupied(entry) => Err(Error::DuplicateKey(entry.key().clone())),
			Entry::Vacant(entry) => {
				info!(
					"Registered cache '{}' ({}, {:?})",
					entry.key(),
					object.value_type_name(),
					object.duration()
				);
				entry.insert(object);
				Ok(())
			}
		}
	}

	pub fn register_object<T: Send + Sync + 'static>(&self, object: CacheObject<T>) -> StResult<()> {
		self.register(Arc::new(object))
	}

	/// Clone the entry out so no map guard lives across an await
	fn lookup(&self, key: &str) -> Option<Arc<dyn CachedObject>> {
		self.entries.get(key).map(|entry| entry.value().clone())
	}

	/// Current value of `key`, refreshed first when expired.
	///
	/// Unknown keys and a type other than the registered one give `None`.
	pub async fn get<T: Send + Sync + 'static>(
		&self,
		key: &str,
		cancel: &CancellationToken,
	) -> StResult<Option<Arc<T>>> {
		let Some(object) = self.lookup(key) else {
			debug!("Cache '{}' is not registered", key);
			return Ok(None);
		};
		if object.value_type() != TypeId::of::<T>() {
			warn!(
				"Cache '{}' holds {}, requested as {}",
				key,
				object.value_type_name(),
				std::any::type_name::<T>()
			);
			return Ok(None);
		}
		let value = object.get_any(cancel).await?;
		Ok(value.downcast::<T>().ok())
	}

	/// Refresh `key` regardless of expiry
	pub async fn refresh(&self, key: &str, cancel: &CancellationToken) -> StResult<()> {
		let object = self.lookup(key).ok_or_else(|| Error::KeyNotFound(key.into()))?;
		object.refresh(cancel).await
	}

	/// Refresh every expired object concurrently and wait for all of them
	pub async fn refresh_expired(&self, cancel: &CancellationToken) -> SweepReport {
		let expired: Vec<Arc<dyn CachedObject>> = self
			.entries
			.iter()
			.filter(|entry| entry.value().is_expired())
			.map(|entry| entry.value().clone())
			.collect();

		let results = futures::future::join_all(expired.iter().map(|object| async move {
			let res = object.refresh(cancel).await;
			(object, res)
		}))
		.await;

		let mut report = SweepReport { expired: expired.len(), ..SweepReport::default() };
		for (object, res) in results {
			match res {
				Ok(()) if object.stats().consecutive_failures == 0 => report.refreshed += 1,
				Ok(()) => report.degraded += 1,
				Err(err) => {
					debug!("Cache '{}' sweep refresh failed: {}", object.key(), err);
					report.failed += 1;
				}
			}
		}
		if report.expired > 0 {
			info!(
				"Cache sweep: {} expired, {} refreshed, {} degraded, {} failed",
				report.expired, report.refreshed, report.degraded, report.failed
			);
		}
		report
	}

	/// Mark `key` expired, keeping its value
	pub fn invalidate(&self, key: &str) -> bool {
		match self.lookup(key) {
			Some(object) => {
				object.invalidate();
				true
			}
			None => false,
		}
	}

	/// Remove and dispose `key`
	pub fn remove(&self, key: &str) -> bool {
		match self.entries.remove(key) {
			Some((key, object)) => {
				object.dispose();
				info!("Removed cache '{}'", key);
				true
			}
			None => false,
		}
	}

	/// Remove and dispose every entry
	pub fn clear(&self) {
		let mut removed = 0_usize;
		self.entries.retain(|_, object| {
			object.dispose();
			removed += 1;
			false
		});
		info!("Cleared {} cache(s)", removed);
	}

	pub fn contains(&self, key: &str) -> bool {
		self.entries.contains_key(key)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Registered keys, sorted
	pub fn keys(&self) -> Vec<Box<str>> {
		let mut keys: Vec<Box<str>> = self.entries.iter().map(|entry| entry.key().clone()).collect();
		keys.sort();
		keys
	}

	/// Counters of every entry, sorted by key
	pub fn stats(&self) -> Vec<CacheStats> {
		let mut stats: Vec<CacheStats> =
			self.entries.iter().map(|entry| entry.value().stats()).collect();
		stats.sort_by(|a, b| a.key.cmp(&b.key));
		stats
	}

	/// Instantiate and register the objects of every factory.
	///
	/// A failing factory or a duplicate key is logged and skipped.
	/// Returns the number of objects registered.
	pub fn discover<D>(&self, factories: &[(&'static str, CacheFactory<D>)], deps: &D) -> usize {
		let mut registered = 0;
		for (module, factory) in factories {
			let objects = match factory(deps) {
				Ok(objects) => objects,
				Err(err) => {
					warn!("Cache factory '{}' failed, skipping: {}", module, err);
					continue;
				}
			};
			for object in objects {
				match self.register(object) {
					Ok(()) => registered += 1,
					Err(err) => warn!("Cache factory '{}': {}", module, err),
				}
			}
		}
		info!("Discovered {} cache(s) from {} module(s)", registered, factories.len());
		registered
	}
}


// vim: ts=4
