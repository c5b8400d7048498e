//! Cache objects provided by the core

use std::sync::Arc;
use std::time::Duration;

use super::object::{BreakerPolicy, CacheObject, CachedObject};
use super::registry::CacheFactory;
use crate::app::AppState;
use crate::prelude::*;
use crate::resolve::{EffectiveSetting, Resolver};
use crate::utils::cancellable;
use strata_types::{SettingKey, TierPath};

/// Key of the known-ids cache of a tier
pub fn tier_ids_key(tier_name: &str) -> String {
	format!("tiers/{}/ids", tier_name.to_lowercase())
}

/// One cache per lockable tier listing the concrete ids holding overrides there
pub fn tier_ids_caches(app: &AppState) -> StResult<Vec<Arc<dyn CachedObject>>> {
	let mut caches: Vec<Arc<dyn CachedObject>> = Vec::new();
	for (rank, def) in app.tiers.iter().filter(|(_, def)| def.can_lock) {
		let store = app.store.clone();
		let cache = CacheObject::new(
			tier_ids_key(&def.name),
			Some(app.opts.tier_ids_refresh),
			move |cancel| {
				let store = store.clone();
				async move { cancellable(&cancel, store.known_ids(rank)).await }
			},
		)
		.with_policy(app.opts.breaker);
		caches.push(Arc::new(cache));
	}
	Ok(caches)
}

/// Cache of the resolved settings below `prefix` for one context
pub fn settings_cascade_cache(
	resolver: Arc<Resolver>,
	prefix: SettingKey,
	context: TierPath,
	duration: Option<Duration>,
	policy: BreakerPolicy,
) -> CacheObject<Vec<EffectiveSetting>> {
	let key = format!("settings/{prefix}@{context}");
	CacheObject::new(key, duration, move |cancel| {
		let (resolver, prefix, context) = (resolver.clone(), prefix.clone(), context.clone());
		async move { resolver.get_children(&prefix, &context, &cancel).await }
	})
	.with_policy(policy)
}

/// Factories of the core's cache objects, for registry discovery
pub fn cache_factories() -> Vec<(&'static str, CacheFactory<AppState>)> {
	vec![("tier-ids", tier_ids_caches)]
}

// vim: ts=4
