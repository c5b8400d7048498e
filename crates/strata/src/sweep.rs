//! Background refresh of expired caches

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::prelude::*;

/// Refresh expired caches every `sweep_interval` until the app shuts down.
/// The first sweep runs immediately and warms every registered cache.
pub fn spawn_sweeper(app: App) -> JoinHandle<()> {
	tokio::spawn(async move {
		// A zero period would make `interval` panic
		let period = app.opts.sweep_interval.max(Duration::from_millis(1));
		let mut interval = tokio::time::interval(period);
		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
		info!("Cache sweeper started (every {:?})", app.opts.sweep_interval);

		loop {
			tokio::select! {
				() = app.cancel.cancelled() => break,
				_ = interval.tick() => {
					let report = app.caches.refresh_expired(&app.cancel).await;
					if report.failed > 0 {
						warn!(
							"Cache sweep: {} of {} expired cache(s) have no value yet",
							report.failed, report.expired
						);
					}
				}
			}
		}
		info!("Cache sweeper stopped");
	})
}

// vim: ts=4
