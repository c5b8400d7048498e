//! Self-refreshing cache object
//!
//! A [`CacheObject`] holds the last successfully loaded value of a refresh
//! function. At most one refresh computation runs per object: callers finding
//! the value expired join the in-flight refresh instead of starting another.
//! The computation runs as its own task, so a caller giving up on its wait
//! never cancels it for the others.
//!
//! Failed refreshes keep serving the previous value. After
//! [`BreakerPolicy::threshold`] consecutive failures further attempts are
//! skipped until an exponential backoff window has passed.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::panic::AssertUnwindSafe;
use parking_lot::{Mutex, RwLock};
use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::prelude::*;
use crate::utils::cancellable;

/// Function producing a fresh value. It receives a token cancelled when the
/// owning object is disposed.
pub type RefreshFn<T> =
	Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, StResult<T>> + Send + Sync>;

type Flight<T> = Shared<BoxFuture<'static, StResult<Arc<T>>>>;

/// Value shared through the type-erased [`CachedObject`] interface
pub type AnyValue = Arc<dyn Any + Send + Sync>;

// BreakerPolicy //
//***************//
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BreakerPolicy {
	/// Consecutive failures opening the breaker
	pub threshold: u32,
	/// Backoff when the threshold is first reached
	pub base: Duration,
	pub max_backoff: Duration,
}

impl Default for BreakerPolicy {
	fn default() -> Self {
		Self { threshold: 3, base: Duration::from_secs(1), max_backoff: Duration::from_secs(300) }
	}
}

impl BreakerPolicy {
	/// Backoff window after `failures` consecutive failures, `None` while closed
	pub fn backoff(&self, failures: u32) -> Option<Duration> {
		if failures < self.threshold {
			return None;
		}
		let exp = (failures - self.threshold).min(31);
		let factor = 1_u32.checked_shl(exp).unwrap_or(u32::MAX);
		Some(self.base.saturating_mul(factor).min(self.max_backoff))
	}
}

/// Point-in-time counters of a cache object
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
	pub key: Box<str>,
	pub loaded: bool,
	pub expired: bool,
	pub hits: u64,
	pub refreshes: u64,
	pub failures: u64,
	pub skipped: u64,
	pub consecutive_failures: u32,
	pub backoff_remaining: Option<Duration>,
}

// Inner state //
//*************//
struct Inner<T> {
	key: Box<str>,
	duration: Option<Duration>,
	policy: BreakerPolicy,
	factory: RefreshFn<T>,
	value: RwLock<Option<Arc<T>>>,
	origin: Instant,
	/// Milliseconds since `origin` plus one, zero while nothing was loaded
	refreshed_at: AtomicU64,
	/// Milliseconds since `origin` until which refreshes are skipped
	open_until: AtomicU64,
	/// Bumped by every invalidation
	generation: AtomicU64,
	/// Generation observed when the current value's refresh started
	fresh_generation: AtomicU64,
	consecutive_failures: AtomicU32,
	hits: AtomicU64,
	refreshes: AtomicU64,
	failures: AtomicU64,
	skipped: AtomicU64,
	in_flight: Mutex<Option<Flight<T>>>,
	refresh_lock: tokio::sync::Mutex<()>,
	dispose: CancellationToken,
}

impl<T: Send + Sync + 'static> Inner<T> {
	fn now_ms(&self) -> u64 {
		u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
	}

	fn value(&self) -> Option<Arc<T>> {
		self.value.read().clone()
	}

	fn is_expired(&self) -> bool {
		let at = self.refreshed_at.load(Ordering::Acquire);
		if at == 0
			|| self.generation.load(Ordering::Acquire) != self.fresh_generation.load(Ordering::Acquire)
		{
			return true;
		}
		match self.duration {
			None => false,
			Some(duration) => {
				let age = (self.now_ms() + 1).saturating_sub(at);
				u128::from(age) > duration.as_millis()
			}
		}
	}

	fn breaker_wait(&self) -> Option<Duration> {
		let until = self.open_until.load(Ordering::Acquire);
		let now = self.now_ms();
		(until > now).then(|| Duration::from_millis(until - now))
	}

	async fn run_refresh(self: Arc<Self>) -> StResult<Arc<T>> {
		let _slot = ClearInFlight(&self.in_flight);
		let _guard = self.refresh_lock.lock().await;
		let generation = self.generation.load(Ordering::Acquire);
		let token = self.dispose.child_token();
		let load = AssertUnwindSafe(async { (self.factory)(token.clone()).await })
			.catch_unwind()
			.map(|res| {
				res.unwrap_or_else(|payload| {
					Err(Error::Internal(format!("refresh panicked: {}", panic_message(&*payload))))
				})
			});
		let res = cancellable(&token, load).await;
		self.apply(res, generation)
	}

	fn apply(&self, res: StResult<T>, generation: u64) -> StResult<Arc<T>> {
		self.refreshes.fetch_add(1, Ordering::Relaxed);
		match res {
			Ok(value) => {
				let value = Arc::new(value);
				*self.value.write() = Some(value.clone());
				self.refreshed_at.store(self.now_ms() + 1, Ordering::Release);
				self.fresh_generation.store(generation, Ordering::Release);
				self.consecutive_failures.store(0, Ordering::Release);
				self.open_until.store(0, Ordering::Release);
				debug!("Cache '{}' refreshed", self.key);
				Ok(value)
			}
			Err(Error::Cancelled) => {
				debug!("Cache '{}' refresh cancelled", self.key);
				Err(Error::Cancelled)
			}
			Err(err) => {
				self.failures.fetch_add(1, Ordering::Relaxed);
				let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
				if let Some(backoff) = self.policy.backoff(failures) {
					let backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
					self.open_until.store(self.now_ms().saturating_add(backoff_ms), Ordering::Release);
					warn!(
						"Cache '{}' refresh failed ({} in a row), backing off {:?}: {}",
						self.key, failures, backoff, err
					);
				} else {
					warn!("Cache '{}' refresh failed ({} in a row): {}", self.key, failures, err);
				}
				Err(err)
			}
		}
	}
}

/// Empties the in-flight slot when the refresh ends, however it ends
struct ClearInFlight<'a, T>(&'a Mutex<Option<Flight<T>>>);

impl<T> Drop for ClearInFlight<'_, T> {
	fn drop(&mut self) {
		self.0.lock().take();
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		msg
	} else if let Some(msg) = payload.downcast_ref::<String>() {
		msg
	} else {
		"unknown panic"
	}
}

// CacheObject //
//*************//
/// Cheaply clonable handle to a self-refreshing value
pub struct CacheObject<T> {
	inner: Arc<Inner<T>>,
}

impl<T> Clone for CacheObject<T> {
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}

impl<T> fmt::Debug for CacheObject<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CacheObject")
			.field("key", &self.inner.key)
			.field("duration", &self.inner.duration)
			.field("type", &type_name::<T>())
			.finish_non_exhaustive()
	}
}

impl<T: Send + Sync + 'static> CacheObject<T> {
	/// Create an empty object. A `duration` of `None` never expires: the value
	/// is only reloaded on explicit refresh or invalidation.
	pub fn new<F, Fut>(key: impl Into<Box<str>>, duration: Option<Duration>, factory: F) -> Self
	where
		F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = StResult<T>> + Send + 'static,
	{
		let factory: RefreshFn<T> = Arc::new(move |cancel| factory(cancel).boxed());
		Self {
			inner: Arc::new(Inner {
				key: key.into(),
				duration,
				policy: BreakerPolicy::default(),
				factory,
				value: RwLock::new(None),
				origin: Instant::now(),
				refreshed_at: AtomicU64::new(0),
				open_until: AtomicU64::new(0),
				generation: AtomicU64::new(0),
				fresh_generation: AtomicU64::new(0),
				consecutive_failures: AtomicU32::new(0),
				hits: AtomicU64::new(0),
				refreshes: AtomicU64::new(0),
				failures: AtomicU64::new(0),
				skipped: AtomicU64::new(0),
				in_flight: Mutex::new(None),
				refresh_lock: tokio::sync::Mutex::new(()),
				dispose: CancellationToken::new(),
			}),
		}
	}

	/// Replace the breaker policy. Only valid before the handle is shared.
	#[must_use]
	pub fn with_policy(mut self, policy: BreakerPolicy) -> Self {
		if let Some(inner) = Arc::get_mut(&mut self.inner) {
			inner.policy = policy;
		} else {
			warn!("Cache '{}' is already shared, breaker policy not changed", self.inner.key);
		}
		self
	}

	pub fn key(&self) -> &str {
		&self.inner.key
	}

	pub fn duration(&self) -> Option<Duration> {
		self.inner.duration
	}

	/// Last successfully loaded value, possibly stale
	pub fn value(&self) -> Option<Arc<T>> {
		self.inner.value()
	}

	pub fn is_expired(&self) -> bool {
		self.inner.is_expired()
	}

	/// Instant of the last successful refresh
	pub fn last_refreshed(&self) -> Option<Instant> {
		match self.inner.refreshed_at.load(Ordering::Acquire) {
			0 => None,
			at => Some(self.inner.origin + Duration::from_millis(at - 1)),
		}
	}

	pub fn consecutive_failures(&self) -> u32 {
		self.inner.consecutive_failures.load(Ordering::Acquire)
	}

	pub fn stats(&self) -> CacheStats {
		let inner = &self.inner;
		CacheStats {
			key: inner.key.clone(),
			loaded: inner.refreshed_at.load(Ordering::Acquire) != 0,
			expired: inner.is_expired(),
			hits: inner.hits.load(Ordering::Relaxed),
			refreshes: inner.refreshes.load(Ordering::Relaxed),
			failures: inner.failures.load(Ordering::Relaxed),
			skipped: inner.skipped.load(Ordering::Relaxed),
			consecutive_failures: inner.consecutive_failures.load(Ordering::Acquire),
			backoff_remaining: inner.breaker_wait(),
		}
	}

	/// Mark the value expired without dropping it
	pub fn invalidate(&self) {
		self.inner.generation.fetch_add(1, Ordering::AcqRel);
	}

	/// Cancel any in-flight refresh and release the value
	pub fn dispose(&self) {
		self.inner.dispose.cancel();
		*self.inner.value.write() = None;
		self.inner.refreshed_at.store(0, Ordering::Release);
	}

	/// Current value, refreshing first when expired
	pub async fn get(&self, cancel: &CancellationToken) -> StResult<Arc<T>> {
		match self.inner.value() {
			Some(value) if !self.inner.is_expired() => {
				self.inner.hits.fetch_add(1, Ordering::Relaxed);
				Ok(value)
			}
			_ => self.refresh(cancel).await,
		}
	}

	/// Refresh regardless of expiry, joining a refresh already in flight.
	///
	/// Failures and cancellation fall back to the previous value when there is
	/// one; otherwise the error is returned.
	pub async fn refresh(&self, cancel: &CancellationToken) -> StResult<Arc<T>> {
		let flight = match self.join_or_start() {
			Ok(flight) => flight,
			Err(wait) => {
				self.inner.skipped.fetch_add(1, Ordering::Relaxed);
				debug!("Cache '{}' breaker open for {:?}, refresh skipped", self.inner.key, wait);
				return self.inner.value().ok_or_else(|| {
					Error::BackendUnavailable(format!(
						"cache '{}' backing off for another {}ms",
						self.inner.key,
						wait.as_millis()
					))
				});
			}
		};

		match cancellable(cancel, flight).await {
			Ok(value) => Ok(value),
			Err(err) => match self.inner.value() {
				Some(stale) => {
					debug!("Cache '{}' serving stale value: {}", self.inner.key, err);
					Ok(stale)
				}
				None => Err(err),
			},
		}
	}

	fn join_or_start(&self) -> Result<Flight<T>, Duration> {
		let mut slot = self.inner.in_flight.lock();
		if let Some(flight) = slot.as_ref() {
			debug!("Cache '{}' joining in-flight refresh", self.inner.key);
			return Ok(flight.clone());
		}
		if let Some(wait) = self.inner.breaker_wait() {
			return Err(wait);
		}

		let handle = tokio::spawn(self.inner.clone().run_refresh());
		let inner = self.inner.clone();
		let flight = async move {
			handle.await.unwrap_or_else(|err| {
				// The generation is unused on failure
				inner.apply(Err(Error::Internal(format!("cache refresh task failed: {err}"))), 0)
			})
		}
		.boxed()
		.shared();
		*slot = Some(flight.clone());
		Ok(flight)
	}
}

// CachedObject //
//**************//
/// Type-erased view of a [`CacheObject`] as stored in the registry
#[async_trait]
pub trait CachedObject: Send + Sync + 'static {
	fn key(&self) -> &str;
	fn duration(&self) -> Option<Duration>;
	fn is_expired(&self) -> bool;
	fn value_type(&self) -> TypeId;
	fn value_type_name(&self) -> &'static str;
	fn stats(&self) -> CacheStats;
	fn invalidate(&self);
	fn dispose(&self);
	async fn refresh(&self, cancel: &CancellationToken) -> StResult<()>;
	async fn get_any(&self, cancel: &CancellationToken) -> StResult<AnyValue>;
}

#[async_trait]
impl<T: Send + Sync + 'static> CachedObject for CacheObject<T> {
	fn key(&self) -> &str {
		CacheObject::key(self)
	}

	fn duration(&self) -> Option<Duration> {
		CacheObject::duration(self)
	}

	fn is_expired(&self) -> bool {
		CacheObject::is_expired(self)
	}

	fn value_type(&self) -> TypeId {
		TypeId::of::<T>()
	}

	fn value_type_name(&self) -> &'static str {
		type_name::<T>()
	}

	fn stats(&self) -> CacheStats {
		CacheObject::stats(self)
	}

	fn invalidate(&self) {
		CacheObject::invalidate(self);
	}

	fn dispose(&self) {
		CacheObject::dispose(self);
	}

	async fn refresh(&self, cancel: &CancellationToken) -> StResult<()> {
		CacheObject::refresh(self, cancel).await.map(|_| ())
	}

	async fn get_any(&self, cancel: &CancellationToken) -> StResult<AnyValue> {
		let value: AnyValue = CacheObject::get(self, cancel).await?;
		Ok(value)
	}
}


// vim: ts=4
