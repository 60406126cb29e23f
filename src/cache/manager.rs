//! Cache manager orchestrating flexible reads, deferred refresh, and flushing.

// std
use std::{future::Future, sync::OnceLock};
// crates.io
use serde::{Serialize, de::DeserializeOwned};
use tokio::{
	task::JoinHandle,
	time::{self, MissedTickBehavior},
};
use tracing::Instrument;
// self
use crate::{
	_prelude::*,
	cache::{
		executor::{RefreshExecutor, RefreshOutcome},
		freshness::{self, Freshness, Window},
		scheduler::{ComputeFn, ComputeFuture, FlushReport, PendingRefresh, RefreshScheduler},
		timestamp::CreatedAtStore,
	},
	clock::{Clock, SystemClock},
	error::RefreshFailure,
	metrics::{CacheMetrics, CacheMetricsSnapshot, ReadKind, RefreshStatus},
	registry::{FlexibleCacheBuilder, StoreRegistry},
	store::{DEFAULT_LOCK_POLL_INTERVAL, LockOptions, StoreHandle},
};

static GLOBAL: OnceLock<FlexibleCache> = OnceLock::new();

/// Stale-while-revalidate front end over one or more named stores.
///
/// Clones share the same stores, scheduler, and metrics.
#[derive(Clone, Debug)]
pub struct FlexibleCache {
	inner: Arc<CacheInner>,
}
impl FlexibleCache {
	/// Cache with a single in-memory store driven by the system clock.
	pub fn new() -> Self {
		let clock: Arc<dyn Clock> = Arc::new(SystemClock);
		let executor = RefreshExecutor::new(
			CreatedAtStore::default(),
			clock.clone(),
			DEFAULT_LOCK_POLL_INTERVAL,
		);

		Self::from_parts(StoreRegistry::memory(clock.clone()), clock, executor)
	}

	/// Create a [`FlexibleCacheBuilder`] for advanced configuration.
	pub fn builder() -> FlexibleCacheBuilder {
		FlexibleCacheBuilder::new()
	}

	/// Process-wide instance, created with defaults on first use unless installed earlier.
	pub fn global() -> &'static FlexibleCache {
		GLOBAL.get_or_init(FlexibleCache::new)
	}

	/// Install `cache` as the process-wide instance; returns false when one already exists.
	pub fn install_global(cache: FlexibleCache) -> bool {
		GLOBAL.set(cache).is_ok()
	}

	pub(crate) fn from_parts(
		stores: StoreRegistry,
		clock: Arc<dyn Clock>,
		executor: RefreshExecutor,
	) -> Self {
		Self {
			inner: Arc::new(CacheInner {
				stores,
				clock,
				executor,
				scheduler: RefreshScheduler::new(),
				metrics: CacheMetrics::new(),
			}),
		}
	}

	/// Select a store for the next call; `None` selects the default store.
	///
	/// The selection lives only as long as the returned scope, which each call consumes.
	pub fn store(&self, name: Option<&str>) -> Result<StoreScope<'_>> {
		Ok(StoreScope { cache: self, store: self.inner.stores.resolve(name)? })
	}

	/// Names of every configured store.
	pub fn store_names(&self) -> Vec<&str> {
		self.inner.stores.names()
	}

	/// Read `key` from the default store, computing or scheduling a refresh as its age demands.
	pub async fn flexible<T, F, Fut, E>(
		&self,
		key: &str,
		window: impl Into<Window>,
		compute: F,
	) -> Result<T>
	where
		T: 'static + Send + Serialize + DeserializeOwned,
		F: 'static + Send + FnOnce() -> Fut,
		Fut: 'static + Send + Future<Output = std::result::Result<T, E>>,
		E: Into<BoxError>,
	{
		self.resolve(self.inner.stores.default_store(), key, window.into(), None, compute).await
	}

	/// Like [`FlexibleCache::flexible`], taking the per-key lock around deferred refreshes.
	pub async fn flexible_locked<T, F, Fut, E>(
		&self,
		key: &str,
		window: impl Into<Window>,
		lock: LockOptions,
		compute: F,
	) -> Result<T>
	where
		T: 'static + Send + Serialize + DeserializeOwned,
		F: 'static + Send + FnOnce() -> Fut,
		Fut: 'static + Send + Future<Output = std::result::Result<T, E>>,
		E: Into<BoxError>,
	{
		self.resolve(self.inner.stores.default_store(), key, window.into(), Some(lock), compute)
			.await
	}

	/// Remove `key` and its Created-At record from the default store.
	pub async fn forget(&self, key: &str) -> Result<bool> {
		self.forget_in(&self.inner.stores.default_store(), key).await
	}

	/// Run every refresh pending when the flush starts, in schedule order.
	///
	/// All tasks run even when some fail; failures are returned together afterwards. Each task
	/// runs on its own runtime task, so dropping the flush lets the in-flight refresh finish and
	/// release its lock while the tasks not yet started stay pending.
	#[tracing::instrument(skip(self))]
	pub async fn flush(&self) -> Result<FlushReport> {
		let due = self.inner.scheduler.len().await;
		let mut report = FlushReport::default();
		let mut failures = Vec::new();

		for _ in 0..due {
			let Some(task) = self.inner.scheduler.pop().await else {
				break;
			};
			let key = task.key.clone();
			let store = task.store.name().to_owned();
			let executor = self.inner.executor.clone();
			let started = Instant::now();
			let refresh = async move { executor.execute(task).await };
			let outcome = tokio::spawn(refresh.in_current_span())
				.await
				.map_err(Error::from)
				.and_then(|outcome| outcome);
			let status = match outcome {
				Ok(RefreshOutcome::Refreshed) => {
					report.refreshed += 1;

					RefreshStatus::Success
				},
				Ok(RefreshOutcome::Superseded) => {
					report.superseded += 1;

					RefreshStatus::Superseded
				},
				Ok(RefreshOutcome::LockUnavailable) => {
					report.lock_unavailable += 1;

					RefreshStatus::LockUnavailable
				},
				Err(error) => {
					tracing::warn!(
						store = %store,
						key = %key,
						error = %error,
						"deferred refresh failed"
					);

					report.failed += 1;
					failures.push(RefreshFailure { key, store: store.clone(), error });

					RefreshStatus::Error
				},
			};

			self.inner.metrics.record_refresh(&store, status, started.elapsed());
		}

		if failures.is_empty() {
			Ok(report)
		} else {
			Err(Error::RefreshFailed { failures, report })
		}
	}

	/// Number of refreshes waiting for the next flush.
	pub async fn pending(&self) -> usize {
		self.inner.scheduler.len().await
	}

	/// Flush on a fixed period from a background task until the handle is aborted.
	///
	/// A zero `period` is rejected.
	pub fn spawn_flush_interval(&self, period: Duration) -> Result<JoinHandle<()>> {
		if period.is_zero() {
			return Err(Error::Validation {
				field: "period",
				reason: "Must be greater than zero.".into(),
			});
		}

		let cache = self.clone();

		Ok(tokio::spawn(async move {
			let mut ticker = time::interval(period);

			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

			loop {
				ticker.tick().await;

				if let Err(err) = cache.flush().await {
					tracing::warn!(error = %err, "periodic flush reported failures");
				}
			}
		}))
	}

	/// Point-in-time telemetry counters.
	pub fn metrics(&self) -> CacheMetricsSnapshot {
		self.inner.metrics.snapshot()
	}

	#[tracing::instrument(
		skip(self, store, window, lock, compute),
		fields(store = store.name())
	)]
	async fn resolve<T, F, Fut, E>(
		&self,
		store: StoreHandle,
		key: &str,
		window: Window,
		lock: Option<LockOptions>,
		compute: F,
	) -> Result<T>
	where
		T: 'static + Send + Serialize + DeserializeOwned,
		F: 'static + Send + FnOnce() -> Fut,
		Fut: 'static + Send + Future<Output = std::result::Result<T, E>>,
		E: Into<BoxError>,
	{
		let now = self.inner.clock.now();
		let bounds = window.bounds(now);
		let stored = store.values().get(key).await?;
		let created_at = self.inner.executor.timestamps().get(&store, key).await?;
		let value = stored.and_then(|bytes| decode::<T>(&store, key, &bytes));
		let record = match (value, created_at) {
			(Some(value), Some(created_at)) => Some((value, created_at)),
			_ => None,
		};

		if let Some((value, created_at)) = record {
			match freshness::evaluate(now.timestamp(), Some(created_at), bounds) {
				Freshness::Fresh => {
					tracing::debug!("serving fresh value");

					self.inner.metrics.record_read(store.name(), ReadKind::Fresh);

					return Ok(value);
				},
				Freshness::Stale => {
					let store_name = store.name().to_owned();
					let accepted = self
						.inner
						.scheduler
						.schedule(PendingRefresh {
							key: key.to_owned(),
							store,
							bounds,
							lock,
							created_at,
							compute: deferred(key, compute),
						})
						.await;

					tracing::debug!(accepted, "serving stale value; refresh deferred");

					self.inner.metrics.record_read(&store_name, ReadKind::Stale);
					self.inner.metrics.record_schedule(&store_name, accepted);

					return Ok(value);
				},
				Freshness::Expired | Freshness::Missing => {
					tracing::debug!("value expired; recomputing");
				},
			}
		} else {
			tracing::debug!(has_created_at = created_at.is_some(), "no complete record; computing");
		}

		self.inner.metrics.record_read(store.name(), ReadKind::Miss);

		let value = compute().await.map_err(|err| Error::compute(key, err))?;

		self.inner.executor.commit(&store, key, serde_json::to_vec(&value)?, bounds).await?;

		Ok(value)
	}

	async fn forget_in(&self, store: &StoreHandle, key: &str) -> Result<bool> {
		let removed = store.values().forget(key).await?;

		self.inner.executor.timestamps().forget(store, key).await?;

		Ok(removed)
	}
}
impl Default for FlexibleCache {
	fn default() -> Self {
		Self::new()
	}
}

/// A [`FlexibleCache`] bound to one store for a single call.
#[derive(Debug)]
pub struct StoreScope<'a> {
	cache: &'a FlexibleCache,
	store: StoreHandle,
}
impl StoreScope<'_> {
	/// Name of the selected store.
	pub fn name(&self) -> &str {
		self.store.name()
	}

	/// [`FlexibleCache::flexible`] against the selected store.
	pub async fn flexible<T, F, Fut, E>(
		self,
		key: &str,
		window: impl Into<Window>,
		compute: F,
	) -> Result<T>
	where
		T: 'static + Send + Serialize + DeserializeOwned,
		F: 'static + Send + FnOnce() -> Fut,
		Fut: 'static + Send + Future<Output = std::result::Result<T, E>>,
		E: Into<BoxError>,
	{
		self.cache.resolve(self.store, key, window.into(), None, compute).await
	}

	/// [`FlexibleCache::flexible_locked`] against the selected store.
	pub async fn flexible_locked<T, F, Fut, E>(
		self,
		key: &str,
		window: impl Into<Window>,
		lock: LockOptions,
		compute: F,
	) -> Result<T>
	where
		T: 'static + Send + Serialize + DeserializeOwned,
		F: 'static + Send + FnOnce() -> Fut,
		Fut: 'static + Send + Future<Output = std::result::Result<T, E>>,
		E: Into<BoxError>,
	{
		self.cache.resolve(self.store, key, window.into(), Some(lock), compute).await
	}

	/// [`FlexibleCache::forget`] against the selected store.
	pub async fn forget(self, key: &str) -> Result<bool> {
		self.cache.forget_in(&self.store, key).await
	}
}

#[derive(Debug)]
struct CacheInner {
	stores: StoreRegistry,
	clock: Arc<dyn Clock>,
	executor: RefreshExecutor,
	scheduler: RefreshScheduler,
	metrics: Arc<CacheMetrics>,
}

fn deferred<T, F, Fut, E>(key: &str, compute: F) -> ComputeFn
where
	T: 'static + Send + Serialize,
	F: 'static + Send + FnOnce() -> Fut,
	Fut: 'static + Send + Future<Output = std::result::Result<T, E>>,
	E: Into<BoxError>,
{
	let key = key.to_owned();

	Box::new(move || -> ComputeFuture {
		Box::pin(async move {
			let value = compute().await.map_err(|err| Error::compute(key, err))?;

			Ok(serde_json::to_vec(&value)?)
		})
	})
}

fn decode<T>(store: &StoreHandle, key: &str, bytes: &[u8]) -> Option<T>
where
	T: DeserializeOwned,
{
	match serde_json::from_slice(bytes) {
		Ok(value) => Some(value),
		Err(err) => {
			tracing::warn!(store = store.name(), key, error = %err, "discarding undecodable value");

			None
		},
	}
}
