//! Runs deferred refreshes under the lock and optimistic timestamp guard.

// self
use crate::{
	_prelude::*,
	cache::{
		freshness::Bounds,
		scheduler::{ComputeFn, PendingRefresh},
		timestamp::CreatedAtStore,
	},
	clock::Clock,
	store::{LockHandle, StoreHandle},
};

/// Result of a single deferred refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
	/// A new value and timestamp were committed.
	Refreshed,
	/// The Created-At timestamp changed since scheduling; nothing was written.
	Superseded,
	/// The lock was held elsewhere for the whole wait; nothing was written.
	LockUnavailable,
}

/// Executes refresh tasks and commits computed values.
#[derive(Clone, Debug)]
pub struct RefreshExecutor {
	timestamps: CreatedAtStore,
	clock: Arc<dyn Clock>,
	lock_poll_interval: Duration,
}
impl RefreshExecutor {
	/// Create an executor writing companion records through `timestamps`.
	pub fn new(
		timestamps: CreatedAtStore,
		clock: Arc<dyn Clock>,
		lock_poll_interval: Duration,
	) -> Self {
		Self { timestamps, clock, lock_poll_interval }
	}

	/// Companion record store used for guards and commits.
	pub fn timestamps(&self) -> &CreatedAtStore {
		&self.timestamps
	}

	/// Run `task` to completion.
	///
	/// The lock, when taken, is released on every path before the outcome is returned. A future
	/// dropped mid-refresh leaves the lock to its lease, which is why
	/// [`FlexibleCache::flush`](crate::FlexibleCache::flush) drives each refresh on its own task.
	#[tracing::instrument(
		skip(self, task),
		fields(store = task.store.name(), key = %task.key, created_at = task.created_at)
	)]
	pub async fn execute(&self, task: PendingRefresh) -> Result<RefreshOutcome> {
		let PendingRefresh { key, store, bounds, lock, created_at, compute } = task;
		let handle = match (&lock, store.locks()) {
			(Some(options), Some(locks)) => {
				let name = self.timestamps.lock_name(&key);

				match locks.try_acquire(&name, options, self.lock_poll_interval).await? {
					Some(handle) => Some(handle),
					None => {
						tracing::debug!("lock held elsewhere; skipping refresh");

						return Ok(RefreshOutcome::LockUnavailable);
					},
				}
			},
			(Some(_), None) => {
				tracing::warn!("store has no lock support; refreshing without mutual exclusion");

				None
			},
			(None, _) => None,
		};
		let outcome = self.guarded_refresh(&store, &key, bounds, created_at, compute).await;

		if let Some(handle) = handle {
			self.release(&store, handle).await;
		}

		outcome
	}

	/// Write `bytes` and a Created-At of "now" for `key`, both expiring after the stale bound.
	///
	/// Returns the recorded Created-At.
	pub async fn commit(
		&self,
		store: &StoreHandle,
		key: &str,
		bytes: Vec<u8>,
		bounds: Bounds,
	) -> Result<i64> {
		let created_at = self.clock.timestamp();
		let ttl = bounds.store_ttl();

		store.values().put(key, bytes, ttl).await?;
		self.timestamps.set(store, key, created_at, ttl).await?;

		Ok(created_at)
	}

	async fn guarded_refresh(
		&self,
		store: &StoreHandle,
		key: &str,
		bounds: Bounds,
		created_at: i64,
		compute: ComputeFn,
	) -> Result<RefreshOutcome> {
		let current = self.timestamps.get(store, key).await?;

		if current != Some(created_at) {
			tracing::debug!(?current, "entry rewritten since scheduling; skipping refresh");

			return Ok(RefreshOutcome::Superseded);
		}

		let bytes = compute().await?;

		self.commit(store, key, bytes, bounds).await?;

		Ok(RefreshOutcome::Refreshed)
	}

	async fn release(&self, store: &StoreHandle, handle: LockHandle) {
		let Some(locks) = store.locks() else {
			return;
		};

		match locks.release(handle).await {
			Ok(true) => {},
			Ok(false) => tracing::debug!("lock expired before release"),
			Err(err) => tracing::warn!(error = %err, "failed to release refresh lock"),
		}
	}
}
