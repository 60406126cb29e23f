//! Deduplicating queue of deferred refreshes.

// std
use std::{
	collections::{HashSet, VecDeque},
	fmt::{Debug, Formatter, Result as FmtResult},
	future::Future,
	pin::Pin,
};
// crates.io
use tokio::sync::Mutex;
// self
use crate::{
	_prelude::*,
	cache::freshness::Bounds,
	store::{LockOptions, StoreHandle},
};

/// Boxed future yielding a serialised value.
pub type ComputeFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send>>;
/// Deferred compute function producing a serialised value.
pub type ComputeFn = Box<dyn FnOnce() -> ComputeFuture + Send>;

/// A refresh waiting for the next flush.
pub struct PendingRefresh {
	/// Cache key to refresh.
	pub key: String,
	/// Store selected when the refresh was scheduled.
	pub store: StoreHandle,
	/// Window resolved when the refresh was scheduled.
	pub bounds: Bounds,
	/// Lock discipline for the refresh, if any.
	pub lock: Option<LockOptions>,
	/// Created-At timestamp observed when the refresh was scheduled.
	pub created_at: i64,
	/// Producer of the replacement value.
	pub compute: ComputeFn,
}
impl Debug for PendingRefresh {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("PendingRefresh")
			.field("key", &self.key)
			.field("store", &self.store.name())
			.field("bounds", &self.bounds)
			.field("lock", &self.lock)
			.field("created_at", &self.created_at)
			.finish_non_exhaustive()
	}
}

/// Insertion-ordered set of pending refreshes, at most one per cache key.
#[derive(Debug, Default)]
pub struct RefreshScheduler {
	pending: Mutex<PendingSet>,
}
impl RefreshScheduler {
	/// Create an empty scheduler.
	pub fn new() -> Self {
		Self::default()
	}

	/// Queue `task` unless a refresh for the same key is already pending.
	///
	/// Returns whether the task was accepted; the first task for a key wins until it is popped.
	pub async fn schedule(&self, task: PendingRefresh) -> bool {
		let mut pending = self.pending.lock().await;

		if !pending.keys.insert(task.key.clone()) {
			return false;
		}

		pending.tasks.push_back(task);

		true
	}

	/// Remove the oldest pending task, freeing its key for new schedules.
	///
	/// Tasks not yet popped stay pending, so an interrupted flush loses nothing.
	pub async fn pop(&self) -> Option<PendingRefresh> {
		let mut pending = self.pending.lock().await;
		let task = pending.tasks.pop_front()?;

		pending.keys.remove(&task.key);

		Some(task)
	}

	/// Number of pending tasks.
	pub async fn len(&self) -> usize {
		self.pending.lock().await.tasks.len()
	}

	/// Whether nothing is pending.
	pub async fn is_empty(&self) -> bool {
		self.len().await == 0
	}
}

/// Outcome counts of a flush.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
	/// Refreshes that committed a new value.
	pub refreshed: usize,
	/// Refreshes abandoned because another writer got there first.
	pub superseded: usize,
	/// Refreshes abandoned because the lock could not be taken in time.
	pub lock_unavailable: usize,
	/// Refreshes that failed.
	pub failed: usize,
}
impl FlushReport {
	/// Total tasks processed.
	pub fn total(&self) -> usize {
		self.refreshed + self.superseded + self.lock_unavailable + self.failed
	}
}

#[derive(Default)]
struct PendingSet {
	keys: HashSet<String>,
	tasks: VecDeque<PendingRefresh>,
}
impl Debug for PendingSet {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_list().entries(self.tasks.iter().map(|task| &task.key)).finish()
	}
}
