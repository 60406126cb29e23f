//! In-process backend whose expiry follows an injected [`Clock`].

// std
use std::collections::HashMap;
// crates.io
use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	store::{DistributedLock, LockHandle, ValueStore},
};

/// Values and locks held in process memory.
///
/// Value expiry is measured with the injected clock so tests can travel in time; lock leases use
/// the monotonic runtime clock.
#[derive(Debug)]
pub struct MemoryStore {
	clock: Arc<dyn Clock>,
	values: RwLock<HashMap<String, MemoryEntry>>,
	locks: Mutex<HashMap<String, MemoryLock>>,
}
impl MemoryStore {
	/// Create an empty store driven by `clock`.
	pub fn new(clock: Arc<dyn Clock>) -> Self {
		Self { clock, values: RwLock::new(HashMap::new()), locks: Mutex::new(HashMap::new()) }
	}

	/// Create an empty store driven by the system clock.
	pub fn system() -> Self {
		Self::new(Arc::new(SystemClock))
	}

	/// Drop every value and lock.
	pub async fn clear(&self) {
		self.values.write().await.clear();
		self.locks.lock().await.clear();
	}
}
#[async_trait]
impl ValueStore for MemoryStore {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
		let now = self.clock.timestamp();
		let values = self.values.read().await;

		Ok(values.get(key).filter(|entry| now < entry.expires_at).map(|entry| entry.bytes.clone()))
	}

	async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
		let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);

		if ttl_secs == 0 {
			self.forget(key).await?;

			return Ok(());
		}

		let now = self.clock.timestamp();
		let mut values = self.values.write().await;

		values.retain(|_, entry| now < entry.expires_at);
		values.insert(
			key.to_owned(),
			MemoryEntry { bytes: value, expires_at: now.saturating_add(ttl_secs) },
		);

		Ok(())
	}

	async fn forget(&self, key: &str) -> Result<bool> {
		Ok(self.values.write().await.remove(key).is_some())
	}
}
#[async_trait]
impl DistributedLock for MemoryStore {
	async fn acquire(&self, name: &str, owner: &str, lease: Option<Duration>) -> Result<bool> {
		let now = Instant::now();
		let mut locks = self.locks.lock().await;

		locks.retain(|_, lock| lock.expires_at.is_none_or(|deadline| now < deadline));

		if locks.contains_key(name) {
			return Ok(false);
		}

		locks.insert(
			name.to_owned(),
			MemoryLock { owner: owner.to_owned(), expires_at: lease.map(|lease| now + lease) },
		);

		Ok(true)
	}

	async fn release(&self, handle: LockHandle) -> Result<bool> {
		let mut locks = self.locks.lock().await;

		match locks.get(&handle.name) {
			Some(lock) if lock.owner == handle.owner => {
				locks.remove(&handle.name);

				Ok(true)
			},
			_ => Ok(false),
		}
	}
}

#[derive(Debug)]
struct MemoryEntry {
	bytes: Vec<u8>,
	expires_at: i64,
}

#[derive(Debug)]
struct MemoryLock {
	owner: String,
	expires_at: Option<Instant>,
}
