//! Backend collaborators: key/value storage and distributed locking.

pub mod memory;
#[cfg(feature = "redis")] pub mod redis;

pub use memory::MemoryStore;

// std
use std::fmt::Debug;
// crates.io
use async_trait::async_trait;
use rand::Rng;
// self
use crate::_prelude::*;

/// Default interval between lock acquisition attempts while waiting.
pub const DEFAULT_LOCK_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Key/value backend storing opaque bytes with a relative expiry.
#[async_trait]
pub trait ValueStore: Debug + Send + Sync {
	/// Read the bytes stored under `key`, if present and unexpired.
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

	/// Store `value` under `key` for `ttl`.
	///
	/// A zero `ttl` removes the entry instead.
	async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

	/// Remove `key`, returning whether an entry existed.
	async fn forget(&self, key: &str) -> Result<bool>;
}

#[async_trait]
impl<S> ValueStore for Arc<S>
where
	S: ?Sized + ValueStore,
{
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
		(**self).get(key).await
	}

	async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
		(**self).put(key, value, ttl).await
	}

	async fn forget(&self, key: &str) -> Result<bool> {
		(**self).forget(key).await
	}
}

/// Best-effort mutual exclusion keyed by name.
#[async_trait]
pub trait DistributedLock: Debug + Send + Sync {
	/// Make a single attempt to take the lock `name` for `owner`.
	///
	/// `lease` bounds how long the lock is held when never released; `None` holds it until
	/// released.
	async fn acquire(&self, name: &str, owner: &str, lease: Option<Duration>) -> Result<bool>;

	/// Release a held lock; returns false when the lock was no longer owned by the handle.
	async fn release(&self, handle: LockHandle) -> Result<bool>;

	/// Try to take the lock, polling every `poll` until `wait` has elapsed.
	async fn try_acquire(
		&self,
		name: &str,
		options: &LockOptions,
		poll: Duration,
	) -> Result<Option<LockHandle>> {
		let owner = options.owner.clone().unwrap_or_else(random_owner);
		let deadline = Instant::now() + options.wait;

		loop {
			if self.acquire(name, &owner, options.lease).await? {
				return Ok(Some(LockHandle { name: name.to_owned(), owner }));
			}

			let now = Instant::now();

			if now >= deadline {
				return Ok(None);
			}

			tokio::time::sleep(poll.min(deadline - now)).await;
		}
	}
}

#[async_trait]
impl<S> DistributedLock for Arc<S>
where
	S: ?Sized + DistributedLock,
{
	async fn acquire(&self, name: &str, owner: &str, lease: Option<Duration>) -> Result<bool> {
		(**self).acquire(name, owner, lease).await
	}

	async fn release(&self, handle: LockHandle) -> Result<bool> {
		(**self).release(handle).await
	}

	async fn try_acquire(
		&self,
		name: &str,
		options: &LockOptions,
		poll: Duration,
	) -> Result<Option<LockHandle>> {
		(**self).try_acquire(name, options, poll).await
	}
}

/// Proof of a held lock, used to release it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockHandle {
	/// Lock name.
	pub name: String,
	/// Owner token recorded with the lock.
	pub owner: String,
}

/// How a deferred refresh should take the per-key lock.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LockOptions {
	/// How long to block waiting for the lock before giving up.
	pub wait: Duration,
	/// Lease after which an unreleased lock expires on its own.
	pub lease: Option<Duration>,
	/// Explicit owner token; a random one is generated when absent.
	pub owner: Option<String>,
}
impl LockOptions {
	/// Block up to `wait` for the lock.
	pub fn wait(wait: Duration) -> Self {
		Self { wait, ..Default::default() }
	}

	/// Block up to `seconds` for the lock.
	pub fn wait_seconds(seconds: u64) -> Self {
		Self::wait(Duration::from_secs(seconds))
	}

	/// Expire the lock after `lease` when it is never released.
	pub fn with_lease(mut self, lease: Duration) -> Self {
		self.lease = Some(lease);

		self
	}

	/// Record `owner` as the lock owner.
	pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
		self.owner = Some(owner.into());

		self
	}
}

/// A named backend instance: values plus optional lock support.
#[derive(Clone, Debug)]
pub struct StoreHandle {
	name: Arc<str>,
	values: Arc<dyn ValueStore>,
	locks: Option<Arc<dyn DistributedLock>>,
}
impl StoreHandle {
	/// Wrap a backend providing both values and locks.
	pub fn new<S>(name: impl Into<Arc<str>>, store: S) -> Self
	where
		S: 'static + ValueStore + DistributedLock,
	{
		let store = Arc::new(store);

		Self { name: name.into(), values: store.clone(), locks: Some(store) }
	}

	/// Wrap a backend that cannot lock.
	pub fn without_locks(name: impl Into<Arc<str>>, values: Arc<dyn ValueStore>) -> Self {
		Self { name: name.into(), values, locks: None }
	}

	/// Name the store was registered under.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Value backend.
	pub fn values(&self) -> &dyn ValueStore {
		self.values.as_ref()
	}

	/// Lock backend, when supported.
	pub fn locks(&self) -> Option<&dyn DistributedLock> {
		self.locks.as_deref()
	}
}

fn random_owner() -> String {
	format!("{:032x}", rand::rng().random::<u128>())
}
