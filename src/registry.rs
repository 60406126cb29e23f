//! Store registry, configuration, and cache construction.
//!
//! Stores are registered under names; each call may select one, falling back to the default.

// std
use std::collections::{BTreeMap, HashMap};
// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::{
	_prelude::*,
	cache::{
		executor::RefreshExecutor,
		manager::FlexibleCache,
		timestamp::{self, CreatedAtStore},
	},
	clock::{Clock, SystemClock},
	store::{self, DistributedLock, MemoryStore, StoreHandle, ValueStore},
};

/// Name given to the implicit in-memory store.
pub const DEFAULT_STORE_NAME: &str = "memory";
/// Longest accepted store name.
pub const MAX_STORE_NAME_LEN: usize = 64;

/// Backend declaration inside [`FlexibleCacheConfig`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "snake_case")]
pub enum StoreConfig {
	/// In-process store following the cache clock.
	Memory,
	/// Redis store; requires the `redis` feature.
	Redis {
		/// Connection URL, including the database index.
		url: String,
		/// Prefix applied to every key.
		#[serde(default)]
		prefix: Option<String>,
	},
}

/// Declarative cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlexibleCacheConfig {
	/// Namespace reserved for companion timestamps and lock names.
	#[serde(default = "default_namespace")]
	pub namespace: String,
	/// Store used when a call does not select one; required with more than one store.
	#[serde(default)]
	pub default_store: Option<String>,
	/// Delay between lock acquisition attempts, in milliseconds.
	#[serde(default = "default_lock_poll_interval_ms")]
	pub lock_poll_interval_ms: u64,
	/// Named stores; a single in-memory store is used when empty.
	#[serde(default)]
	pub stores: BTreeMap<String, StoreConfig>,
}
impl FlexibleCacheConfig {
	/// Validate the configuration against the documented constraints.
	pub fn validate(&self) -> Result<()> {
		validate_namespace(&self.namespace)?;

		if self.lock_poll_interval_ms == 0 {
			return Err(Error::Validation {
				field: "lock_poll_interval_ms",
				reason: "Must be greater than zero.".into(),
			});
		}

		for name in self.stores.keys() {
			validate_store_name(name)?;
		}

		match &self.default_store {
			Some(name) if !self.stores.is_empty() && !self.stores.contains_key(name) =>
				return Err(Error::UnknownStore(name.clone())),
			None if self.stores.len() > 1 =>
				return Err(Error::Validation {
					field: "default_store",
					reason: "Must be set when more than one store is configured.".into(),
				}),
			_ => {},
		}

		Ok(())
	}
}
impl Default for FlexibleCacheConfig {
	fn default() -> Self {
		Self {
			namespace: default_namespace(),
			default_store: None,
			lock_poll_interval_ms: default_lock_poll_interval_ms(),
			stores: BTreeMap::new(),
		}
	}
}

/// Builder for [`FlexibleCache`].
#[derive(Debug)]
pub struct FlexibleCacheBuilder {
	clock: Option<Arc<dyn Clock>>,
	namespace: String,
	default_store: Option<String>,
	lock_poll_interval: Duration,
	stores: Vec<(String, PendingStore)>,
}
impl FlexibleCacheBuilder {
	/// Create a builder with default configuration.
	pub fn new() -> Self {
		Self {
			clock: None,
			namespace: timestamp::DEFAULT_NAMESPACE.into(),
			default_store: None,
			lock_poll_interval: store::DEFAULT_LOCK_POLL_INTERVAL,
			stores: Vec::new(),
		}
	}

	/// Seed a builder from declarative configuration.
	pub fn from_config(config: FlexibleCacheConfig) -> Result<Self> {
		config.validate()?;

		let mut builder = Self::new()
			.namespace(config.namespace)
			.lock_poll_interval(Duration::from_millis(config.lock_poll_interval_ms));

		if let Some(name) = config.default_store {
			builder = builder.default_store(name);
		}

		for (name, driver) in config.stores {
			builder = match driver {
				StoreConfig::Memory => builder.memory_store(name),
				#[cfg(feature = "redis")]
				StoreConfig::Redis { url, prefix } => {
					let mut redis = store::redis::RedisStore::open(&url)?;

					if let Some(prefix) = prefix {
						redis = redis.with_prefix(prefix);
					}

					builder.store(name, redis)
				},
				#[cfg(not(feature = "redis"))]
				StoreConfig::Redis { .. } =>
					return Err(Error::Validation {
						field: "stores",
						reason: format!(
							"Store '{name}' uses the redis driver, but the `redis` feature is disabled."
						),
					}),
			};
		}

		Ok(builder)
	}

	/// Drive time-based decisions and in-memory expiry with `clock`.
	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);

		self
	}

	/// Override the namespace of companion keys and lock names.
	pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
		self.namespace = namespace.into();

		self
	}

	/// Register a backend with lock support under `name`.
	pub fn store<S>(mut self, name: impl Into<String>, store: S) -> Self
	where
		S: 'static + ValueStore + DistributedLock,
	{
		let name = name.into();
		let handle = StoreHandle::new(name.as_str(), store);

		self.stores.push((name, PendingStore::Ready(handle)));

		self
	}

	/// Register a backend without lock support under `name`.
	pub fn store_without_locks(
		mut self,
		name: impl Into<String>,
		store: Arc<dyn ValueStore>,
	) -> Self {
		let name = name.into();
		let handle = StoreHandle::without_locks(name.as_str(), store);

		self.stores.push((name, PendingStore::Ready(handle)));

		self
	}

	/// Register an in-memory store under `name`, driven by the builder's clock.
	pub fn memory_store(mut self, name: impl Into<String>) -> Self {
		self.stores.push((name.into(), PendingStore::Memory));

		self
	}

	/// Store used when a call does not select one (defaults to the first registered).
	pub fn default_store(mut self, name: impl Into<String>) -> Self {
		self.default_store = Some(name.into());

		self
	}

	/// Delay between lock acquisition attempts.
	pub fn lock_poll_interval(mut self, interval: Duration) -> Self {
		self.lock_poll_interval = interval;

		self
	}

	/// Finalise the configuration and construct a [`FlexibleCache`].
	pub fn build(self) -> Result<FlexibleCache> {
		validate_namespace(&self.namespace)?;

		if self.lock_poll_interval.is_zero() {
			return Err(Error::Validation {
				field: "lock_poll_interval",
				reason: "Must be greater than zero.".into(),
			});
		}

		let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
		let mut stores = self.stores;

		if stores.is_empty() {
			stores.push((DEFAULT_STORE_NAME.into(), PendingStore::Memory));
		}

		let default_name = self.default_store.unwrap_or_else(|| stores[0].0.clone());
		let mut handles = HashMap::with_capacity(stores.len());

		for (name, pending) in stores {
			validate_store_name(&name)?;

			let handle = match pending {
				PendingStore::Ready(handle) => handle,
				PendingStore::Memory =>
					StoreHandle::new(name.as_str(), MemoryStore::new(clock.clone())),
			};

			if handles.insert(name.clone(), handle).is_some() {
				return Err(Error::Validation {
					field: "stores",
					reason: format!("Store '{name}' is registered more than once."),
				});
			}
		}

		let default =
			handles.get(&default_name).cloned().ok_or(Error::UnknownStore(default_name))?;
		let executor = RefreshExecutor::new(
			CreatedAtStore::new(self.namespace),
			clock.clone(),
			self.lock_poll_interval,
		);

		tracing::debug!(stores = handles.len(), default = default.name(), "flexible cache built");

		Ok(FlexibleCache::from_parts(StoreRegistry { stores: handles, default }, clock, executor))
	}
}
impl Default for FlexibleCacheBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Named stores plus the default selection.
#[derive(Debug)]
pub(crate) struct StoreRegistry {
	stores: HashMap<String, StoreHandle>,
	default: StoreHandle,
}
impl StoreRegistry {
	pub(crate) fn memory(clock: Arc<dyn Clock>) -> Self {
		let default = StoreHandle::new(DEFAULT_STORE_NAME, MemoryStore::new(clock));

		Self { stores: HashMap::from([(DEFAULT_STORE_NAME.into(), default.clone())]), default }
	}

	pub(crate) fn resolve(&self, name: Option<&str>) -> Result<StoreHandle> {
		match name {
			None => Ok(self.default.clone()),
			Some(name) =>
				self.stores.get(name).cloned().ok_or_else(|| Error::UnknownStore(name.to_owned())),
		}
	}

	pub(crate) fn default_store(&self) -> StoreHandle {
		self.default.clone()
	}

	pub(crate) fn names(&self) -> Vec<&str> {
		let mut names: Vec<_> = self.stores.keys().map(String::as_str).collect();

		names.sort_unstable();

		names
	}
}

#[derive(Debug)]
enum PendingStore {
	Ready(StoreHandle),
	Memory,
}

fn default_namespace() -> String {
	timestamp::DEFAULT_NAMESPACE.into()
}

fn default_lock_poll_interval_ms() -> u64 {
	store::DEFAULT_LOCK_POLL_INTERVAL.as_millis() as u64
}

fn validate_namespace(value: &str) -> Result<()> {
	if value.is_empty() {
		return Err(Error::Validation { field: "namespace", reason: "Must not be empty.".into() });
	}
	if value.chars().any(char::is_whitespace) {
		return Err(Error::Validation {
			field: "namespace",
			reason: "Must not contain whitespace.".into(),
		});
	}

	Ok(())
}

fn validate_store_name(value: &str) -> Result<()> {
	if value.is_empty() {
		return Err(Error::Validation { field: "store", reason: "Must not be empty.".into() });
	}
	if value.len() > MAX_STORE_NAME_LEN {
		return Err(Error::Validation {
			field: "store",
			reason: format!("Must be {MAX_STORE_NAME_LEN} characters or fewer."),
		});
	}
	if !value.as_bytes().iter().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_')) {
		return Err(Error::Validation {
			field: "store",
			reason: "May only contain ASCII letters, numbers, '-', or '_'.".into(),
		});
	}

	Ok(())
}
