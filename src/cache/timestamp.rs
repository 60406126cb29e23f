//! Companion records holding each value's creation time.

// self
use crate::{_prelude::*, store::StoreHandle};

/// Default namespace reserved for companion keys and lock names.
pub const DEFAULT_NAMESPACE: &str = "flexible-cache";

/// Derives companion keys and reads/writes the Created-At timestamp next to each value.
///
/// The timestamp always lives in the same store instance as its value.
#[derive(Clone, Debug)]
pub struct CreatedAtStore {
	namespace: Arc<str>,
}
impl CreatedAtStore {
	/// Create a companion store under `namespace`.
	pub fn new(namespace: impl Into<Arc<str>>) -> Self {
		Self { namespace: namespace.into() }
	}

	/// Namespace prefixing every derived key.
	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	/// Key holding the Created-At timestamp of `key`.
	pub fn created_key(&self, key: &str) -> String {
		format!("{}:created:{key}", self.namespace)
	}

	/// Lock name guarding refreshes of `key`.
	pub fn lock_name(&self, key: &str) -> String {
		format!("{}:lock:{key}", self.namespace)
	}

	/// Read the Created-At timestamp of `key` in unix seconds.
	///
	/// Unparsable records read as absent.
	pub async fn get(&self, store: &StoreHandle, key: &str) -> Result<Option<i64>> {
		let companion = self.created_key(key);
		let Some(raw) = store.values().get(&companion).await? else {
			return Ok(None);
		};
		let parsed = std::str::from_utf8(&raw).ok().and_then(|raw| raw.trim().parse().ok());

		if parsed.is_none() {
			tracing::warn!(
				store = store.name(),
				key = %companion,
				"ignoring unparsable created-at record"
			);
		}

		Ok(parsed)
	}

	/// Record `created_at` for `key` with the same TTL as its value.
	pub async fn set(
		&self,
		store: &StoreHandle,
		key: &str,
		created_at: i64,
		ttl: Duration,
	) -> Result<()> {
		store.values().put(&self.created_key(key), created_at.to_string().into_bytes(), ttl).await
	}

	/// Remove the Created-At record of `key`.
	pub async fn forget(&self, store: &StoreHandle, key: &str) -> Result<bool> {
		store.values().forget(&self.created_key(key)).await
	}
}
impl Default for CreatedAtStore {
	fn default() -> Self {
		Self::new(DEFAULT_NAMESPACE)
	}
}
