//! Redis backend for values and locks.

// crates.io
use async_trait::async_trait;
use redis::{AsyncCommands, Script, aio::MultiplexedConnection};
use tokio::sync::OnceCell;
// self
use crate::{
	_prelude::*,
	store::{DistributedLock, LockHandle, ValueStore},
};

const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
	return redis.call("del", KEYS[1])
else
	return 0
end
"#;

/// Values and locks stored in Redis.
///
/// TTLs are enforced by Redis itself and therefore follow real time, not an injected clock.
#[derive(Debug)]
pub struct RedisStore {
	client: redis::Client,
	prefix: Arc<str>,
	connection: OnceCell<MultiplexedConnection>,
}
impl RedisStore {
	/// Create a store over `client`; the connection is opened lazily.
	pub fn new(client: redis::Client) -> Self {
		Self { client, prefix: Arc::from(""), connection: OnceCell::new() }
	}

	/// Open a client for `url` (e.g. `redis://127.0.0.1:6379/1`).
	pub fn open(url: &str) -> Result<Self> {
		Ok(Self::new(redis::Client::open(url)?))
	}

	/// Prefix every key written by this store.
	pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.prefix = Arc::from(prefix.into());

		self
	}

	async fn connection(&self) -> Result<MultiplexedConnection> {
		let conn = self
			.connection
			.get_or_try_init(|| self.client.get_multiplexed_async_connection())
			.await?;

		Ok(conn.clone())
	}

	fn key(&self, key: &str) -> String {
		format!("{}{key}", self.prefix)
	}
}
#[async_trait]
impl ValueStore for RedisStore {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
		let mut conn = self.connection().await?;

		Ok(conn.get(self.key(key)).await?)
	}

	async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
		let mut conn = self.connection().await?;
		let key = self.key(key);

		if ttl.as_secs() == 0 {
			conn.del::<_, ()>(key).await?;
		} else {
			conn.set_ex::<_, _, ()>(key, value, ttl.as_secs()).await?;
		}

		Ok(())
	}

	async fn forget(&self, key: &str) -> Result<bool> {
		let mut conn = self.connection().await?;
		let removed: u64 = conn.del(self.key(key)).await?;

		Ok(removed > 0)
	}
}
#[async_trait]
impl DistributedLock for RedisStore {
	async fn acquire(&self, name: &str, owner: &str, lease: Option<Duration>) -> Result<bool> {
		let mut conn = self.connection().await?;
		let mut cmd = redis::cmd("SET");

		cmd.arg(self.key(name)).arg(owner).arg("NX");

		if let Some(lease) = lease {
			cmd.arg("PX").arg(lease.as_millis().max(1) as u64);
		}

		let reply: Option<String> = cmd.query_async(&mut conn).await?;

		Ok(reply.is_some())
	}

	async fn release(&self, handle: LockHandle) -> Result<bool> {
		let mut conn = self.connection().await?;
		let removed: u64 = Script::new(RELEASE_SCRIPT)
			.key(self.key(&handle.name))
			.arg(handle.owner)
			.invoke_async(&mut conn)
			.await?;

		Ok(removed > 0)
	}
}
