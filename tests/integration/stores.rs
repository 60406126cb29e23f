//! Per-call store selection and backend failures.

// std
use std::{convert::Infallible, sync::Arc, time::Duration};
// crates.io
use async_trait::async_trait;
use flexible_cache::{Clock, Error, FlexibleCache, LockOptions, ManualClock, Result, ValueStore};
// self
use crate::{init_tracing, memory, stored_created_at, stored_json};

#[derive(Debug)]
struct OfflineStore;
#[async_trait]
impl ValueStore for OfflineStore {
	async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
		Err(Error::Store("connection refused".into()))
	}

	async fn put(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<()> {
		Err(Error::Store("connection refused".into()))
	}

	async fn forget(&self, _key: &str) -> Result<bool> {
		Err(Error::Store("connection refused".into()))
	}
}

#[tokio::test]
async fn selected_store_applies_to_one_call_only() {
	init_tracing();

	let clock = ManualClock::starting_now();
	let primary = memory(&clock);
	let secondary = memory(&clock);
	let cache = FlexibleCache::builder()
		.clock(clock.clone())
		.store("primary", primary.clone())
		.store("secondary", secondary.clone())
		.default_store("primary")
		.build()
		.expect("cache should build");

	assert_eq!(cache.store_names(), ["primary", "secondary"]);

	let scope = cache.store(Some("secondary")).expect("known store");

	assert_eq!(scope.name(), "secondary");

	let value: String = scope
		.flexible("report", (5, 10), || async { Ok::<_, Infallible>("from-secondary".to_owned()) })
		.await
		.expect("secondary read");

	assert_eq!(value, "from-secondary");
	assert_eq!(stored_json(&secondary, "report").await.as_deref(), Some("\"from-secondary\""));
	assert!(stored_created_at(&secondary, "report").await.is_some());
	assert_eq!(stored_json(&primary, "report").await, None);
	assert_eq!(stored_created_at(&primary, "report").await, None);

	let value: String = cache
		.flexible("report", (5, 10), || async { Ok::<_, Infallible>("from-primary".to_owned()) })
		.await
		.expect("default read");

	assert_eq!(value, "from-primary");
	assert_eq!(stored_json(&primary, "report").await.as_deref(), Some("\"from-primary\""));
}

#[tokio::test]
async fn deferred_refresh_targets_the_selected_store() {
	init_tracing();

	let clock = ManualClock::starting_now();
	let start = clock.timestamp();
	let primary = memory(&clock);
	let secondary = memory(&clock);
	let cache = FlexibleCache::builder()
		.clock(clock.clone())
		.store("primary", primary.clone())
		.store("secondary", secondary.clone())
		.build()
		.expect("cache should build");

	for (store, value) in [(None, "primary-v1"), (Some("secondary"), "secondary-v1")] {
		let _: String = cache
			.store(store)
			.expect("known store")
			.flexible("report", (5, 10), move || async move {
				Ok::<_, Infallible>(value.to_owned())
			})
			.await
			.expect("seed read");
	}

	clock.advance(Duration::from_secs(7));

	let value: String = cache
		.store(Some("secondary"))
		.expect("known store")
		.flexible("report", (5, 10), || async { Ok::<_, Infallible>("secondary-v2".to_owned()) })
		.await
		.expect("stale read");

	assert_eq!(value, "secondary-v1");

	let report = cache.flush().await.expect("flush");

	assert_eq!(report.refreshed, 1);
	assert_eq!(stored_json(&secondary, "report").await.as_deref(), Some("\"secondary-v2\""));
	assert_eq!(stored_created_at(&secondary, "report").await, Some(start + 7));
	assert_eq!(stored_json(&primary, "report").await.as_deref(), Some("\"primary-v1\""));
	assert_eq!(stored_created_at(&primary, "report").await, Some(start));
}

#[tokio::test]
async fn unknown_store_is_rejected() {
	let clock = ManualClock::starting_now();
	let cache = FlexibleCache::builder()
		.clock(clock.clone())
		.store("memory", memory(&clock))
		.build()
		.expect("cache should build");

	assert!(matches!(
		cache.store(Some("missing")),
		Err(Error::UnknownStore(name)) if name == "missing"
	));
}

#[tokio::test]
async fn backend_failures_propagate() {
	init_tracing();

	let clock = ManualClock::starting_now();
	let cache = FlexibleCache::builder()
		.clock(clock.clone())
		.store_without_locks("offline", Arc::new(OfflineStore))
		.build()
		.expect("cache should build");
	let result = cache
		.flexible("report", (5, 10), || async { Ok::<_, Infallible>("never stored".to_owned()) })
		.await;

	assert!(matches!(result, Err(Error::Store(_))));
	assert!(matches!(cache.forget("report").await, Err(Error::Store(_))));
}

#[tokio::test]
async fn store_without_locks_refreshes_unlocked() {
	init_tracing();

	let clock = ManualClock::starting_now();
	let values = memory(&clock);
	let cache = FlexibleCache::builder()
		.clock(clock.clone())
		.store_without_locks("plain", values.clone())
		.build()
		.expect("cache should build");

	let _: String = cache
		.flexible("report", (5, 10), || async { Ok::<_, Infallible>("v1".to_owned()) })
		.await
		.expect("initial read");

	clock.advance(Duration::from_secs(7));

	let _: String = cache
		.flexible_locked("report", (5, 10), LockOptions::wait_seconds(1), || async {
			Ok::<_, Infallible>("v2".to_owned())
		})
		.await
		.expect("stale read");

	assert_eq!(cache.flush().await.expect("flush").refreshed, 1);
	assert_eq!(stored_json(&values, "report").await.as_deref(), Some("\"v2\""));
}
