//! Deferred refreshes guarded by the per-key lock.

// std
use std::{convert::Infallible, time::Duration};
// crates.io
use flexible_cache::{DistributedLock, LockOptions, ManualClock};
use tokio::time;
// self
use crate::{init_tracing, memory, single_store, stored_json};

const LOCK_NAME: &str = "flexible-cache:lock:report";

#[tokio::test]
async fn locked_refresh_commits_and_releases() {
	init_tracing();

	let clock = ManualClock::starting_now();
	let store = memory(&clock);
	let cache = single_store(&clock, &store);

	let _: String = cache
		.flexible_locked("report", (5, 10), LockOptions::wait_seconds(1), || async {
			Ok::<_, Infallible>("v1".to_owned())
		})
		.await
		.expect("initial read");

	clock.advance(Duration::from_secs(7));

	let value: String = cache
		.flexible_locked("report", (5, 10), LockOptions::wait_seconds(1), || async {
			Ok::<_, Infallible>("v2".to_owned())
		})
		.await
		.expect("stale read");

	assert_eq!(value, "v1");
	assert_eq!(cache.flush().await.expect("flush").refreshed, 1);
	assert_eq!(stored_json(&store, "report").await.as_deref(), Some("\"v2\""));
	assert!(store.acquire(LOCK_NAME, "next-worker", None).await.expect("acquire"), "lock was released");
}

#[tokio::test]
async fn held_lock_skips_the_refresh() {
	init_tracing();

	let clock = ManualClock::starting_now();
	let store = memory(&clock);
	let cache = single_store(&clock, &store);
	let lock = LockOptions::wait(Duration::from_millis(20)).with_lease(Duration::from_secs(30));

	let _: String = cache
		.flexible("report", (5, 10), || async { Ok::<_, Infallible>("v1".to_owned()) })
		.await
		.expect("initial read");

	clock.advance(Duration::from_secs(7));

	assert!(store.acquire(LOCK_NAME, "other-worker", None).await.expect("acquire"));

	let value: String = cache
		.flexible_locked("report", (5, 10), lock, || async {
			Ok::<_, Infallible>("v2".to_owned())
		})
		.await
		.expect("stale read");

	assert_eq!(value, "v1");

	let report = cache.flush().await.expect("flush");

	assert_eq!(report.lock_unavailable, 1);
	assert_eq!(report.refreshed, 0);
	assert_eq!(stored_json(&store, "report").await.as_deref(), Some("\"v1\""));
	assert_eq!(cache.metrics().refreshes_lock_unavailable, 1);
	assert!(
		!store.acquire(LOCK_NAME, "next-worker", None).await.expect("acquire"),
		"foreign lock must stay untouched"
	);
}

#[tokio::test]
async fn lock_is_released_when_the_refresh_fails() {
	init_tracing();

	let clock = ManualClock::starting_now();
	let store = memory(&clock);
	let cache = single_store(&clock, &store);

	let _: String = cache
		.flexible("report", (5, 10), || async { Ok::<_, Infallible>("v1".to_owned()) })
		.await
		.expect("initial read");

	clock.advance(Duration::from_secs(7));

	let _: String = cache
		.flexible_locked("report", (5, 10), LockOptions::wait_seconds(1), || async {
			Err::<String, _>("refresh exploded")
		})
		.await
		.expect("stale read");

	assert!(cache.flush().await.is_err());
	assert!(store.acquire(LOCK_NAME, "next-worker", None).await.expect("acquire"), "lock was released");
	assert_eq!(stored_json(&store, "report").await.as_deref(), Some("\"v1\""));
}

#[tokio::test]
async fn interrupted_flush_keeps_pending_work_and_releases_the_lock() {
	init_tracing();

	let clock = ManualClock::starting_now();
	let store = memory(&clock);
	let cache = single_store(&clock, &store);

	for key in ["report", "summary"] {
		let _: String = cache
			.flexible(key, (5, 10), || async { Ok::<_, Infallible>("v1".to_owned()) })
			.await
			.expect("initial read");
	}

	clock.advance(Duration::from_secs(7));

	let _: String = cache
		.flexible_locked("report", (5, 10), LockOptions::wait_seconds(1), || async {
			time::sleep(Duration::from_millis(200)).await;

			Ok::<_, Infallible>("v2".to_owned())
		})
		.await
		.expect("stale read");
	let _: String = cache
		.flexible("summary", (5, 10), || async { Ok::<_, Infallible>("v2".to_owned()) })
		.await
		.expect("stale read");

	assert!(time::timeout(Duration::from_millis(50), cache.flush()).await.is_err());
	assert_eq!(cache.pending().await, 1);
	assert_eq!(stored_json(&store, "summary").await.as_deref(), Some("\"v1\""));

	time::sleep(Duration::from_millis(400)).await;

	assert_eq!(stored_json(&store, "report").await.as_deref(), Some("\"v2\""));
	assert!(store.acquire(LOCK_NAME, "next-worker", None).await.expect("acquire"), "lock was released");
	assert_eq!(cache.flush().await.expect("flush").refreshed, 1);
	assert_eq!(stored_json(&store, "summary").await.as_deref(), Some("\"v2\""));
}
