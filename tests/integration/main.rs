//! End-to-end coverage of the flexible cache against in-process backends.

mod locking;
mod stores;

// std
use std::sync::Arc;
// crates.io
use flexible_cache::{FlexibleCache, ManualClock, MemoryStore, ValueStore};

const CREATED_PREFIX: &str = "flexible-cache:created:";

fn init_tracing() {
	let _ = tracing_subscriber::fmt::try_init();
}

fn memory(clock: &Arc<ManualClock>) -> Arc<MemoryStore> {
	Arc::new(MemoryStore::new(clock.clone()))
}

fn single_store(clock: &Arc<ManualClock>, store: &Arc<MemoryStore>) -> FlexibleCache {
	FlexibleCache::builder()
		.clock(clock.clone())
		.store("memory", store.clone())
		.build()
		.expect("cache should build")
}

async fn stored_json(store: &Arc<MemoryStore>, key: &str) -> Option<String> {
	store
		.get(key)
		.await
		.expect("store read")
		.map(|bytes| String::from_utf8(bytes).expect("utf-8 payload"))
}

async fn stored_created_at(store: &Arc<MemoryStore>, key: &str) -> Option<i64> {
	store
		.get(&format!("{CREATED_PREFIX}{key}"))
		.await
		.expect("store read")
		.map(|bytes| String::from_utf8(bytes).expect("utf-8 record").parse().expect("unix seconds"))
}
