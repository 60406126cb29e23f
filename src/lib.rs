//! Stale-while-revalidate cache engine with deferred refresh, optimistic commit guards, and
//! pluggable key/value backends.
//!
//! Reads classify the stored entry by age. Fresh entries are returned as-is, stale entries are
//! returned immediately while a refresh is queued, and missing or expired entries are computed
//! inline. Queued refreshes run when the embedding application calls
//! [`FlexibleCache::flush`], and only commit when no other writer has replaced the entry since
//! the refresh was scheduled.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod clock;
pub mod metrics;
pub mod store;

mod error;
mod registry;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, TimeDelta, Utc};
	pub use tokio::time::Instant;

	pub use crate::{BoxError, Error, Result};
}

#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	cache::{
		freshness::{Bounds, Freshness, Ttl, Window},
		manager::{FlexibleCache, StoreScope},
		scheduler::FlushReport,
	},
	clock::{Clock, ManualClock, SystemClock},
	error::{BoxError, Error, RefreshFailure, Result},
	registry::{FlexibleCacheBuilder, FlexibleCacheConfig, StoreConfig},
	store::{DistributedLock, LockHandle, LockOptions, MemoryStore, StoreHandle, ValueStore},
};
#[cfg(feature = "redis")] pub use crate::store::redis::RedisStore;
