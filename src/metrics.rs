//! Metrics helpers and per-cache telemetry bookkeeping.

// std
#[cfg(feature = "prometheus")] use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
#[cfg(feature = "metrics")] use metrics::Label;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
#[cfg(feature = "metrics")] use smallvec::SmallVec;
// self
use crate::_prelude::*;

#[cfg(feature = "metrics")]
type LabelSet = SmallVec<[Label; 2]>;

#[cfg(feature = "metrics")]
const METRIC_REQUESTS_TOTAL: &str = "flexible_cache_requests_total";
#[cfg(feature = "metrics")]
const METRIC_HITS_TOTAL: &str = "flexible_cache_hits_total";
#[cfg(feature = "metrics")]
const METRIC_STALE_TOTAL: &str = "flexible_cache_stale_total";
#[cfg(feature = "metrics")]
const METRIC_MISSES_TOTAL: &str = "flexible_cache_misses_total";
#[cfg(feature = "metrics")]
const METRIC_REFRESH_SCHEDULED_TOTAL: &str = "flexible_cache_refresh_scheduled_total";
#[cfg(feature = "metrics")]
const METRIC_REFRESH_TOTAL: &str = "flexible_cache_refresh_total";
#[cfg(feature = "metrics")]
const METRIC_REFRESH_DURATION: &str = "flexible_cache_refresh_duration_seconds";

/// Shared Prometheus handle installed by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// How a read was served.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadKind {
	/// Served fresh from the store.
	Fresh,
	/// Served stale from the store.
	Stale,
	/// Computed inline because the record was missing or expired.
	Miss,
}

/// How a deferred refresh ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshStatus {
	/// New value committed.
	Success,
	/// Another writer replaced the entry first.
	Superseded,
	/// Lock not obtained in time.
	LockUnavailable,
	/// Compute or store failure.
	Error,
}
impl RefreshStatus {
	#[cfg(feature = "metrics")]
	fn as_str(self) -> &'static str {
		match self {
			RefreshStatus::Success => "success",
			RefreshStatus::Superseded => "superseded",
			RefreshStatus::LockUnavailable => "lock_unavailable",
			RefreshStatus::Error => "error",
		}
	}
}

/// Thread-safe metrics accumulator for a cache instance.
#[derive(Debug, Default)]
pub struct CacheMetrics {
	total_requests: AtomicU64,
	fresh_hits: AtomicU64,
	stale_hits: AtomicU64,
	misses: AtomicU64,
	refreshes_scheduled: AtomicU64,
	refreshes_deduplicated: AtomicU64,
	refresh_successes: AtomicU64,
	refreshes_superseded: AtomicU64,
	refreshes_lock_unavailable: AtomicU64,
	refresh_errors: AtomicU64,
	last_refresh_micros: AtomicU64,
}
impl CacheMetrics {
	/// Create a new metrics accumulator.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Record how a read was served.
	pub fn record_read(&self, store: &str, kind: ReadKind) {
		self.total_requests.fetch_add(1, Ordering::Relaxed);

		match kind {
			ReadKind::Fresh => self.fresh_hits.fetch_add(1, Ordering::Relaxed),
			ReadKind::Stale => self.stale_hits.fetch_add(1, Ordering::Relaxed),
			ReadKind::Miss => self.misses.fetch_add(1, Ordering::Relaxed),
		};

		record_read(store, kind);
	}

	/// Record a scheduling attempt; `accepted` is false when deduplicated.
	pub fn record_schedule(&self, store: &str, accepted: bool) {
		if accepted {
			self.refreshes_scheduled.fetch_add(1, Ordering::Relaxed);
		} else {
			self.refreshes_deduplicated.fetch_add(1, Ordering::Relaxed);
		}

		record_schedule(store, accepted);
	}

	/// Record how a deferred refresh ended and how long it took.
	pub fn record_refresh(&self, store: &str, status: RefreshStatus, duration: Duration) {
		match status {
			RefreshStatus::Success => {
				self.refresh_successes.fetch_add(1, Ordering::Relaxed);
				self.last_refresh_micros.store(duration.as_micros() as u64, Ordering::Relaxed);
			},
			RefreshStatus::Superseded => {
				self.refreshes_superseded.fetch_add(1, Ordering::Relaxed);
			},
			RefreshStatus::LockUnavailable => {
				self.refreshes_lock_unavailable.fetch_add(1, Ordering::Relaxed);
			},
			RefreshStatus::Error => {
				self.refresh_errors.fetch_add(1, Ordering::Relaxed);
			},
		}

		record_refresh(store, status, duration);
	}

	/// Take a point-in-time snapshot for status reporting.
	pub fn snapshot(&self) -> CacheMetricsSnapshot {
		CacheMetricsSnapshot {
			total_requests: self.total_requests.load(Ordering::Relaxed),
			fresh_hits: self.fresh_hits.load(Ordering::Relaxed),
			stale_hits: self.stale_hits.load(Ordering::Relaxed),
			misses: self.misses.load(Ordering::Relaxed),
			refreshes_scheduled: self.refreshes_scheduled.load(Ordering::Relaxed),
			refreshes_deduplicated: self.refreshes_deduplicated.load(Ordering::Relaxed),
			refresh_successes: self.refresh_successes.load(Ordering::Relaxed),
			refreshes_superseded: self.refreshes_superseded.load(Ordering::Relaxed),
			refreshes_lock_unavailable: self.refreshes_lock_unavailable.load(Ordering::Relaxed),
			refresh_errors: self.refresh_errors.load(Ordering::Relaxed),
			last_refresh_micros: match self.last_refresh_micros.load(Ordering::Relaxed) {
				0 => None,
				value => Some(value),
			},
		}
	}
}

/// Read-only snapshot of cache telemetry counters.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheMetricsSnapshot {
	/// Total number of reads observed.
	pub total_requests: u64,
	/// Reads served fresh.
	pub fresh_hits: u64,
	/// Reads served stale.
	pub stale_hits: u64,
	/// Reads that computed inline.
	pub misses: u64,
	/// Refreshes accepted by the scheduler.
	pub refreshes_scheduled: u64,
	/// Refresh requests dropped because one was already pending.
	pub refreshes_deduplicated: u64,
	/// Refreshes that committed.
	pub refresh_successes: u64,
	/// Refreshes abandoned by the timestamp guard.
	pub refreshes_superseded: u64,
	/// Refreshes abandoned because the lock was held.
	pub refreshes_lock_unavailable: u64,
	/// Refreshes that failed.
	pub refresh_errors: u64,
	/// Microsecond latency of the most recent successful refresh.
	pub last_refresh_micros: Option<u64>,
}
impl CacheMetricsSnapshot {
	/// Ratio of reads served from the store, fresh or stale.
	pub fn hit_rate(&self) -> f64 {
		if self.total_requests == 0 {
			0.0
		} else {
			(self.fresh_hits + self.stale_hits) as f64 / self.total_requests as f64
		}
	}

	/// Ratio of stale serves over total reads.
	pub fn stale_ratio(&self) -> f64 {
		if self.total_requests == 0 {
			0.0
		} else {
			self.stale_hits as f64 / self.total_requests as f64
		}
	}
}

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new().install_recorder()?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

#[cfg(feature = "metrics")]
fn record_read(store: &str, kind: ReadKind) {
	let labels = store_labels(store);

	metrics::counter!(METRIC_REQUESTS_TOTAL, labels.iter()).increment(1);

	match kind {
		ReadKind::Fresh => metrics::counter!(METRIC_HITS_TOTAL, labels.iter()).increment(1),
		ReadKind::Stale => {
			metrics::counter!(METRIC_HITS_TOTAL, labels.iter()).increment(1);
			metrics::counter!(METRIC_STALE_TOTAL, labels.iter()).increment(1);
		},
		ReadKind::Miss => metrics::counter!(METRIC_MISSES_TOTAL, labels.iter()).increment(1),
	}
}
#[cfg(not(feature = "metrics"))]
fn record_read(_: &str, _: ReadKind) {}

#[cfg(feature = "metrics")]
fn record_schedule(store: &str, accepted: bool) {
	let mut labels = store_labels(store);

	labels.push(Label::new("accepted", if accepted { "true" } else { "false" }));

	metrics::counter!(METRIC_REFRESH_SCHEDULED_TOTAL, labels.iter()).increment(1);
}
#[cfg(not(feature = "metrics"))]
fn record_schedule(_: &str, _: bool) {}

#[cfg(feature = "metrics")]
fn record_refresh(store: &str, status: RefreshStatus, duration: Duration) {
	let mut labels = store_labels(store);

	labels.push(Label::new("status", status.as_str()));

	metrics::counter!(METRIC_REFRESH_TOTAL, labels.iter()).increment(1);

	if status == RefreshStatus::Success {
		metrics::histogram!(METRIC_REFRESH_DURATION, store_labels(store).iter())
			.record(duration.as_secs_f64());
	}
}
#[cfg(not(feature = "metrics"))]
fn record_refresh(_: &str, _: RefreshStatus, _: Duration) {}

#[cfg(feature = "metrics")]
fn store_labels(store: &str) -> LabelSet {
	let mut labels = LabelSet::with_capacity(2);

	labels.push(Label::new("store", store.to_owned()));

	labels
}
