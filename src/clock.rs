//! Time sources shared by the engine and the in-process backend.

// std
use std::{
	fmt::Debug,
	sync::atomic::{AtomicI64, Ordering},
};
// self
use crate::_prelude::*;

/// Source of the current wall-clock time.
pub trait Clock: Debug + Send + Sync {
	/// Current instant.
	fn now(&self) -> DateTime<Utc>;

	/// Current instant as whole unix seconds.
	fn timestamp(&self) -> i64 {
		self.now().timestamp()
	}
}

/// Clock backed by the system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// Manually driven clock, mainly for tests and simulations.
///
/// Time only moves when [`ManualClock::set`] or [`ManualClock::advance`] is called.
#[derive(Debug)]
pub struct ManualClock {
	millis: AtomicI64,
}
impl ManualClock {
	/// Create a clock frozen at `now`.
	pub fn new(now: DateTime<Utc>) -> Arc<Self> {
		Arc::new(Self { millis: AtomicI64::new(now.timestamp_millis()) })
	}

	/// Create a clock frozen at the current system time, truncated to whole seconds.
	pub fn starting_now() -> Arc<Self> {
		let now = Utc::now();

		Self::new(DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now))
	}

	/// Jump to an absolute instant.
	pub fn set(&self, now: DateTime<Utc>) {
		self.millis.store(now.timestamp_millis(), Ordering::SeqCst);
	}

	/// Move the clock forward by `delta`.
	pub fn advance(&self, delta: Duration) {
		let millis = i64::try_from(delta.as_millis()).unwrap_or(i64::MAX);

		self.millis.fetch_add(millis, Ordering::SeqCst);
	}
}
impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
	}
}
