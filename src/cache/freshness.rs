//! Window normalisation and age classification.

// self
use crate::_prelude::*;

/// One bound of a freshness window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ttl {
	/// Relative duration from "now".
	After(Duration),
	/// Relative seconds from "now"; negative values clamp to zero.
	Seconds(i64),
	/// Absolute instant, converted to a relative duration at call time.
	At(DateTime<Utc>),
}
impl Ttl {
	/// Seconds remaining from `now`, clamped at zero.
	pub fn seconds_from(self, now: DateTime<Utc>) -> u64 {
		match self {
			Ttl::After(duration) => duration.as_secs(),
			Ttl::Seconds(seconds) => seconds.max(0) as u64,
			Ttl::At(instant) => (instant - now).num_seconds().max(0) as u64,
		}
	}
}
impl From<Duration> for Ttl {
	fn from(value: Duration) -> Self {
		Self::After(value)
	}
}
impl From<i64> for Ttl {
	fn from(value: i64) -> Self {
		Self::Seconds(value)
	}
}
impl From<u64> for Ttl {
	fn from(value: u64) -> Self {
		Self::After(Duration::from_secs(value))
	}
}
impl From<i32> for Ttl {
	fn from(value: i32) -> Self {
		Self::Seconds(value.into())
	}
}
impl From<TimeDelta> for Ttl {
	fn from(value: TimeDelta) -> Self {
		Self::Seconds(value.num_seconds())
	}
}
impl From<DateTime<Utc>> for Ttl {
	fn from(value: DateTime<Utc>) -> Self {
		Self::At(value)
	}
}

/// Pair of bounds: how long a value is fresh, and how long it stays readable at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
	/// Age up to which a value is served without refresh activity.
	pub fresh: Ttl,
	/// Age up to which a value is still served; also the physical TTL in the store.
	pub stale: Ttl,
}
impl Window {
	/// Build a window from any pair of bounds.
	pub fn new(fresh: impl Into<Ttl>, stale: impl Into<Ttl>) -> Self {
		Self { fresh: fresh.into(), stale: stale.into() }
	}

	/// Build a window from whole seconds.
	pub fn seconds(fresh: i64, stale: i64) -> Self {
		Self::new(fresh, stale)
	}

	/// Resolve both bounds relative to `now`.
	pub fn bounds(&self, now: DateTime<Utc>) -> Bounds {
		Bounds {
			fresh_secs: self.fresh.seconds_from(now),
			stale_secs: self.stale.seconds_from(now),
		}
	}
}
impl<F, S> From<(F, S)> for Window
where
	F: Into<Ttl>,
	S: Into<Ttl>,
{
	fn from((fresh, stale): (F, S)) -> Self {
		Self::new(fresh, stale)
	}
}

/// A window resolved to non-negative seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds {
	/// Fresh bound in seconds.
	pub fresh_secs: u64,
	/// Stale bound in seconds.
	pub stale_secs: u64,
}
impl Bounds {
	/// Physical TTL applied to both the value and its companion timestamp.
	pub fn store_ttl(&self) -> Duration {
		Duration::from_secs(self.stale_secs)
	}
}

/// Classification of a cached entry's age.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
	/// No trustworthy record: value or timestamp absent.
	Missing,
	/// Within the fresh bound.
	Fresh,
	/// Past the fresh bound but within the stale bound.
	Stale,
	/// Past the stale bound.
	Expired,
}

/// Classify an entry created at `created_at` (unix seconds) as seen at `now`.
///
/// Both boundaries are inclusive. A creation time in the future counts as zero elapsed.
pub fn evaluate(now: i64, created_at: Option<i64>, bounds: Bounds) -> Freshness {
	let Some(created_at) = created_at else {
		return Freshness::Missing;
	};
	let elapsed = now.saturating_sub(created_at).max(0) as u64;

	if elapsed <= bounds.fresh_secs {
		Freshness::Fresh
	} else if elapsed <= bounds.stale_secs {
		Freshness::Stale
	} else {
		Freshness::Expired
	}
}
