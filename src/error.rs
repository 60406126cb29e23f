//! Crate-wide error types and `Result` alias.

// self
use crate::cache::scheduler::FlushReport;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by caller-supplied compute functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for the flexible cache crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Join(#[from] tokio::task::JoinError),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),

	#[cfg(feature = "redis")]
	#[error(transparent)]
	Redis(#[from] redis::RedisError),

	#[error("Compute failed for key '{key}': {source}")]
	Compute {
		key: String,
		#[source]
		source: BoxError,
	},
	#[error("Metrics error: {0}")]
	Metrics(String),
	#[error("Deferred refresh failed for {} key(s).", .failures.len())]
	RefreshFailed { failures: Vec<RefreshFailure>, report: FlushReport },
	#[error("Store error: {0}")]
	Store(String),
	#[error("Cache store '{0}' is not configured.")]
	UnknownStore(String),
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}
impl Error {
	/// Wrap a caller compute failure for `key`.
	pub fn compute(key: impl Into<String>, source: impl Into<BoxError>) -> Self {
		Self::Compute { key: key.into(), source: source.into() }
	}
}
#[cfg(feature = "prometheus")]
impl From<metrics_exporter_prometheus::BuildError> for Error {
	fn from(value: metrics_exporter_prometheus::BuildError) -> Self {
		Self::Metrics(value.to_string())
	}
}

/// A deferred refresh that failed during a flush.
#[derive(Debug)]
pub struct RefreshFailure {
	/// Cache key whose refresh failed.
	pub key: String,
	/// Store the refresh targeted.
	pub store: String,
	/// Underlying failure.
	pub error: Error,
}
