//! Freshness evaluation, deferred refresh, and the flexible read path.

pub mod executor;
pub mod freshness;
pub mod manager;
pub mod scheduler;
pub mod timestamp;
