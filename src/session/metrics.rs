// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Refresh cycle counters. Always on, independent of the `metrics` feature.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	successes: AtomicU64,
	failures: AtomicU64,
	coalesced: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the number of refresh cycles started.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of cycles that stored a new pair.
	pub fn successes(&self) -> u64 {
		self.successes.load(Ordering::Relaxed)
	}

	/// Returns the number of cycles that ended the session.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Returns the number of callers that joined a cycle already in flight.
	pub fn coalesced(&self) -> u64 {
		self.coalesced.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.successes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_coalesced(&self) {
		self.coalesced.fetch_add(1, Ordering::Relaxed);
	}
}
