//! Wall-clock capability injected into every time-sensitive component.
//!
//! Nothing in the crate calls `OffsetDateTime::now_utc` directly outside [`SystemClock`];
//! swap in a [`ManualClock`] to drive expiry, refresh thresholds, and rate-limit windows
//! deterministically.

// self
use crate::_prelude::*;

/// Source of "now" for token expiry and rate-limit bookkeeping.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Returns the current instant.
	fn now(&self) -> OffsetDateTime;
}

/// Clock backed by the operating system's UTC time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Clock that only moves when told to. Clones share the same instant.
#[derive(Clone, Debug)]
pub struct ManualClock(Arc<Mutex<OffsetDateTime>>);
impl ManualClock {
	/// Creates a clock frozen at `start`.
	pub fn new(start: OffsetDateTime) -> Self {
		Self(Arc::new(Mutex::new(start)))
	}

	/// Moves the clock forward (or backward for negative durations).
	pub fn advance(&self, by: Duration) {
		*self.0.lock() += by;
	}

	/// Jumps to an absolute instant.
	pub fn set(&self, instant: OffsetDateTime) {
		*self.0.lock() = instant;
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.0.lock()
	}
}

/// Milliseconds since the Unix epoch.
pub(crate) fn unix_millis(instant: OffsetDateTime) -> i64 {
	(instant.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Inverse of [`unix_millis`]; `None` when out of range.
pub(crate) fn from_unix_millis(millis: i64) -> Option<OffsetDateTime> {
	OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}
