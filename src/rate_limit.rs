//! Process-local attempt throttling with an escalating block.
//!
//! Each [`RateLimiter`] counts attempts per caller-supplied identifier inside a fixed window.
//! Exceeding the budget blocks the identifier until the block duration has passed since its
//! last counted attempt. A lapsed block does not reset the count on its own: the identifier is
//! unblocked only once its window has also expired. State is advisory: it lives in this
//! process only and must be paired with server-side enforcement.

pub mod policy;

pub use policy::*;

// crates.io
use time::PrimitiveDateTime;
// self
use crate::{_prelude::*, clock::Clock, error::ConfigError, obs};

/// Result emitted by [`RateLimiter::check`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
	/// The attempt may proceed.
	Allow,
	/// The attempt is refused until the directive says otherwise.
	Deny(RetryDirective),
}
impl RateLimitDecision {
	/// Returns `true` for [`RateLimitDecision::Allow`].
	pub fn is_allowed(&self) -> bool {
		matches!(self, Self::Allow)
	}
}

/// Advises callers when to retry after a [`RateLimitDecision::Deny`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Instant when the block lifts.
	pub earliest_retry_at: OffsetDateTime,
	/// Time left until `earliest_retry_at`.
	pub remaining: Duration,
	/// Descriptive reason.
	pub reason: String,
}
impl RetryDirective {
	/// Remaining block rounded up to whole minutes.
	pub fn remaining_minutes(&self) -> u64 {
		ceil_minutes(self.remaining)
	}
}

/// Per-identifier counters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitEntry {
	/// Caller-supplied key (email, action name, ...).
	pub identifier: String,
	/// Attempts counted in the current window.
	pub attempt_count: u32,
	/// Start of the current window.
	pub window_started_at: OffsetDateTime,
	/// Last counted attempt; the block is measured from here.
	pub last_attempt_at: OffsetDateTime,
	/// Whether the identifier exceeded its budget.
	pub blocked: bool,
}
impl RateLimitEntry {
	fn fresh(identifier: &str, now: OffsetDateTime) -> Self {
		Self {
			identifier: identifier.to_owned(),
			attempt_count: 1,
			window_started_at: now,
			last_attempt_at: now,
			blocked: false,
		}
	}

	fn restart(&mut self, now: OffsetDateTime) {
		self.attempt_count = 1;
		self.window_started_at = now;
		self.last_attempt_at = now;
		self.blocked = false;
	}

	fn block_remaining(&self, block: Duration, now: OffsetDateTime) -> Option<Duration> {
		if !self.blocked {
			return None;
		}

		let remaining = block - (now - self.last_attempt_at);

		remaining.is_positive().then_some(remaining)
	}
}

/// Fixed-window limiter for one action class.
pub struct RateLimiter {
	label: &'static str,
	policy: RateLimitPolicy,
	clock: Arc<dyn Clock>,
	entries: Mutex<HashMap<String, RateLimitEntry>>,
}
impl RateLimiter {
	/// Creates a limiter with a custom policy, validating it first.
	pub fn new(policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
		policy.validate()?;

		Ok(Self::with_label("custom", policy, clock))
	}

	/// Creates a limiter with the default budget for `action`.
	pub fn for_action(action: ActionClass, clock: Arc<dyn Clock>) -> Self {
		Self::with_label(action.as_str(), action.default_policy(), clock)
	}

	fn with_label(label: &'static str, policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
		Self { label, policy, clock, entries: Mutex::new(HashMap::new()) }
	}

	/// Budget enforced by this limiter.
	pub fn policy(&self) -> RateLimitPolicy {
		self.policy
	}

	/// Records an attempt for `identifier` and decides whether it may proceed.
	pub fn check(&self, identifier: &str) -> RateLimitDecision {
		let now = self.clock.now();
		let block = self.policy.block();
		let window = self.policy.window();
		let decision = {
			let mut entries = self.entries.lock();

			match entries.get_mut(identifier) {
				None => {
					entries.insert(identifier.to_owned(), RateLimitEntry::fresh(identifier, now));

					RateLimitDecision::Allow
				},
				Some(entry) => match entry.block_remaining(block, now) {
					Some(remaining) => self.deny(entry, remaining, now),
					None if now - entry.window_started_at > window => {
						entry.restart(now);

						RateLimitDecision::Allow
					},
					None => {
						entry.attempt_count = entry.attempt_count.saturating_add(1);
						entry.last_attempt_at = now;

						if entry.attempt_count > self.policy.max_attempts {
							entry.blocked = true;

							self.deny(entry, block, now)
						} else {
							RateLimitDecision::Allow
						}
					},
				},
			}
		};

		obs::record_rate_limit(self.label, decision.is_allowed());

		decision
	}

	/// Boolean form of [`Self::check`].
	pub fn is_allowed(&self, identifier: &str) -> bool {
		self.check(identifier).is_allowed()
	}

	/// Whole minutes (rounded up) until `identifier` is unblocked; `0` when not blocked.
	pub fn blocked_time_remaining(&self, identifier: &str) -> u64 {
		let now = self.clock.now();

		self.entries
			.lock()
			.get(identifier)
			.and_then(|entry| entry.block_remaining(self.policy.block(), now))
			.map_or(0, ceil_minutes)
	}

	/// Snapshot of the counters for `identifier`.
	pub fn entry(&self, identifier: &str) -> Option<RateLimitEntry> {
		self.entries.lock().get(identifier).cloned()
	}

	fn deny(
		&self,
		entry: &RateLimitEntry,
		remaining: Duration,
		now: OffsetDateTime,
	) -> RateLimitDecision {
		RateLimitDecision::Deny(RetryDirective {
			earliest_retry_at: now
				.checked_add(remaining)
				.unwrap_or_else(|| PrimitiveDateTime::MAX.assume_utc()),
			remaining,
			reason: format!(
				"{} attempts for `{}` exceeded {} per {} ms",
				self.label, entry.identifier, self.policy.max_attempts, self.policy.window_ms
			),
		})
	}
}
impl Debug for RateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateLimiter")
			.field("label", &self.label)
			.field("policy", &self.policy)
			.field("tracked", &self.entries.lock().len())
			.finish()
	}
}

/// The three limiters owned by one gateway.
#[derive(Debug)]
pub struct RateLimiters {
	/// Sign-in and registration.
	pub authentication: RateLimiter,
	/// Search.
	pub search: RateLimiter,
	/// Contact forms.
	pub contact: RateLimiter,
}
impl RateLimiters {
	/// Builds every limiter with its default budget.
	pub fn new(clock: Arc<dyn Clock>) -> Self {
		Self {
			authentication: RateLimiter::for_action(ActionClass::Authentication, clock.clone()),
			search: RateLimiter::for_action(ActionClass::Search, clock.clone()),
			contact: RateLimiter::for_action(ActionClass::Contact, clock),
		}
	}

	/// Limiter for `action`.
	pub fn for_action(&self, action: ActionClass) -> &RateLimiter {
		match action {
			ActionClass::Authentication => &self.authentication,
			ActionClass::Search => &self.search,
			ActionClass::Contact => &self.contact,
		}
	}
}

fn ceil_minutes(remaining: Duration) -> u64 {
	let millis = remaining.whole_milliseconds().max(0) as u64;

	millis.div_ceil(60_000)
}
