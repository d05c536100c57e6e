//! Attempt budgets for each action class.

// self
use crate::{_prelude::*, error::ConfigError};

/// Fixed-window attempt budget with an escalating block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
	/// Attempts allowed inside one window.
	pub max_attempts: u32,
	/// Window length in milliseconds.
	pub window_ms: u64,
	/// Block length in milliseconds once the budget is exceeded.
	pub block_ms: u64,
}
impl RateLimitPolicy {
	/// Sign-in and sign-up: 5 attempts per 15 minutes, then a 30 minute block.
	pub const AUTHENTICATION: Self =
		Self { max_attempts: 5, window_ms: 15 * 60_000, block_ms: 30 * 60_000 };
	/// Catalogue search: 30 attempts per minute, then a 5 minute block.
	pub const SEARCH: Self = Self { max_attempts: 30, window_ms: 60_000, block_ms: 5 * 60_000 };
	/// Contact forms: 3 attempts per hour, then a 1 hour block.
	pub const CONTACT: Self = Self { max_attempts: 3, window_ms: 3_600_000, block_ms: 3_600_000 };

	/// Longest accepted window or block: 366 days, in milliseconds.
	pub const MAX_SPAN_MS: u64 = 366 * 24 * 3_600_000;

	/// Creates a validated policy.
	pub fn new(max_attempts: u32, window_ms: u64, block_ms: u64) -> Result<Self, ConfigError> {
		let policy = Self { max_attempts, window_ms, block_ms };

		policy.validate()?;

		Ok(policy)
	}

	/// Checks that every field is positive and that spans stay within [`Self::MAX_SPAN_MS`].
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_attempts == 0 {
			return Err(ConfigError::InvalidRateLimitPolicy {
				reason: "max_attempts must be positive",
			});
		}
		if self.window_ms == 0 {
			return Err(ConfigError::InvalidRateLimitPolicy {
				reason: "window_ms must be positive",
			});
		}
		if self.block_ms == 0 {
			return Err(ConfigError::InvalidRateLimitPolicy { reason: "block_ms must be positive" });
		}
		if self.window_ms > Self::MAX_SPAN_MS || self.block_ms > Self::MAX_SPAN_MS {
			return Err(ConfigError::InvalidRateLimitPolicy {
				reason: "window_ms and block_ms must not exceed 366 days",
			});
		}

		Ok(())
	}

	/// Window length.
	pub fn window(&self) -> Duration {
		Duration::milliseconds(self.window_ms as i64)
	}

	/// Block length.
	pub fn block(&self) -> Duration {
		Duration::milliseconds(self.block_ms as i64)
	}
}

/// Action classes with independent budgets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionClass {
	/// Sign-in and registration attempts.
	Authentication,
	/// Search queries.
	Search,
	/// Contact and messaging forms.
	Contact,
}
impl ActionClass {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ActionClass::Authentication => "authentication",
			ActionClass::Search => "search",
			ActionClass::Contact => "contact",
		}
	}

	/// Default budget for the class.
	pub const fn default_policy(self) -> RateLimitPolicy {
		match self {
			ActionClass::Authentication => RateLimitPolicy::AUTHENTICATION,
			ActionClass::Search => RateLimitPolicy::SEARCH,
			ActionClass::Contact => RateLimitPolicy::CONTACT,
		}
	}
}
impl Display for ActionClass {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn presets_are_valid() {
		for class in [ActionClass::Authentication, ActionClass::Search, ActionClass::Contact] {
			class.default_policy().validate().expect("Preset policy should validate.");
		}

		assert_eq!(RateLimitPolicy::AUTHENTICATION.window(), Duration::minutes(15));
		assert_eq!(RateLimitPolicy::AUTHENTICATION.block(), Duration::minutes(30));
	}

	#[test]
	fn zero_values_are_rejected() {
		for (max, window, block) in [(0, 1, 1), (1, 0, 1), (1, 1, 0)] {
			assert!(matches!(
				RateLimitPolicy::new(max, window, block),
				Err(ConfigError::InvalidRateLimitPolicy { .. })
			));
		}
	}

	#[test]
	fn oversized_spans_are_rejected() {
		let max = RateLimitPolicy::MAX_SPAN_MS;

		assert!(RateLimitPolicy::new(1, max, max).is_ok());

		for (window, block) in [(max + 1, 1_000), (1_000, max + 1), (1_000, i64::MAX as u64)] {
			assert!(matches!(
				RateLimitPolicy::new(1, window, block),
				Err(ConfigError::InvalidRateLimitPolicy { .. })
			));
		}
	}

	#[test]
	fn deserialized_policies_keep_millisecond_fields() {
		let policy: RateLimitPolicy =
			serde_json::from_str(r#"{"max_attempts":2,"window_ms":1000,"block_ms":5000}"#)
				.expect("Policy fixture should deserialize.");

		assert_eq!(policy, RateLimitPolicy { max_attempts: 2, window_ms: 1_000, block_ms: 5_000 });
	}
}
