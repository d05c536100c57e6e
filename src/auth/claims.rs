//! Claims carried in the payload segment of a bearer token.

// self
use crate::_prelude::*;

/// Token purpose recorded in the `type` claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
	/// Short-lived token attached to API calls.
	Access,
	/// Long-lived token used only to mint new access tokens.
	Refresh,
}
impl TokenType {
	/// Returns the wire label.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenType::Access => "access",
			TokenType::Refresh => "refresh",
		}
	}
}
impl Display for TokenType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Decoded token payload. Timestamps are Unix seconds, as on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
	/// Subject (user identifier).
	#[serde(rename = "sub")]
	pub subject: String,
	/// Account email, when the issuer includes it.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	/// Account role, when the issuer includes it.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
	/// Issued-at instant.
	#[serde(rename = "iat")]
	pub issued_at: i64,
	/// Expiry instant.
	#[serde(rename = "exp")]
	pub expires_at: i64,
	/// Access or refresh.
	#[serde(rename = "type")]
	pub token_type: TokenType,
}
impl Claims {
	/// Creates claims for `subject` valid between `issued_at` and `expires_at`.
	pub fn new(
		subject: impl Into<String>,
		token_type: TokenType,
		issued_at: OffsetDateTime,
		expires_at: OffsetDateTime,
	) -> Self {
		Self {
			subject: subject.into(),
			email: None,
			role: None,
			issued_at: issued_at.unix_timestamp(),
			expires_at: expires_at.unix_timestamp(),
			token_type,
		}
	}

	/// Sets the email claim.
	pub fn with_email(mut self, email: impl Into<String>) -> Self {
		self.email = Some(email.into());

		self
	}

	/// Sets the role claim.
	pub fn with_role(mut self, role: impl Into<String>) -> Self {
		self.role = Some(role.into());

		self
	}

	/// Expiry as an instant; `None` if the claim is out of range.
	pub fn expires_at_instant(&self) -> Option<OffsetDateTime> {
		OffsetDateTime::from_unix_timestamp(self.expires_at).ok()
	}

	/// `true` once `exp` lies strictly before `now`.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at < now.unix_timestamp()
	}

	/// `true` when fewer than `threshold` remain before `exp`.
	pub fn expires_within(&self, threshold: Duration, now: OffsetDateTime) -> bool {
		self.expires_at.saturating_sub(now.unix_timestamp()) < threshold.whole_seconds()
	}
}
