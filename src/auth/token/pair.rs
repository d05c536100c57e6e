//! Token grants returned by the server and the credential pair derived from them.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Errors raised when a grant cannot become a credential pair.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum GrantError {
	/// Grant carried an empty access token.
	#[error("Grant is missing an access token.")]
	MissingAccessToken,
	/// Grant carried an empty refresh token.
	#[error("Grant is missing a refresh token.")]
	MissingRefreshToken,
	/// Grant lifetime must be positive.
	#[error("Grant expires_in must be positive, got {expires_in}.")]
	NonPositiveExpiresIn {
		/// Rejected lifetime in seconds.
		expires_in: i64,
	},
	/// Grant lifetime exceeds [`TokenGrant::MAX_EXPIRES_IN`] or the representable calendar.
	#[error("Grant expires_in is out of range, got {expires_in}.")]
	ExpiresInOutOfRange {
		/// Rejected lifetime in seconds.
		expires_in: i64,
	},
}

/// Wire shape of login, register, and refresh responses.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
	/// Newly minted access token.
	pub access_token: TokenSecret,
	/// Refresh token paired with `access_token`.
	pub refresh_token: TokenSecret,
	/// Access token lifetime in seconds.
	pub expires_in: i64,
}
impl TokenGrant {
	/// Longest accepted access token lifetime: ten years, in seconds.
	pub const MAX_EXPIRES_IN: i64 = 10 * 365 * 24 * 60 * 60;

	/// Creates a grant from raw token strings.
	pub fn new(
		access_token: impl Into<String>,
		refresh_token: impl Into<String>,
		expires_in: i64,
	) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: TokenSecret::new(refresh_token),
			expires_in,
		}
	}

	/// Rejects grants with empty tokens or a lifetime outside `1..=MAX_EXPIRES_IN`.
	pub fn validate(&self) -> Result<(), GrantError> {
		if self.access_token.is_empty() {
			return Err(GrantError::MissingAccessToken);
		}
		if self.refresh_token.is_empty() {
			return Err(GrantError::MissingRefreshToken);
		}
		if self.expires_in <= 0 {
			return Err(GrantError::NonPositiveExpiresIn { expires_in: self.expires_in });
		}
		if self.expires_in > Self::MAX_EXPIRES_IN {
			return Err(GrantError::ExpiresInOutOfRange { expires_in: self.expires_in });
		}

		Ok(())
	}
}
impl Debug for TokenGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenGrant")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("expires_in", &self.expires_in)
			.finish()
	}
}

/// The stored credential unit. All three fields are always written and cleared together.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialPair {
	/// Token attached to API calls.
	pub access_token: TokenSecret,
	/// Token used to mint the next pair.
	pub refresh_token: TokenSecret,
	/// Absolute access token expiry.
	pub access_expires_at: OffsetDateTime,
}
impl CredentialPair {
	/// Builds a pair from a validated grant, anchoring the lifetime at `now`.
	pub fn from_grant(grant: &TokenGrant, now: OffsetDateTime) -> Result<Self, GrantError> {
		grant.validate()?;

		let access_expires_at = now
			.checked_add(Duration::seconds(grant.expires_in))
			.ok_or(GrantError::ExpiresInOutOfRange { expires_in: grant.expires_in })?;

		Ok(Self {
			access_token: grant.access_token.clone(),
			refresh_token: grant.refresh_token.clone(),
			access_expires_at,
		})
	}

	/// `true` once `now` reaches the stored expiry.
	pub fn is_access_expired_at(&self, now: OffsetDateTime) -> bool {
		now >= self.access_expires_at
	}

	/// `true` when less than `window` remains before the stored expiry.
	pub fn access_expires_within(&self, window: Duration, now: OffsetDateTime) -> bool {
		self.access_expires_at - now < window
	}
}
impl Debug for CredentialPair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialPair")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("access_expires_at", &self.access_expires_at)
			.finish()
	}
}
