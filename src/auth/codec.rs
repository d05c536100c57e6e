//! Advisory decoding for compact three-segment bearer tokens.
//!
//! The codec never verifies signatures. It only reads the payload segment so the client
//! can decide when to refresh; the server stays the authority on whether a token is
//! acceptable. Every validity helper is fail-closed: anything that does not decode counts
//! as expired.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, auth::Claims};

const SEGMENTS: usize = 3;
const UNSIGNED_HEADER: &str = r#"{"alg":"none","typ":"JWT"}"#;

/// Why a token could not be decoded.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TokenDecodeError {
	/// Token did not have exactly three dot-separated segments.
	#[error("Token must contain exactly 3 segments, found {found}.")]
	SegmentCount {
		/// Number of segments observed.
		found: usize,
	},
	/// Payload segment is not base64url.
	#[error("Token payload is not valid base64url.")]
	Encoding,
	/// Payload decoded but is not a claims object.
	#[error("Token payload is not a valid claims object: {message}.")]
	Payload {
		/// Parser message.
		message: String,
	},
}

/// Stateless decoder for compact tokens.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokenCodec;
impl TokenCodec {
	/// Decodes the payload segment into [`Claims`].
	pub fn decode(&self, token: &str) -> Result<Claims, TokenDecodeError> {
		let segments = token.split('.').collect::<Vec<_>>();

		if segments.len() != SEGMENTS {
			return Err(TokenDecodeError::SegmentCount { found: segments.len() });
		}

		let payload = URL_SAFE_NO_PAD
			.decode(segments[1].trim_end_matches('='))
			.map_err(|_| TokenDecodeError::Encoding)?;

		serde_json::from_slice(&payload)
			.map_err(|e| TokenDecodeError::Payload { message: e.to_string() })
	}

	/// `true` if the token is undecodable or its `exp` lies before `now`.
	pub fn is_expired(&self, token: &str, now: OffsetDateTime) -> bool {
		match self.decode(token) {
			Ok(claims) => claims.is_expired_at(now),
			Err(_) => true,
		}
	}

	/// `true` if the token is undecodable or expires within `threshold` of `now`.
	pub fn is_expiring_within(
		&self,
		token: &str,
		threshold: Duration,
		now: OffsetDateTime,
	) -> bool {
		match self.decode(token) {
			Ok(claims) => claims.expires_within(threshold, now),
			Err(_) => true,
		}
	}

	/// Encodes claims into an unsigned token for fixtures and offline stubs.
	///
	/// Servers must reject these; they exist so local tooling can exercise the decode path.
	pub fn encode_unsigned(&self, claims: &Claims) -> String {
		// Serializing a struct of strings and integers cannot fail.
		let payload = serde_json::to_vec(claims).unwrap_or_default();

		format!(
			"{}.{}.{}",
			URL_SAFE_NO_PAD.encode(UNSIGNED_HEADER),
			URL_SAFE_NO_PAD.encode(payload),
			URL_SAFE_NO_PAD.encode("unsigned"),
		)
	}
}
