//! Turns transport responses into payloads or categorized errors.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{_prelude::*, error::ApiError, http::HttpResponse};

/// Decodes a success body into `R`, or builds an [`ApiError`] for any other status.
///
/// Empty success bodies read as JSON `null`. Undecodable success bodies become
/// [`Error::MalformedResponse`]; error bodies are parsed best-effort for a server message.
pub(crate) fn into_result<R>(response: &HttpResponse, now: OffsetDateTime) -> Result<R>
where
	R: DeserializeOwned,
{
	let status = response.status;

	if response.is_success() {
		let body: &[u8] = if response.body.iter().all(u8::is_ascii_whitespace) {
			b"null"
		} else {
			&response.body
		};
		let mut deserializer = serde_json::Deserializer::from_slice(body);

		return serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| Error::MalformedResponse { status, source });
	}

	let details = serde_json::from_slice::<serde_json::Value>(&response.body).ok();
	let retry_after = match status {
		429 | 503 => response.retry_after(now),
		_ => None,
	};

	Err(ApiError::from_status(status, details).with_retry_after(retry_after).into())
}
