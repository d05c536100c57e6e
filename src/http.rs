//! Transport primitives for gateway calls.
//!
//! [`HttpTransport`] is the gateway's only dependency on an HTTP stack. Requests and
//! responses are plain owned values so custom transports (in-process stubs, platform
//! clients, recorded fixtures) can implement the trait without pulling in `reqwest`.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::TransportError};

/// Header map keyed by lowercase header name.
pub type Headers = BTreeMap<String, String>;

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP clients able to execute gateway requests.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by the
/// gateway and its session manager, and the returned future must be `Send` so refresh
/// cycles can be shared across tasks. Timeouts are the transport's responsibility and must
/// surface as [`TransportError::Timeout`].
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes `request` and returns the full response.
	fn send(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// HTTP verbs used by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
}
impl Method {
	/// Returns the canonical verb.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Fully resolved outbound request.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpRequest {
	/// Verb.
	pub method: Method,
	/// Absolute target.
	pub url: Url,
	/// Lowercase header names mapped to values.
	pub headers: Headers,
	/// Raw body bytes.
	pub body: Option<Vec<u8>>,
}
impl HttpRequest {
	/// Creates a request without headers or body.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: Headers::new(), body: None }
	}

	/// Sets a header, replacing any previous value (names are case-insensitive).
	pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}

	/// Sets the body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Looks up a header by case-insensitive name.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}
}
impl Debug for HttpRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpRequest")
			.field("method", &self.method)
			.field("url", &self.url.as_str())
			.field("headers", &self.headers.keys().collect::<Vec<_>>())
			.field("body_len", &self.body.as_ref().map(Vec::len))
			.finish()
	}
}

/// Response returned by a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
	/// Status code.
	pub status: u16,
	/// Lowercase header names mapped to values.
	pub headers: Headers,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl HttpResponse {
	/// Creates a response with the given status and body.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: Headers::new(), body: body.into() }
	}

	/// Sets a header.
	pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Reads `Retry-After` as either delay seconds or an HTTP date relative to `now`.
	pub fn retry_after(&self, now: OffsetDateTime) -> Option<Duration> {
		let raw = self.headers.get("retry-after")?.trim();

		if let Ok(secs) = raw.parse::<u64>() {
			return Some(Duration::seconds(secs.min(i64::MAX as u64) as i64));
		}
		if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
			let delta = moment - now;

			if delta.is_positive() {
				return Some(delta);
			}
		}

		None
	}
}

/// [`HttpTransport`] backed by a shared [`ReqwestClient`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client that gives up after `timeout`, surfacing [`TransportError::Timeout`].
	pub fn with_timeout(
		timeout: std::time::Duration,
	) -> Result<Self, crate::error::ConfigError> {
		Ok(Self(ReqwestClient::builder().timeout(timeout).build()?))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let method = match request.method {
				Method::Get => reqwest::Method::GET,
				Method::Post => reqwest::Method::POST,
				Method::Put => reqwest::Method::PUT,
				Method::Patch => reqwest::Method::PATCH,
				Method::Delete => reqwest::Method::DELETE,
			};
			let mut builder = client.request(method, request.url);

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if let Some(body) = request.body {
				builder = builder.body(body);
			}

			let response = builder.send().await?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect();
			let body = response.bytes().await?.to_vec();

			Ok(HttpResponse { status, headers, body })
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn header_names_are_case_insensitive() {
		let url =
			Url::parse("https://api.example.com/v1/items").expect("Fixture URL should parse.");
		let request = HttpRequest::new(Method::Get, url)
			.with_header("Authorization", "Bearer secret")
			.with_header("authorization", "Bearer rotated");

		assert_eq!(request.headers.len(), 1);
		assert_eq!(request.header("AUTHORIZATION"), Some("Bearer rotated"));
		assert!(!format!("{request:?}").contains("rotated"));
	}

	#[test]
	fn retry_after_accepts_seconds_and_dates() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let seconds = HttpResponse::new(429, "").with_header("Retry-After", "120");
		let date = HttpResponse::new(429, "")
			.with_header("Retry-After", "Wed, 01 Jan 2025 00:01:30 +0000");
		let past = HttpResponse::new(429, "")
			.with_header("Retry-After", "Tue, 31 Dec 2024 23:00:00 +0000");

		assert_eq!(seconds.retry_after(now), Some(Duration::minutes(2)));
		assert_eq!(date.retry_after(now), Some(Duration::seconds(90)));
		assert_eq!(past.retry_after(now), None);
		assert_eq!(HttpResponse::new(429, "").retry_after(now), None);
	}
}
