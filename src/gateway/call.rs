//! Caller-facing description of one API call.

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	http::{Headers, Method},
};

/// Method, target, headers, query, and body of a gateway call.
///
/// `path` is resolved against the configured base URL unless it is already absolute.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCall {
	/// Verb.
	pub method: Method,
	/// Relative path or absolute URL.
	pub path: String,
	/// Caller headers; they override default headers with the same name.
	pub headers: Headers,
	/// Query pairs appended to the resolved URL.
	pub query: Vec<(String, String)>,
	/// Raw body bytes.
	pub body: Option<Vec<u8>>,
}
impl ApiCall {
	/// Creates a call without headers, query, or body.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self { method, path: path.into(), headers: Headers::new(), query: Vec::new(), body: None }
	}

	/// `GET path`.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::Get, path)
	}

	/// `POST path`.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::Post, path)
	}

	/// `PUT path`.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::Put, path)
	}

	/// `PATCH path`.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::Patch, path)
	}

	/// `DELETE path`.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::Delete, path)
	}

	/// Adds or replaces a header.
	pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}

	/// Appends a query pair.
	pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((name.into(), value.into()));

		self
	}

	/// Sets a raw body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Serializes `body` as the JSON payload.
	pub fn json<B>(mut self, body: &B) -> Result<Self, ConfigError>
	where
		B: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_vec(body)?);

		Ok(self.with_header("content-type", "application/json"))
	}
}
impl Debug for ApiCall {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiCall")
			.field("method", &self.method)
			.field("path", &self.path)
			.field("headers", &self.headers.keys().collect::<Vec<_>>())
			.field("query", &self.query)
			.field("body_len", &self.body.as_ref().map(Vec::len))
			.finish()
	}
}
