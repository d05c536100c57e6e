//! Gateway-level error taxonomy shared by the session, store, and transport layers.

// self
use crate::_prelude::*;

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error categories surfaced to presentation layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	/// No credentials are available for the call.
	NotAuthenticated,
	/// The session ended and the user must sign in again.
	SessionExpired,
	/// Request payload was rejected (400/422).
	Validation,
	/// Request conflicts with existing state (409).
	Conflict,
	/// Caller is throttled, locally or by the server (429).
	RateLimited,
	/// Target resource does not exist (404).
	NotFound,
	/// Caller lacks permission (403).
	Forbidden,
	/// Server-side failure (5xx).
	ServerUnavailable,
	/// Connection-level failure (DNS, refused, reset).
	NetworkError,
	/// Transport gave up waiting for the server.
	Timeout,
	/// Server answered with a body that could not be decoded.
	MalformedResponse,
	/// Anything not covered above.
	Unknown,
}
impl ErrorKind {
	/// Returns a stable label suitable for logs or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ErrorKind::NotAuthenticated => "not_authenticated",
			ErrorKind::SessionExpired => "session_expired",
			ErrorKind::Validation => "validation",
			ErrorKind::Conflict => "conflict",
			ErrorKind::RateLimited => "rate_limited",
			ErrorKind::NotFound => "not_found",
			ErrorKind::Forbidden => "forbidden",
			ErrorKind::ServerUnavailable => "server_unavailable",
			ErrorKind::NetworkError => "network_error",
			ErrorKind::Timeout => "timeout",
			ErrorKind::MalformedResponse => "malformed_response",
			ErrorKind::Unknown => "unknown",
		}
	}

	/// Fallback user-facing text used when the server supplied none.
	pub const fn default_message(self) -> &'static str {
		match self {
			ErrorKind::NotAuthenticated => "Authentication required.",
			ErrorKind::SessionExpired => "Your session has expired. Please sign in again.",
			ErrorKind::Validation => "The request contains invalid data.",
			ErrorKind::Conflict => "The request conflicts with existing data.",
			ErrorKind::RateLimited => "Too many requests. Please try again later.",
			ErrorKind::NotFound => "The requested resource was not found.",
			ErrorKind::Forbidden => "You do not have permission to perform this action.",
			ErrorKind::ServerUnavailable =>
				"The server is temporarily unavailable. Please try again later.",
			ErrorKind::NetworkError => "Unable to reach the server. Check your connection.",
			ErrorKind::Timeout => "The request timed out.",
			ErrorKind::MalformedResponse => "The server returned an unexpected response.",
			ErrorKind::Unknown => "An unexpected error occurred.",
		}
	}

	/// Maps an HTTP status code onto the taxonomy.
	pub const fn from_status(status: u16) -> Self {
		match status {
			400 | 422 => ErrorKind::Validation,
			401 => ErrorKind::NotAuthenticated,
			403 => ErrorKind::Forbidden,
			404 => ErrorKind::NotFound,
			409 => ErrorKind::Conflict,
			429 => ErrorKind::RateLimited,
			500..=599 => ErrorKind::ServerUnavailable,
			_ => ErrorKind::Unknown,
		}
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Server answered with a non-success status.
	#[error(transparent)]
	Api(#[from] ApiError),
	/// Token grant was missing a token or carried a non-positive lifetime.
	#[error(transparent)]
	Grant(#[from] crate::auth::GrantError),

	/// Success response whose body could not be decoded.
	#[error("Response body could not be decoded (HTTP {status}).")]
	MalformedResponse {
		/// HTTP status code of the undecodable response.
		status: u16,
		/// Structured decoding failure, including the failing path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// No credentials are stored for the call.
	#[error("No credentials are stored; sign in first.")]
	NotAuthenticated,
	/// Refresh failed; credentials were cleared and the session-expired signal published.
	#[error("Session expired; sign in again.")]
	SessionExpired,
}
impl Error {
	/// Classifies the error into the canonical taxonomy.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Error::Storage(_) | Error::Config(_) => ErrorKind::Unknown,
			Error::Transport(e) if e.is_timeout() => ErrorKind::Timeout,
			Error::Transport(_) => ErrorKind::NetworkError,
			Error::Api(e) => e.kind,
			Error::MalformedResponse { .. } | Error::Grant(_) => ErrorKind::MalformedResponse,
			Error::NotAuthenticated => ErrorKind::NotAuthenticated,
			Error::SessionExpired => ErrorKind::SessionExpired,
		}
	}

	/// HTTP status associated with the failure, when one was observed.
	pub fn status(&self) -> Option<u16> {
		match self {
			Error::Api(e) => e.status,
			Error::MalformedResponse { status, .. } => Some(*status),
			_ => None,
		}
	}

	/// Message suitable for end users; prefers server-supplied text.
	pub fn user_message(&self) -> &str {
		match self {
			Error::Api(e) => e.message(),
			_ => self.kind().default_message(),
		}
	}
}

/// Non-success response from the server, classified by status.
#[derive(Clone, Debug)]
pub struct ApiError {
	/// Canonical category derived from the status code.
	pub kind: ErrorKind,
	/// HTTP status code; `None` when the rejection was produced locally.
	pub status: Option<u16>,
	/// Message supplied by the server (`message`, `error`, or `detail` field).
	pub server_message: Option<String>,
	/// Parsed error body, kept for callers that render field-level details.
	pub details: Option<serde_json::Value>,
	/// Retry hint from `Retry-After` or a local rate limiter.
	pub retry_after: Option<Duration>,
}
impl ApiError {
	const MESSAGE_FIELDS: [&'static str; 3] = ["message", "error", "detail"];

	/// Builds an error for `status`, pulling the server message out of `body` if present.
	pub fn from_status(status: u16, body: Option<serde_json::Value>) -> Self {
		let server_message = body.as_ref().and_then(extract_server_message);

		Self {
			kind: ErrorKind::from_status(status),
			status: Some(status),
			server_message,
			details: body,
			retry_after: None,
		}
	}

	/// Local throttling rejection that never reached the server.
	pub fn throttled(retry_after: Duration, minutes: u64) -> Self {
		Self {
			kind: ErrorKind::RateLimited,
			status: None,
			server_message: Some(format!("Too many attempts. Try again in {minutes} minute(s).")),
			details: None,
			retry_after: Some(retry_after),
		}
	}

	/// Attaches a retry hint.
	pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
		self.retry_after = retry_after;

		self
	}

	/// Server-supplied message, falling back to the canonical text for [`Self::kind`].
	pub fn message(&self) -> &str {
		self.server_message.as_deref().unwrap_or(self.kind.default_message())
	}
}
impl Display for ApiError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self.status {
			Some(status) => write!(f, "HTTP {status} ({}): {}", self.kind, self.message()),
			None => write!(f, "{}: {}", self.kind, self.message()),
		}
	}
}
impl StdError for ApiError {}

fn extract_server_message(body: &serde_json::Value) -> Option<String> {
	ApiError::MESSAGE_FIELDS.iter().find_map(|field| {
		body.get(field)?
			.as_str()
			.map(str::trim)
			.filter(|text| !text.is_empty())
			.map(ToOwned::to_owned)
	})
}

/// Configuration and validation failures raised by the gateway.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A path or URL could not be resolved against the base URL.
	#[error("`{input}` is not a valid request target.")]
	InvalidUrl {
		/// Offending input.
		input: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Base URL cannot carry relative paths (e.g., `mailto:`).
	#[error("Base URL `{url}` cannot be used as a base for request paths.")]
	InvalidBaseUrl {
		/// Rejected URL.
		url: String,
	},
	/// Endpoints must use HTTPS unless they are loopback or explicitly allowed.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Proactive refresh threshold must not be negative.
	#[error("Refresh threshold must not be negative.")]
	NegativeRefreshThreshold,
	/// Rate limit policy values must be positive and bounded.
	#[error("Rate limit policy is invalid: {reason}.")]
	InvalidRateLimitPolicy {
		/// Which constraint failed.
		reason: &'static str,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	RequestBody(#[from] serde_json::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures, kept apart from HTTP-level errors.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while contacting the server.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying HTTP client gave up waiting.
	#[error("Request timed out before the server responded.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while contacting the server.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a transport-specific timeout error.
	pub fn timeout(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { source: Box::new(src) }
	}

	/// Returns `true` for timeouts.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout { .. })
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::timeout(e) } else { Self::network(e) }
	}
}
