//! Gateway configuration: where requests go and how sessions are kept alive.

pub mod builder;

pub use builder::*;

// crates.io
use url::Host;
// self
use crate::{_prelude::*, credentials::CredentialKeys, error::ConfigError, http::Headers};

/// Validated gateway configuration.
///
/// Build values with [`GatewayConfig::builder`]. Deserialized values skip the builder, so
/// call [`GatewayConfig::validate`] before handing them to a gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
	/// Base URL every relative call path is resolved against. Always ends with `/`.
	#[serde(deserialize_with = "base_url::deserialize")]
	pub base_url: Url,
	/// Endpoint receiving `POST {"refresh_token"}`.
	pub refresh_endpoint: Url,
	/// Headers attached to every call; caller headers win on conflict.
	#[serde(default)]
	pub default_headers: Headers,
	/// Access tokens closer than this to expiry are refreshed before use.
	#[serde(with = "threshold_secs")]
	pub refresh_threshold: Duration,
	/// Keys used to persist the credential pair.
	#[serde(default)]
	pub credential_keys: CredentialKeys,
	/// Permits plain `http` for non-loopback hosts.
	#[serde(default)]
	pub allow_insecure_http: bool,
}
impl GatewayConfig {
	/// Default proactive refresh threshold.
	pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::minutes(5);

	/// Starts a builder for `base_url`.
	pub fn builder(base_url: impl Into<String>) -> GatewayConfigBuilder {
		GatewayConfigBuilder::new(base_url)
	}

	/// Validates invariants for the configuration.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.base_url.cannot_be_a_base() || !self.base_url.path().ends_with('/') {
			return Err(ConfigError::InvalidBaseUrl { url: self.base_url.to_string() });
		}
		if self.refresh_threshold.is_negative() {
			return Err(ConfigError::NegativeRefreshThreshold);
		}

		validate_endpoint("base", &self.base_url, self.allow_insecure_http)?;
		validate_endpoint("refresh", &self.refresh_endpoint, self.allow_insecure_http)?;

		Ok(())
	}

	/// Resolves a call target. Absolute URLs pass through; paths join onto the base URL.
	pub fn resolve(&self, target: &str) -> Result<Url, ConfigError> {
		let invalid = |source| ConfigError::InvalidUrl { input: target.to_owned(), source };

		match Url::parse(target) {
			Ok(url) => Ok(url),
			Err(url::ParseError::RelativeUrlWithoutBase) =>
				self.base_url.join(target.trim_start_matches('/')).map_err(invalid),
			Err(e) => Err(invalid(e)),
		}
	}

	/// `true` when `url` shares the base URL's origin and may carry the bearer token.
	pub fn is_trusted(&self, url: &Url) -> bool {
		url.origin() == self.base_url.origin()
	}
}

fn validate_endpoint(name: &'static str, url: &Url, allow_http: bool) -> Result<(), ConfigError> {
	let secure = match url.scheme() {
		"https" => true,
		"http" => allow_http || is_loopback(url),
		_ => false,
	};

	if secure {
		Ok(())
	} else {
		Err(ConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	}
}

/// Appends the trailing `/` that keeps the last base path segment when joining.
pub(crate) fn with_trailing_slash(mut url: Url) -> Url {
	if !url.cannot_be_a_base() && !url.path().ends_with('/') {
		let path = format!("{}/", url.path());

		url.set_path(&path);
	}

	url
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => ip.is_loopback(),
		Some(Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	}
}

mod base_url {
	// crates.io
	use serde::Deserializer;
	// self
	use crate::_prelude::*;

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Url, D::Error>
	where
		D: Deserializer<'de>,
	{
		Url::deserialize(deserializer).map(super::with_trailing_slash)
	}
}

mod threshold_secs {
	// crates.io
	use serde::{Deserializer, Serializer};
	// self
	use crate::_prelude::*;

	pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_i64(value.whole_seconds())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		i64::deserialize(deserializer).map(Duration::seconds)
	}
}
