//! Fluent construction of [`GatewayConfig`](crate::config::GatewayConfig).

// self
use crate::{
	_prelude::*,
	config::GatewayConfig,
	credentials::CredentialKeys,
	error::ConfigError,
	http::Headers,
};

/// Builder for [`GatewayConfig`] values.
#[derive(Debug)]
pub struct GatewayConfigBuilder {
	/// Base URL for relative call paths.
	pub base_url: String,
	/// Refresh path relative to the base URL.
	pub refresh_path: String,
	/// Absolute refresh endpoint overriding `refresh_path`.
	pub refresh_endpoint: Option<String>,
	/// Headers attached to every call.
	pub default_headers: Headers,
	/// Proactive refresh threshold.
	pub refresh_threshold: Duration,
	/// Credential storage keys.
	pub credential_keys: CredentialKeys,
	/// Permits plain `http` for non-loopback hosts.
	pub allow_insecure_http: bool,
}
impl GatewayConfigBuilder {
	/// Creates a builder with JSON default headers and a 5 minute refresh threshold.
	pub fn new(base_url: impl Into<String>) -> Self {
		Self {
			base_url: base_url.into(),
			refresh_path: "auth/refresh".into(),
			refresh_endpoint: None,
			default_headers: Headers::from([
				("accept".to_owned(), "application/json".to_owned()),
				("content-type".to_owned(), "application/json".to_owned()),
			]),
			refresh_threshold: GatewayConfig::DEFAULT_REFRESH_THRESHOLD,
			credential_keys: CredentialKeys::default(),
			allow_insecure_http: false,
		}
	}

	/// Sets the refresh path relative to the base URL.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.refresh_path = path.into();

		self
	}

	/// Sets an absolute refresh endpoint.
	pub fn refresh_endpoint(mut self, url: impl Into<String>) -> Self {
		self.refresh_endpoint = Some(url.into());

		self
	}

	/// Adds or replaces a default header.
	pub fn default_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.default_headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}

	/// Overrides the proactive refresh threshold.
	pub fn refresh_threshold(mut self, threshold: Duration) -> Self {
		self.refresh_threshold = threshold;

		self
	}

	/// Overrides the credential storage keys.
	pub fn credential_keys(mut self, keys: CredentialKeys) -> Self {
		self.credential_keys = keys;

		self
	}

	/// Permits plain `http` for non-loopback hosts.
	pub fn allow_insecure_http(mut self, allow: bool) -> Self {
		self.allow_insecure_http = allow;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<GatewayConfig, ConfigError> {
		let parse = |input: &str| {
			Url::parse(input)
				.map_err(|source| ConfigError::InvalidUrl { input: input.to_owned(), source })
		};
		let base_url = parse(&self.base_url)?;

		if base_url.cannot_be_a_base() {
			return Err(ConfigError::InvalidBaseUrl { url: base_url.to_string() });
		}

		let base_url = super::with_trailing_slash(base_url);

		let refresh_endpoint = match self.refresh_endpoint.as_deref() {
			Some(endpoint) => parse(endpoint)?,
			None => base_url.join(self.refresh_path.trim_start_matches('/')).map_err(|source| {
				ConfigError::InvalidUrl { input: self.refresh_path.clone(), source }
			})?,
		};
		let config = GatewayConfig {
			base_url,
			refresh_endpoint,
			default_headers: self.default_headers,
			refresh_threshold: self.refresh_threshold,
			credential_keys: self.credential_keys,
			allow_insecure_http: self.allow_insecure_http,
		};

		config.validate()?;

		Ok(config)
	}
}
