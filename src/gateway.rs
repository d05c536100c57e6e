//! Request orchestration: bearer attachment, dispatch, one-shot 401 retry, classification.
//!
//! Every call walks the [`CallStage`] machine. Targets on the configured origin get the
//! session's access token (refreshed first when it is close to expiry); calls without stored
//! credentials go out anonymously because some endpoints are public. A 401 on an authorized
//! call triggers exactly one refresh-and-retry; whatever the retry returns is final.

pub mod call;

mod classify;

pub use call::ApiCall;

// crates.io
use serde::de::DeserializeOwned;
// self
#[cfg(feature = "reqwest")]
use crate::{clock::SystemClock, http::ReqwestTransport, signal::SessionBroadcast};
use crate::{
	_prelude::*,
	auth::{CredentialPair, TokenGrant, TokenSecret},
	clock::Clock,
	config::GatewayConfig,
	credentials::CredentialStore,
	error::{ApiError, ConfigError},
	http::{HttpRequest, HttpResponse, HttpTransport},
	obs::{self, CallStage, FlowKind, FlowOutcome, FlowSpan},
	rate_limit::{RateLimitDecision, RateLimiters},
	session::SessionManager,
	signal::SessionSignal,
	store::KeyValueStore,
};

/// Top-level client for bearer-token APIs.
pub struct RequestGateway<T>
where
	T: ?Sized + HttpTransport,
{
	config: Arc<GatewayConfig>,
	transport: Arc<T>,
	session: SessionManager<T>,
	limiters: Arc<RateLimiters>,
	clock: Arc<dyn Clock>,
}
impl<T> RequestGateway<T>
where
	T: ?Sized + HttpTransport,
{
	/// Wires a gateway from its collaborators.
	///
	/// Credentials are persisted in `backend` under `config.credential_keys`.
	pub fn new(
		config: GatewayConfig,
		backend: Arc<dyn KeyValueStore>,
		transport: Arc<T>,
		clock: Arc<dyn Clock>,
		signal: Arc<dyn SessionSignal>,
	) -> Result<Self, ConfigError> {
		config.validate()?;

		let credentials = CredentialStore::new(backend, clock.clone())
			.with_keys(config.credential_keys.clone());
		let session = SessionManager::new(&config, credentials, transport.clone(), signal);
		let limiters = Arc::new(RateLimiters::new(clock.clone()));

		Ok(Self { config: Arc::new(config), transport, session, limiters, clock })
	}

	/// Configuration in use.
	pub fn config(&self) -> &GatewayConfig {
		&self.config
	}

	/// Session manager; use it to inspect state or subscribe to the session-expired signal.
	pub fn session(&self) -> &SessionManager<T> {
		&self.session
	}

	/// Rate limiters for authentication, search, and contact actions.
	pub fn rate_limiters(&self) -> &RateLimiters {
		&self.limiters
	}

	/// Transport shared with the session manager.
	pub fn transport(&self) -> &Arc<T> {
		&self.transport
	}

	/// Executes `call` and decodes the success body into `R`.
	pub async fn request<R>(&self, call: ApiCall) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.run(call, true).await
	}

	/// `GET path`.
	pub async fn get<R>(&self, path: impl Into<String>) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.request(ApiCall::get(path)).await
	}

	/// `POST path` with a JSON body.
	pub async fn post<B, R>(&self, path: impl Into<String>, body: &B) -> Result<R>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		self.request(ApiCall::post(path).json(body)?).await
	}

	/// `PUT path` with a JSON body.
	pub async fn put<B, R>(&self, path: impl Into<String>, body: &B) -> Result<R>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		self.request(ApiCall::put(path).json(body)?).await
	}

	/// `PATCH path` with a JSON body.
	pub async fn patch<B, R>(&self, path: impl Into<String>, body: &B) -> Result<R>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		self.request(ApiCall::patch(path).json(body)?).await
	}

	/// `DELETE path`.
	pub async fn delete<R>(&self, path: impl Into<String>) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.request(ApiCall::delete(path)).await
	}

	/// Signs in or registers through `call` and stores the returned grant.
	///
	/// Attempts are counted per `identifier` by the authentication rate limiter; a blocked
	/// identifier fails with [`ErrorKind::RateLimited`](crate::error::ErrorKind::RateLimited)
	/// before anything is sent. The call itself never carries a bearer token.
	pub async fn authenticate(&self, identifier: &str, call: ApiCall) -> Result<CredentialPair> {
		const KIND: FlowKind = FlowKind::Authenticate;

		let span = FlowSpan::new(KIND, "authenticate");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				if let RateLimitDecision::Deny(directive) =
					self.limiters.authentication.check(identifier)
				{
					return Err(ApiError::throttled(
						directive.remaining,
						directive.remaining_minutes(),
					)
					.into());
				}

				let grant = self.run::<TokenGrant>(call, false).await?;

				self.session.establish(&grant)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Clears the stored credentials.
	pub fn logout(&self) -> Result<()> {
		self.session.logout()
	}

	async fn run<R>(&self, call: ApiCall, with_session: bool) -> Result<R>
	where
		R: DeserializeOwned,
	{
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::new(KIND, "request");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.execute(&span, call, with_session)).await;

		span.stage(if result.is_ok() { CallStage::Succeeded } else { CallStage::Failed });

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn execute<R>(&self, span: &FlowSpan, call: ApiCall, with_session: bool) -> Result<R>
	where
		R: DeserializeOwned,
	{
		span.stage(CallStage::Idle);

		let mut url = self.config.resolve(&call.path)?;

		if !call.query.is_empty() {
			url.query_pairs_mut().extend_pairs(&call.query);
		}

		let token = if with_session && self.config.is_trusted(&url) {
			span.stage(CallStage::TokenResolving);

			match self.session.acquire_token().await {
				Ok(token) => Some(token),
				Err(Error::NotAuthenticated) => None,
				Err(e) => return Err(e),
			}
		} else {
			None
		};

		span.stage(match token {
			Some(_) => CallStage::Authorized,
			None => CallStage::Unauthenticated,
		});

		let response = self.dispatch(span, &call, &url, token.as_ref()).await?;

		if response.status != 401 || token.is_none() {
			return classify::into_result(&response, self.clock.now());
		}

		span.stage(CallStage::RetryingOnce);

		let token = self.session.refresh().await?;

		span.stage(CallStage::Authorized);

		let retried = self.dispatch(span, &call, &url, Some(&token)).await?;

		classify::into_result(&retried, self.clock.now())
	}

	async fn dispatch(
		&self,
		span: &FlowSpan,
		call: &ApiCall,
		url: &Url,
		token: Option<&TokenSecret>,
	) -> Result<HttpResponse> {
		let mut request = HttpRequest::new(call.method, url.clone());

		request.headers.extend(self.config.default_headers.clone());
		request.headers.extend(call.headers.clone());

		if let Some(token) = token {
			request = request.with_header("authorization", token.bearer());
		}
		if let Some(body) = &call.body {
			request = request.with_body(body.clone());
		}

		span.stage(CallStage::Dispatched);

		Ok(self.transport.send(request).await?)
	}
}
#[cfg(feature = "reqwest")]
impl RequestGateway<ReqwestTransport> {
	/// Builds a gateway over a default reqwest client, the system clock, and a fresh
	/// [`SessionBroadcast`].
	pub fn with_reqwest(
		config: GatewayConfig,
		backend: Arc<dyn KeyValueStore>,
	) -> Result<Self, ConfigError> {
		Self::new(
			config,
			backend,
			Arc::new(ReqwestTransport::default()),
			Arc::new(SystemClock),
			Arc::new(SessionBroadcast::default()),
		)
	}
}
impl<T> Debug for RequestGateway<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestGateway")
			.field("base_url", &self.config.base_url.as_str())
			.field("session", &self.session)
			.field("limiters", &self.limiters)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{
		_preludet::*,
		auth::TokenType,
		clock::ManualClock,
		error::{ErrorKind, TransportError},
		signal::SessionBroadcast,
		store::MemoryStore,
	};

	struct Fixture {
		gateway: RequestGateway<ScriptedTransport>,
		transport: Arc<ScriptedTransport>,
		backend: MemoryStore,
		clock: ManualClock,
		signal: SessionBroadcast,
	}
	impl Fixture {
		fn new(
			handler: impl 'static
			+ Send
			+ Sync
			+ Fn(&HttpRequest) -> Result<HttpResponse, TransportError>,
		) -> Self {
			let clock = ManualClock::new(macros::datetime!(2025-10-01 12:00 UTC));
			let backend = MemoryStore::default();
			let signal = SessionBroadcast::default();
			let transport = ScriptedTransport::new(handler);
			let config = GatewayConfig::builder("https://shop.example.com/api")
				.build()
				.expect("Fixture config should build.");
			let gateway = RequestGateway::new(
				config,
				Arc::new(backend.clone()),
				transport.clone(),
				Arc::new(clock.clone()),
				Arc::new(signal.clone()),
			)
			.expect("Fixture gateway should build.");

			Self { gateway, transport, backend, clock, signal }
		}

		fn sign_in(&self, access_ttl: Duration) -> String {
			let now = self.clock.now();
			let access = mint_token("u-1", TokenType::Access, now, now + access_ttl);
			let refresh = mint_token("u-1", TokenType::Refresh, now, now + Duration::days(7));

			self.gateway
				.session()
				.credentials()
				.set(access.clone(), refresh, access_ttl.whole_seconds())
				.expect("Seeding credentials should succeed.");

			access
		}
	}

	fn grant_for(now: OffsetDateTime, access: &str) -> HttpResponse {
		json_response(
			200,
			serde_json::json!({
				"access_token": access,
				"refresh_token":
					mint_token("u-1", TokenType::Refresh, now, now + Duration::days(7)),
				"expires_in": 3600,
			}),
		)
	}

	#[tokio::test]
	async fn authorized_calls_carry_the_bearer_and_merged_headers() {
		let fixture = Fixture::new(|_| Ok(json_response(200, serde_json::json!({ "ok": true }))));
		let access = fixture.sign_in(Duration::hours(1));
		let value: serde_json::Value = fixture
			.gateway
			.request(
				ApiCall::get("/orders").with_query("page", "2").with_header("Accept", "text/plain"),
			)
			.await
			.expect("Call should succeed.");
		let requests = fixture.transport.requests();

		assert_eq!(value["ok"], true);
		assert_eq!(requests.len(), 1);
		assert_eq!(requests[0].url.as_str(), "https://shop.example.com/api/orders?page=2");
		assert_eq!(requests[0].header("authorization"), Some(format!("Bearer {access}").as_str()));
		assert_eq!(requests[0].header("accept"), Some("text/plain"));
		assert_eq!(requests[0].header("content-type"), Some("application/json"));
	}

	#[tokio::test]
	async fn anonymous_and_foreign_calls_never_carry_a_bearer() {
		let fixture = Fixture::new(|_| Ok(json_response(200, serde_json::json!([]))));

		let _: serde_json::Value =
			fixture.gateway.get("products").await.expect("Public call should succeed.");

		fixture.sign_in(Duration::hours(1));

		let _: serde_json::Value = fixture
			.gateway
			.get("https://cdn.example.net/catalog.json")
			.await
			.expect("Foreign call should succeed.");

		assert!(fixture.transport.requests().iter().all(|r| r.header("authorization").is_none()));
	}

	#[tokio::test]
	async fn unauthorized_call_refreshes_and_retries_once() {
		let now = macros::datetime!(2025-10-01 12:00 UTC);
		let fixture = Fixture::new(move |request| match request.url.path() {
			"/api/auth/refresh" => Ok(grant_for(now, "fresh.token.value")),
			_ if request.header("authorization") == Some("Bearer fresh.token.value") =>
				Ok(json_response(200, serde_json::json!({ "id": 7 }))),
			_ => Ok(json_response(401, serde_json::json!({ "message": "expired" }))),
		});

		fixture.sign_in(Duration::hours(1));

		let value: serde_json::Value =
			fixture.gateway.get("orders/7").await.expect("Retried call should succeed.");

		assert_eq!(value["id"], 7);
		assert_eq!(fixture.transport.requests_to("/api/orders/7"), 2);
		assert_eq!(fixture.transport.requests_to("/api/auth/refresh"), 1);
	}

	#[tokio::test]
	async fn second_unauthorized_response_is_final() {
		let now = macros::datetime!(2025-10-01 12:00 UTC);
		let fixture = Fixture::new(move |request| match request.url.path() {
			"/api/auth/refresh" => Ok(grant_for(now, "fresh.token.value")),
			_ => Ok(json_response(401, serde_json::json!({}))),
		});

		fixture.sign_in(Duration::hours(1));

		let error = fixture
			.gateway
			.get::<serde_json::Value>("orders")
			.await
			.expect_err("Second 401 should surface.");

		assert_eq!(error.kind(), ErrorKind::NotAuthenticated);
		assert_eq!(error.status(), Some(401));
		assert_eq!(fixture.transport.requests_to("/api/orders"), 2);
		assert_eq!(fixture.transport.requests_to("/api/auth/refresh"), 1);
	}

	#[tokio::test]
	async fn failed_refresh_surfaces_session_expired_without_retry() {
		let fixture = Fixture::new(|request| match request.url.path() {
			"/api/auth/refresh" => Ok(json_response(500, serde_json::json!({}))),
			_ => Ok(json_response(401, serde_json::json!({}))),
		});

		fixture.sign_in(Duration::hours(1));

		let error = fixture
			.gateway
			.get::<serde_json::Value>("orders")
			.await
			.expect_err("Refresh failure should surface.");

		assert!(matches!(error, Error::SessionExpired));
		assert_eq!(fixture.transport.requests_to("/api/orders"), 1);
		assert!(fixture.backend.is_empty());
		assert_eq!(fixture.signal.published(), 1);
	}

	#[tokio::test]
	async fn anonymous_unauthorized_is_not_retried() {
		let fixture = Fixture::new(|_| Ok(json_response(401, serde_json::json!({}))));
		let error = fixture
			.gateway
			.get::<serde_json::Value>("me")
			.await
			.expect_err("Anonymous 401 should surface.");

		assert_eq!(error.kind(), ErrorKind::NotAuthenticated);
		assert_eq!(fixture.transport.requests().len(), 1);
		assert_eq!(fixture.signal.published(), 0);
	}

	#[tokio::test]
	async fn authenticate_is_rate_limited_per_identifier() {
		let now = macros::datetime!(2025-10-01 12:00 UTC);
		let fixture = Fixture::new(move |request| match request.url.path() {
			"/api/auth/login" => Ok(grant_for(now, "signed.in.token")),
			_ => panic!("Unexpected request."),
		});
		let login = || {
			ApiCall::post("auth/login")
				.json(&serde_json::json!({ "email": "a@b.io", "password": "pw" }))
				.expect("Login body should serialize.")
		};

		for _ in 0..5 {
			fixture
				.gateway
				.authenticate("a@b.io", login())
				.await
				.expect("Attempts inside the budget should succeed.");
		}

		let error = fixture
			.gateway
			.authenticate("a@b.io", login())
			.await
			.expect_err("Sixth attempt should be throttled.");

		assert_eq!(error.kind(), ErrorKind::RateLimited);
		assert_eq!(error.status(), None);
		assert!(error.user_message().contains("30 minute"));
		assert_eq!(fixture.transport.requests_to("/api/auth/login"), 5);
		assert!(
			fixture.transport.requests().iter().all(|r| r.header("authorization").is_none())
		);

		fixture.clock.advance(Duration::minutes(31));

		let pair = fixture
			.gateway
			.authenticate("a@b.io", login())
			.await
			.expect("Block should lift after its duration.");

		assert_eq!(pair.access_token.expose(), "signed.in.token");
	}

	#[tokio::test]
	async fn transport_failures_are_classified() {
		let fixture = Fixture::new(|_| {
			Err(TransportError::timeout(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow")))
		});
		let error = fixture
			.gateway
			.get::<serde_json::Value>("products")
			.await
			.expect_err("Timeout should surface.");

		assert_eq!(error.kind(), ErrorKind::Timeout);
		assert_eq!(error.status(), None);
	}

	#[tokio::test]
	async fn logout_drops_the_bearer() {
		let fixture = Fixture::new(|_| Ok(json_response(204, serde_json::json!(null))));

		fixture.sign_in(Duration::hours(1));
		fixture.gateway.logout().expect("Logout should succeed.");
		fixture.gateway.delete::<()>("cart").await.expect("Anonymous call should succeed.");

		assert!(fixture.transport.requests()[0].header("authorization").is_none());
		assert_eq!(fixture.signal.published(), 0);
	}
}
