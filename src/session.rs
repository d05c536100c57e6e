//! Session lifecycle with single-flight refresh.
//!
//! [`SessionManager::acquire_token`] hands out the stored access token while it is comfortably
//! valid and refreshes it otherwise. Refresh cycles are shared: while one is in flight every
//! other caller awaits the same [`Shared`] future, so the refresh endpoint sees one call per
//! cycle no matter how many requests noticed the expiry. The in-flight slot is cleared when
//! the cycle settles, both inside the shared future and by every waiter, so a later expiry
//! always starts a fresh cycle.
//!
//! A failed cycle ends the session: the credential pair is cleared, the session-expired signal
//! is published once, and every waiter receives [`Error::SessionExpired`].

mod metrics;

pub use self::metrics::RefreshMetrics;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use futures_util::{
	FutureExt,
	future::{BoxFuture, Shared},
};
// self
use crate::{
	_prelude::*,
	auth::{Claims, CredentialPair, TokenCodec, TokenGrant, TokenSecret, TokenType},
	clock::Clock,
	config::GatewayConfig,
	credentials::CredentialStore,
	http::{Headers, HttpRequest, HttpTransport, Method},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	signal::SessionSignal,
};

type RefreshOutcome = std::result::Result<TokenSecret, RefreshFailure>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Freshness of the stored access token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessState {
	/// No credentials are stored.
	Missing,
	/// Usable without refreshing.
	Valid,
	/// Inside the proactive refresh threshold.
	ExpiringSoon,
	/// Past its expiry, or undecodable.
	Expired,
}

/// Why a refresh cycle ended the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshFailure {
	/// Nothing was stored to refresh with.
	#[error("No refresh token is stored.")]
	MissingRefreshToken,
	/// Refresh token is undecodable, expired, or not a refresh token.
	#[error("Refresh token is expired or unusable.")]
	RefreshTokenUnusable,
	/// Refresh endpoint answered with a non-success status.
	#[error("Refresh endpoint rejected the request with HTTP {status}.")]
	Rejected {
		/// Status returned by the refresh endpoint.
		status: u16,
	},
	/// Refresh endpoint answered with a body that is not a usable grant.
	#[error("Refresh endpoint returned an unusable grant.")]
	MalformedResponse,
	/// Refresh request never got an answer.
	#[error("Refresh request failed before the server responded.")]
	Transport {
		/// Whether the transport timed out.
		timeout: bool,
	},
	/// New pair could not be persisted.
	#[error("Refreshed credentials could not be stored.")]
	Storage,
}
impl RefreshFailure {
	/// Returns a stable label suitable for log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RefreshFailure::MissingRefreshToken => "missing_refresh_token",
			RefreshFailure::RefreshTokenUnusable => "refresh_token_unusable",
			RefreshFailure::Rejected { .. } => "rejected",
			RefreshFailure::MalformedResponse => "malformed_response",
			RefreshFailure::Transport { timeout: true } => "transport_timeout",
			RefreshFailure::Transport { timeout: false } => "transport_error",
			RefreshFailure::Storage => "storage",
		}
	}
}

/// Owns the credential pair and coordinates refresh cycles.
///
/// Clones share the same state, including the in-flight refresh.
pub struct SessionManager<T>
where
	T: ?Sized + HttpTransport,
{
	inner: Arc<SessionInner<T>>,
}
impl<T> SessionManager<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a manager that refreshes through `transport` at the configured endpoint.
	pub fn new(
		config: &GatewayConfig,
		credentials: CredentialStore,
		transport: Arc<T>,
		signal: Arc<dyn SessionSignal>,
	) -> Self {
		Self {
			inner: Arc::new(SessionInner {
				credentials,
				transport,
				refresh_endpoint: config.refresh_endpoint.clone(),
				default_headers: config.default_headers.clone(),
				refresh_threshold: config.refresh_threshold,
				codec: TokenCodec,
				signal,
				metrics: Arc::new(RefreshMetrics::default()),
				in_flight: Mutex::new(None),
				next_cycle: AtomicU64::new(0),
			}),
		}
	}

	/// Credential store backing the session.
	pub fn credentials(&self) -> &CredentialStore {
		&self.inner.credentials
	}

	/// Refresh counters.
	pub fn metrics(&self) -> Arc<RefreshMetrics> {
		self.inner.metrics.clone()
	}

	/// Session-expired signal; subscribe here to force re-authentication.
	pub fn signal(&self) -> Arc<dyn SessionSignal> {
		self.inner.signal.clone()
	}

	/// Stores the pair carried by a login or registration grant.
	pub fn establish(&self, grant: &TokenGrant) -> Result<CredentialPair> {
		let pair = CredentialPair::from_grant(grant, self.inner.clock().now())?;

		self.inner.credentials.store_pair(&pair)?;

		Ok(pair)
	}

	/// Forgets the credential pair. Does not publish the session-expired signal.
	pub fn logout(&self) -> Result<()> {
		self.inner.credentials.clear()
	}

	/// Classifies the stored access token.
	pub fn access_state(&self) -> Result<AccessState> {
		let now = self.inner.clock().now();

		Ok(self
			.inner
			.credentials
			.load()?
			.map_or(AccessState::Missing, |pair| self.inner.classify(&pair, now)))
	}

	/// Claims of the stored access token, when it decodes.
	pub fn claims(&self) -> Result<Option<Claims>> {
		Ok(self
			.inner
			.credentials
			.load()?
			.and_then(|pair| self.inner.codec.decode(pair.access_token.expose()).ok()))
	}

	/// Returns `true` while a refresh cycle is outstanding.
	pub fn is_refresh_in_flight(&self) -> bool {
		self.inner.in_flight.lock().is_some()
	}

	/// Returns a usable access token, refreshing first when it is expired or expiring soon.
	///
	/// Fails with [`Error::NotAuthenticated`] when nothing is stored and with
	/// [`Error::SessionExpired`] when the refresh cycle ended the session.
	pub async fn acquire_token(&self) -> Result<TokenSecret> {
		const KIND: FlowKind = FlowKind::AcquireToken;

		let span = FlowSpan::new(KIND, "acquire_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let pair = self.inner.credentials.load()?.ok_or(Error::NotAuthenticated)?;

				match self.inner.classify(&pair, self.inner.clock().now()) {
					AccessState::Valid => Ok(pair.access_token),
					_ => self.refresh().await,
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Runs a refresh cycle, or joins the one already in flight.
	///
	/// Dropping the returned future does not cancel the cycle for other waiters.
	pub async fn refresh(&self) -> Result<TokenSecret> {
		let (cycle, pending) = self.join_or_start();
		let outcome = pending.await;

		self.inner.settle(cycle);

		outcome.map_err(|_| Error::SessionExpired)
	}

	fn join_or_start(&self) -> (u64, SharedRefresh) {
		let mut slot = self.inner.in_flight.lock();

		if let Some(in_flight) = slot.as_ref() {
			self.inner.metrics.record_coalesced();

			return (in_flight.cycle, in_flight.future.clone());
		}

		let cycle = self.inner.next_cycle.fetch_add(1, Ordering::Relaxed);
		let inner = self.inner.clone();
		let future = async move {
			let outcome = inner.run_refresh().await;

			inner.settle(cycle);

			outcome
		}
		.boxed()
		.shared();

		*slot = Some(InFlight { cycle, future: future.clone() });

		(cycle, future)
	}
}
impl<T> Clone for SessionManager<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}
impl<T> Debug for SessionManager<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionManager")
			.field("refresh_endpoint", &self.inner.refresh_endpoint.as_str())
			.field("refresh_threshold", &self.inner.refresh_threshold)
			.field("refresh_in_flight", &self.is_refresh_in_flight())
			.field("metrics", &self.inner.metrics)
			.finish()
	}
}

struct InFlight {
	cycle: u64,
	future: SharedRefresh,
}

struct SessionInner<T>
where
	T: ?Sized + HttpTransport,
{
	credentials: CredentialStore,
	transport: Arc<T>,
	refresh_endpoint: Url,
	default_headers: Headers,
	refresh_threshold: Duration,
	codec: TokenCodec,
	signal: Arc<dyn SessionSignal>,
	metrics: Arc<RefreshMetrics>,
	in_flight: Mutex<Option<InFlight>>,
	next_cycle: AtomicU64,
}
impl<T> SessionInner<T>
where
	T: ?Sized + HttpTransport,
{
	fn clock(&self) -> &Arc<dyn Clock> {
		self.credentials.clock()
	}

	fn classify(&self, pair: &CredentialPair, now: OffsetDateTime) -> AccessState {
		let token = pair.access_token.expose();

		if pair.is_access_expired_at(now) || self.codec.is_expired(token, now) {
			AccessState::Expired
		} else if pair.access_expires_within(self.refresh_threshold, now)
			|| self.codec.is_expiring_within(token, self.refresh_threshold, now)
		{
			AccessState::ExpiringSoon
		} else {
			AccessState::Valid
		}
	}

	fn settle(&self, cycle: u64) {
		let mut slot = self.in_flight.lock();

		if slot.as_ref().is_some_and(|in_flight| in_flight.cycle == cycle) {
			*slot = None;
		}
	}

	async fn run_refresh(&self) -> RefreshOutcome {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "run_refresh");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_attempt();

		let outcome = span.instrument(self.exchange()).await;

		match outcome {
			Ok(_) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
				self.metrics.record_success();
			},
			Err(failure) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				self.metrics.record_failure();
				self.terminate(failure);
			},
		}

		outcome
	}

	async fn exchange(&self) -> RefreshOutcome {
		let now = self.clock().now();
		let pair = self
			.credentials
			.load()
			.map_err(|_| RefreshFailure::Storage)?
			.ok_or(RefreshFailure::MissingRefreshToken)?;
		let usable = self.codec.decode(pair.refresh_token.expose()).is_ok_and(|claims| {
			claims.token_type == TokenType::Refresh && !claims.is_expired_at(now)
		});

		if !usable {
			return Err(RefreshFailure::RefreshTokenUnusable);
		}

		let body = serde_json::json!({ "refresh_token": pair.refresh_token.expose() }).to_string();
		let request = self
			.default_headers
			.iter()
			.fold(HttpRequest::new(Method::Post, self.refresh_endpoint.clone()), |req, (k, v)| {
				req.with_header(k, v.clone())
			})
			.with_header("content-type", "application/json")
			.with_body(body);
		let response = self
			.transport
			.send(request)
			.await
			.map_err(|e| RefreshFailure::Transport { timeout: e.is_timeout() })?;

		if !response.is_success() {
			return Err(RefreshFailure::Rejected { status: response.status });
		}

		let grant = serde_json::from_slice::<TokenGrant>(&response.body)
			.map_err(|_| RefreshFailure::MalformedResponse)?;
		let pair = CredentialPair::from_grant(&grant, self.clock().now())
			.map_err(|_| RefreshFailure::MalformedResponse)?;

		self.credentials.store_pair(&pair).map_err(|_| RefreshFailure::Storage)?;

		Ok(pair.access_token)
	}

	fn terminate(&self, failure: RefreshFailure) {
		obs::record_warning(FlowKind::Refresh, "session_terminated", failure.as_str());

		// Nothing was stored, so there is no session to end.
		if failure == RefreshFailure::MissingRefreshToken {
			return;
		}
		if self.credentials.clear().is_err() {
			obs::record_warning(FlowKind::Refresh, "credential_clear_failed", failure.as_str());
		}

		self.signal.publish();
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use futures_util::future;
	use time::macros;
	// self
	use super::*;
	use crate::{
		_preludet::*,
		clock::ManualClock,
		error::TransportError,
		http::HttpResponse,
		signal::SessionBroadcast,
		store::MemoryStore,
	};

	struct Fixture {
		session: SessionManager<ScriptedTransport>,
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
			let clock = ManualClock::new(macros::datetime!(2025-08-01 09:00 UTC));
			let backend = MemoryStore::default();
			let signal = SessionBroadcast::default();
			// Enough yields that every joined caller is polled before the refresh resolves.
			let transport = ScriptedTransport::with_yields(16, handler);
			let config = GatewayConfig::builder("https://api.example.com/v1")
				.build()
				.expect("Fixture config should build.");
			let credentials =
				CredentialStore::new(Arc::new(backend.clone()), Arc::new(clock.clone()));
			let session = SessionManager::new(
				&config,
				credentials,
				transport.clone(),
				Arc::new(signal.clone()),
			);

			Self { session, transport, backend, clock, signal }
		}

		fn now(&self) -> OffsetDateTime {
			self.clock.now()
		}

		fn seed(&self, access_ttl: Duration, refresh_ttl: Duration) {
			let now = self.now();
			let access = mint_token("u-1", TokenType::Access, now, now + access_ttl);
			let refresh = mint_token("u-1", TokenType::Refresh, now, now + refresh_ttl);

			self.session
				.credentials()
				.set(access, refresh, access_ttl.whole_seconds())
				.expect("Seeding credentials should succeed.");
		}

		fn refresh_calls(&self) -> usize {
			self.transport.requests_to("/v1/auth/refresh")
		}
	}

	fn rotated_grant(now: OffsetDateTime) -> HttpResponse {
		json_response(
			200,
			serde_json::json!({
				"access_token": mint_token("u-1", TokenType::Access, now, now + Duration::hours(1)),
				"refresh_token":
					mint_token("u-1", TokenType::Refresh, now, now + Duration::days(30)),
				"expires_in": 3600,
			}),
		)
	}

	#[tokio::test]
	async fn valid_token_is_returned_without_network() {
		let fixture = Fixture::new(|_| panic!("No request expected."));

		fixture.seed(Duration::hours(1), Duration::days(7));

		let token = fixture.session.acquire_token().await.expect("Token should be returned.");

		assert!(!token.is_empty());
		assert_eq!(fixture.transport.requests().len(), 0);
		assert_eq!(fixture.session.access_state().expect("State should load."), AccessState::Valid);
	}

	#[tokio::test]
	async fn missing_credentials_are_not_authenticated() {
		let fixture = Fixture::new(|_| panic!("No request expected."));

		assert!(matches!(fixture.session.acquire_token().await, Err(Error::NotAuthenticated)));
		assert_eq!(
			fixture.session.access_state().expect("State should load."),
			AccessState::Missing
		);
		assert_eq!(fixture.signal.published(), 0);
	}

	#[tokio::test]
	async fn concurrent_callers_share_one_refresh() {
		let now = macros::datetime!(2025-08-01 09:10 UTC);
		let fixture = Fixture::new(move |_| Ok(rotated_grant(now)));

		fixture.seed(Duration::minutes(10), Duration::days(7));
		fixture.clock.set(now);

		assert_eq!(
			fixture.session.access_state().expect("State should load."),
			AccessState::Expired
		);

		let results = future::join_all((0..8).map(|_| fixture.session.acquire_token())).await;
		let tokens = results
			.into_iter()
			.map(|r| r.expect("Every caller should receive the new token.").expose().to_owned())
			.collect::<Vec<_>>();
		let stored = fixture
			.session
			.credentials()
			.get_access()
			.expect("Read should succeed.")
			.expect("New token should be stored.");

		assert_eq!(fixture.refresh_calls(), 1);
		assert!(tokens.iter().all(|t| t == stored.expose()));
		assert_eq!(fixture.session.metrics().attempts(), 1);
		assert_eq!(fixture.session.metrics().coalesced(), 7);
		assert!(!fixture.session.is_refresh_in_flight());
	}

	#[tokio::test]
	async fn expiring_soon_triggers_proactive_refresh() {
		let now = macros::datetime!(2025-08-01 09:00 UTC);
		let fixture = Fixture::new(move |request| {
			let body: serde_json::Value = serde_json::from_slice(
				request.body.as_deref().expect("Refresh request should carry a body."),
			)
			.expect("Refresh body should be JSON.");

			assert!(body["refresh_token"].is_string());
			assert_eq!(request.header("content-type"), Some("application/json"));

			Ok(rotated_grant(now))
		});

		fixture.seed(Duration::minutes(4), Duration::days(7));

		assert_eq!(
			fixture.session.access_state().expect("State should load."),
			AccessState::ExpiringSoon
		);

		fixture.session.acquire_token().await.expect("Refresh should succeed.");

		assert_eq!(fixture.refresh_calls(), 1);
		assert_eq!(
			fixture.session.credentials().get_expiry().expect("Read should succeed."),
			Some(now + Duration::hours(1))
		);
	}

	#[tokio::test]
	async fn rejected_refresh_ends_the_session_once() {
		let fixture = Fixture::new(|_| Ok(json_response(401, serde_json::json!({}))));

		fixture.seed(Duration::minutes(1), Duration::days(7));
		fixture.clock.advance(Duration::minutes(2));

		let results = future::join_all((0..3).map(|_| fixture.session.acquire_token())).await;

		assert!(results.iter().all(|r| matches!(r, Err(Error::SessionExpired))));
		assert_eq!(fixture.refresh_calls(), 1);
		assert!(fixture.backend.is_empty());
		assert_eq!(fixture.signal.published(), 1);
		assert_eq!(fixture.session.metrics().failures(), 1);
	}

	#[tokio::test]
	async fn expired_refresh_token_skips_the_network() {
		let fixture = Fixture::new(|_| panic!("No request expected."));

		fixture.seed(Duration::minutes(10), Duration::minutes(20));
		fixture.clock.advance(Duration::hours(1));

		assert!(matches!(fixture.session.acquire_token().await, Err(Error::SessionExpired)));
		assert_eq!(fixture.transport.requests().len(), 0);
		assert!(fixture.backend.is_empty());
		assert_eq!(fixture.signal.published(), 1);
	}

	#[tokio::test]
	async fn access_typed_refresh_token_is_unusable() {
		let fixture = Fixture::new(|_| panic!("No request expected."));
		let now = fixture.now();
		let access = mint_token("u-1", TokenType::Access, now, now + Duration::minutes(1));
		let wrong = mint_token("u-1", TokenType::Access, now, now + Duration::days(1));

		fixture.session.credentials().set(access, wrong, 60).expect("Seed should succeed.");

		assert!(matches!(fixture.session.refresh().await, Err(Error::SessionExpired)));
		assert_eq!(fixture.transport.requests().len(), 0);
	}

	#[tokio::test]
	async fn malformed_grant_and_transport_errors_end_the_session() {
		for outcome in [
			Ok(json_response(200, serde_json::json!({ "access_token": "only" }))),
			Ok(json_response(200, serde_json::json!({
				"access_token": "a", "refresh_token": "r", "expires_in": 0
			}))),
			Err(TransportError::Io(std::io::Error::new(
				std::io::ErrorKind::ConnectionRefused,
				"refused",
			))),
		] {
			let outcome = Mutex::new(Some(outcome));
			let fixture = Fixture::new(move |_| {
				outcome.lock().take().expect("Only one refresh request is expected.")
			});

			fixture.seed(Duration::minutes(1), Duration::days(7));
			fixture.clock.advance(Duration::minutes(1));

			assert!(matches!(fixture.session.acquire_token().await, Err(Error::SessionExpired)));
			assert!(fixture.backend.is_empty());
			assert_eq!(fixture.signal.published(), 1);
		}
	}

	#[tokio::test]
	async fn oversized_grant_lifetime_settles_the_cycle() {
		let now = macros::datetime!(2025-08-01 09:00 UTC);
		let calls = AtomicUsize::new(0);
		let fixture = Fixture::new(move |_| {
			if calls.fetch_add(1, Ordering::SeqCst) == 0 {
				Ok(json_response(
					200,
					serde_json::json!({
						"access_token": "a",
						"refresh_token": "r",
						"expires_in": 400_000_000_000_i64,
					}),
				))
			} else {
				Ok(rotated_grant(now))
			}
		});

		fixture.seed(Duration::minutes(1), Duration::days(7));

		assert!(matches!(fixture.session.refresh().await, Err(Error::SessionExpired)));
		assert!(fixture.backend.is_empty());
		assert!(!fixture.session.is_refresh_in_flight());
		assert_eq!(fixture.signal.published(), 1);

		fixture.seed(Duration::minutes(1), Duration::days(7));
		fixture.session.refresh().await.expect("Next cycle should start fresh.");

		assert_eq!(fixture.refresh_calls(), 2);
	}

	#[tokio::test]
	async fn settled_cycles_allow_a_fresh_attempt() {
		let now = macros::datetime!(2025-08-01 09:00 UTC);
		let fixture = Fixture::new(move |_| Ok(rotated_grant(now)));

		fixture.seed(Duration::hours(2), Duration::days(7));
		fixture.session.refresh().await.expect("First refresh should succeed.");
		fixture.session.refresh().await.expect("Second refresh should succeed.");

		assert_eq!(fixture.refresh_calls(), 2);
		assert_eq!(fixture.session.metrics().successes(), 2);
	}

	#[tokio::test]
	async fn missing_pair_on_refresh_does_not_publish() {
		let fixture = Fixture::new(|_| panic!("No request expected."));

		assert!(matches!(fixture.session.refresh().await, Err(Error::SessionExpired)));
		assert_eq!(fixture.signal.published(), 0);
	}

	#[test]
	fn establish_and_logout_round_trip() {
		let fixture = Fixture::new(|_| panic!("No request expected."));
		let now = fixture.now();
		let grant = TokenGrant::new(
			mint_token("u-9", TokenType::Access, now, now + Duration::hours(1)),
			mint_token("u-9", TokenType::Refresh, now, now + Duration::days(1)),
			3600,
		);
		let pair = fixture.session.establish(&grant).expect("Establish should succeed.");

		assert_eq!(pair.access_expires_at, now + Duration::hours(1));
		assert_eq!(
			fixture.session.claims().expect("Claims should load.").map(|c| c.subject),
			Some("u-9".into())
		);

		fixture.session.logout().expect("Logout should succeed.");

		assert!(fixture.backend.is_empty());
		assert_eq!(fixture.signal.published(), 0);
		assert!(matches!(
			fixture.session.establish(&TokenGrant::new("", "r", 60)),
			Err(Error::Grant(_))
		));
	}
}
