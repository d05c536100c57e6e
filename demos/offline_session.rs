//! Drives a gateway against an in-process API so the refresh flow can be watched offline.
//!
//! 1. Implement [`HttpTransport`] for a stub that serves `/auth/login`, `/auth/refresh`, and
//!    `/orders`.
//! 2. Sign in through [`RequestGateway::authenticate`]; the access token is short-lived.
//! 3. Advance a [`ManualClock`] past the refresh threshold and fire concurrent calls; they
//!    share a single refresh request.
//! 4. Revoke the refresh token and observe the session-expired broadcast.

// std
use std::sync::{
	Arc,
	atomic::{AtomicBool, AtomicUsize, Ordering},
};
// crates.io
use color_eyre::Result;
use futures_util::future;
use serde_json::json;
use time::{Duration, OffsetDateTime, macros};
// self
use session_gateway::{
	auth::{Claims, TokenCodec, TokenType},
	clock::{Clock, ManualClock},
	config::GatewayConfig,
	error::TransportError,
	gateway::{ApiCall, RequestGateway},
	http::{HttpRequest, HttpResponse, HttpTransport, TransportFuture},
	signal::{SessionBroadcast, SessionSignal},
	store::MemoryStore,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let clock = ManualClock::new(macros::datetime!(2025-11-03 09:00 UTC));
	let signal = SessionBroadcast::default();
	let api = Arc::new(StubApi::new(clock.clone()));
	let config = GatewayConfig::builder("https://shop.example.com/api").build()?;
	let gateway = RequestGateway::new(
		config,
		Arc::new(MemoryStore::default()),
		api.clone(),
		Arc::new(clock.clone()),
		Arc::new(signal.clone()),
	)?;

	signal.subscribe(Arc::new(|| println!("Session expired; the user must sign in again.")));

	let login = ApiCall::post("auth/login")
		.json(&json!({ "email": "ada@example.com", "password": "correct horse" }))?;
	let pair = gateway.authenticate("ada@example.com", login).await?;

	println!("Signed in; access token expires at {}.", pair.access_expires_at);

	clock.advance(Duration::minutes(12));

	println!("Access state after 12 minutes: {:?}.", gateway.session().access_state()?);

	let orders = future::join_all((0..5).map(|_| gateway.get::<serde_json::Value>("orders")))
		.await
		.into_iter()
		.collect::<Result<Vec<_>, _>>()?;

	println!(
		"Fetched {} order pages with {} refresh request(s).",
		orders.len(),
		api.refreshes.load(Ordering::SeqCst)
	);

	api.revoked.store(true, Ordering::SeqCst);
	clock.advance(Duration::minutes(20));

	let error = gateway.get::<serde_json::Value>("orders").await.expect_err("Revoked refresh");

	println!("Call after revocation failed: {} ({}).", error.user_message(), error.kind());

	Ok(())
}

struct StubApi {
	clock: ManualClock,
	refreshes: AtomicUsize,
	revoked: AtomicBool,
}
impl StubApi {
	fn new(clock: ManualClock) -> Self {
		Self { clock, refreshes: AtomicUsize::new(0), revoked: AtomicBool::new(false) }
	}

	fn grant(&self, now: OffsetDateTime) -> HttpResponse {
		let mint = |token_type, ttl| {
			TokenCodec.encode_unsigned(
				&Claims::new("user-ada", token_type, now, now + ttl).with_email("ada@example.com"),
			)
		};
		let body = json!({
			"access_token": mint(TokenType::Access, Duration::minutes(15)),
			"refresh_token": mint(TokenType::Refresh, Duration::days(7)),
			"expires_in": 900,
		});

		HttpResponse::new(200, body.to_string())
	}

	fn answer(&self, request: &HttpRequest) -> HttpResponse {
		let now = self.clock.now();

		match request.url.path() {
			"/api/auth/login" => self.grant(now),
			"/api/auth/refresh" => {
				self.refreshes.fetch_add(1, Ordering::SeqCst);

				if self.revoked.load(Ordering::SeqCst) {
					HttpResponse::new(401, r#"{"message":"Refresh token revoked."}"#)
				} else {
					self.grant(now)
				}
			},
			"/api/orders" => {
				let authorized = request
					.header("authorization")
					.and_then(|value| value.strip_prefix("Bearer "))
					.is_some_and(|token| !TokenCodec.is_expired(token, now));

				if authorized {
					HttpResponse::new(200, r#"{"orders":[]}"#)
				} else {
					HttpResponse::new(401, r#"{"message":"Token expired."}"#)
				}
			},
			_ => HttpResponse::new(404, r#"{"message":"Not found."}"#),
		}
	}
}
impl HttpTransport for StubApi {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		let response = self.answer(&request);

		Box::pin(async move {
			tokio::task::yield_now().await;

			Ok::<_, TransportError>(response)
		})
	}
}
