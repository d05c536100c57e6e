//! Client-side request governance for bearer-token APIs: single-flight token refresh,
//! one-shot 401 retries, escalating-block rate limiting, and categorized errors behind
//! pluggable transports, stores, and clocks.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod http;
pub mod obs;
pub mod rate_limit;
pub mod session;
pub mod signal;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test`
	//! crate feature.

	pub use crate::_prelude::*;

	// std
	use std::task::Poll;
	// crates.io
	use futures_util::future;
	// self
	use crate::{
		auth::{Claims, TokenCodec, TokenType},
		error::TransportError,
		http::{HttpRequest, HttpResponse, HttpTransport, TransportFuture},
	};

	type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync;

	/// Mints an unsigned token whose payload carries the provided claims.
	pub fn mint_token(
		subject: &str,
		token_type: TokenType,
		issued_at: OffsetDateTime,
		expires_at: OffsetDateTime,
	) -> String {
		TokenCodec.encode_unsigned(&Claims::new(subject, token_type, issued_at, expires_at))
	}

	/// Builds a JSON response with the given status.
	pub fn json_response(status: u16, body: serde_json::Value) -> HttpResponse {
		HttpResponse::new(status, body.to_string()).with_header("content-type", "application/json")
	}

	/// In-process transport that answers through a closure and records every request.
	///
	/// Responses resolve after a configurable number of scheduler yields so concurrent
	/// callers get a chance to observe in-flight work.
	pub struct ScriptedTransport {
		handler: Box<Handler>,
		yields: usize,
		requests: Mutex<Vec<HttpRequest>>,
	}
	impl ScriptedTransport {
		/// Creates a transport that yields once before answering.
		pub fn new(
			handler: impl 'static
			+ Send
			+ Sync
			+ Fn(&HttpRequest) -> Result<HttpResponse, TransportError>,
		) -> Arc<Self> {
			Self::with_yields(1, handler)
		}

		/// Creates a transport that yields `yields` times before answering.
		pub fn with_yields(
			yields: usize,
			handler: impl 'static
			+ Send
			+ Sync
			+ Fn(&HttpRequest) -> Result<HttpResponse, TransportError>,
		) -> Arc<Self> {
			Arc::new(Self { handler: Box::new(handler), yields, requests: Mutex::new(Vec::new()) })
		}

		/// Every request sent so far.
		pub fn requests(&self) -> Vec<HttpRequest> {
			self.requests.lock().clone()
		}

		/// Number of requests whose URL path equals `path`.
		pub fn requests_to(&self, path: &str) -> usize {
			self.requests.lock().iter().filter(|request| request.url.path() == path).count()
		}
	}
	impl HttpTransport for ScriptedTransport {
		fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
			let outcome = (self.handler)(&request);
			let mut remaining = self.yields;

			self.requests.lock().push(request);

			Box::pin(async move {
				future::poll_fn(|cx| {
					if remaining == 0 {
						return Poll::Ready(());
					}

					remaining -= 1;
					cx.waker().wake_by_ref();

					Poll::Pending
				})
				.await;

				outcome
			})
		}
	}
	impl Debug for ScriptedTransport {
		fn fmt(&self, f: &mut Formatter) -> FmtResult {
			f.debug_struct("ScriptedTransport")
				.field("yields", &self.yields)
				.field("requests", &self.requests.lock().len())
				.finish()
		}
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
