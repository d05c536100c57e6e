//! Optional observability helpers for gateway flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `session_gateway.flow` with the `flow` and
//!   `stage` fields, plus [`CallStage`] transition events and session-termination warnings.
//! - Enable `metrics` to increment the `session_gateway_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`, and the
//!   `session_gateway_rate_limit_total` counter labeled by `action` + `decision`.

mod metrics;
mod tracing;

pub use self::{metrics::*, tracing::*};

// self
use crate::_prelude::*;

/// Gateway flows observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Token lookup before a call.
	AcquireToken,
	/// Refresh token exchange.
	Refresh,
	/// Gateway call, including its single retry.
	Request,
	/// Rate-limited sign-in or registration.
	Authenticate,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::AcquireToken => "acquire_token",
			FlowKind::Refresh => "refresh",
			FlowKind::Request => "request",
			FlowKind::Authenticate => "authenticate",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a gateway helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// States of a single gateway call.
///
/// `Idle → TokenResolving → {Unauthenticated | Authorized} → Dispatched →
/// {Succeeded | RetryingOnce → Dispatched → {Succeeded | Failed} | Failed}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallStage {
	/// Call constructed, nothing resolved yet.
	Idle,
	/// Looking up (and maybe refreshing) the access token.
	TokenResolving,
	/// No credentials; dispatching without a bearer.
	Unauthenticated,
	/// Bearer attached.
	Authorized,
	/// Request handed to the transport.
	Dispatched,
	/// First attempt got 401; refreshing before the one retry.
	RetryingOnce,
	/// Payload returned to the caller.
	Succeeded,
	/// Error returned to the caller.
	Failed,
}
impl CallStage {
	/// Returns a stable label suitable for span or event fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallStage::Idle => "idle",
			CallStage::TokenResolving => "token_resolving",
			CallStage::Unauthenticated => "unauthenticated",
			CallStage::Authorized => "authorized",
			CallStage::Dispatched => "dispatched",
			CallStage::RetryingOnce => "retrying_once",
			CallStage::Succeeded => "succeeded",
			CallStage::Failed => "failed",
		}
	}
}
impl Display for CallStage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
