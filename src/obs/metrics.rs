// self
use crate::obs::{FlowKind, FlowOutcome};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"session_gateway_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records a rate limiter decision via the global metrics recorder (when enabled).
pub fn record_rate_limit(action: &'static str, allowed: bool) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"session_gateway_rate_limit_total",
			"action" => action,
			"decision" => if allowed { "allow" } else { "deny" }
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (action, allowed);
	}
}
