// self
use crate::{
	_prelude::*,
	obs::{CallStage, FlowKind},
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by gateway flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("session_gateway.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Emits a call-stage transition event inside the span.
	pub fn stage(&self, stage: CallStage) {
		#[cfg(feature = "tracing")]
		{
			tracing::debug!(parent: &self.span, stage = stage.as_str(), "call stage");
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = stage;
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a warning event (when tracing is enabled). Never pass secrets as `reason`.
pub fn record_warning(kind: FlowKind, event: &'static str, reason: &'static str) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(flow = kind.as_str(), event, reason, "session gateway warning");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, event, reason);
	}
}
