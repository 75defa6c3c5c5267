// self
use crate::{_prelude::*, fingerprint::Fingerprint};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedGate<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedGate<F> = F;

/// Emits a `tracing` event at `$level` when the `tracing` feature is enabled.
macro_rules! gate_event {
	($level:ident, $($arg:tt)+) => {{
		#[cfg(feature = "tracing")]
		::tracing::$level!(target: "oauth2_refresh_buffer", $($arg)+);
	}};
}
pub(crate) use gate_event;

/// A span builder used around gate evaluations.
#[derive(Clone, Debug)]
pub struct GateSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl GateSpan {
	/// Creates a new span tagged with the call-site stage and the request fingerprint.
	pub fn new(stage: &'static str, key: &Fingerprint) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span =
				tracing::info_span!("oauth2_refresh_buffer.gate", stage, fingerprint = %key);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (stage, key);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedGate<Fut>
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
