// self
use crate::obs::GateEvent;

/// Records a gate event via the global metrics recorder (when enabled).
pub fn record_gate_event(event: GateEvent) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("oauth2_refresh_buffer_gate_total", "event" => event.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = event;
	}
}
