//! Optional observability helpers for the gate and the adapter.
//!
//! # Feature Flags
//!
//! - Enable `tracing` (default) to emit spans named `oauth2_refresh_buffer.gate` with `stage`
//!   and `fingerprint` fields, plus events for admissions, waits, replays, and timeouts.
//! - Enable `metrics` to increment the `oauth2_refresh_buffer_gate_total` counter for every
//!   gate event, labeled by `event`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

pub(crate) use tracing::gate_event;

// self
use crate::_prelude::*;

/// Gate events observed by the buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GateEvent {
	/// A caller was admitted to run the protected action.
	Admitted,
	/// A caller found the entry in flight and suspended before polling again.
	Waited,
	/// A caller received a completed result.
	Replayed,
	/// A caller exhausted its retry budget.
	TimedOut,
	/// The admitted caller stored its result.
	Completed,
	/// The admitted caller removed its in-flight marker after a failure.
	Aborted,
	/// The gate was skipped because the coordination store failed.
	Bypassed,
}
impl GateEvent {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			GateEvent::Admitted => "admitted",
			GateEvent::Waited => "waited",
			GateEvent::Replayed => "replayed",
			GateEvent::TimedOut => "timed_out",
			GateEvent::Completed => "completed",
			GateEvent::Aborted => "aborted",
			GateEvent::Bypassed => "bypassed",
		}
	}
}
impl Display for GateEvent {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
