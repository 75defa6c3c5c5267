//! Single-flight gate: the coordination protocol in front of the protected token exchange.
//!
//! Every evaluation works only through the injected [`CoordinationStore`], so admitted and
//! waiting callers may live in different tasks, processes, or hosts. Per fingerprint the store
//! holds nothing (`Absent`), [`GateEntry::InFlight`], or [`GateEntry::Completed`]:
//!
//! - `Absent` is turned into `InFlight` with [`CoordinationStore::put_if_absent`], so exactly one
//!   caller receives [`GateOutcome::Proceed`].
//! - `InFlight` makes the caller suspend for `wait_unit` and poll again, at most `max_retries`
//!   times, before it receives [`GateOutcome::TimedOut`].
//! - `Completed` is returned at once as [`GateOutcome::Replay`].
//!
//! The admitted caller finishes with [`SingleFlightGate::complete`] on success or
//! [`SingleFlightGate::abort`] on failure; anything else leaves waiters polling until the
//! in-flight marker expires.

mod metrics;

pub use metrics::GateMetrics;

// std
use std::pin::pin;
// self
use crate::{
	_prelude::*,
	config::GateConfig,
	fingerprint::Fingerprint,
	obs::{self, GateEvent, GateSpan, gate_event},
	store::{CoordinationStore, GateEntry, PutOutcome},
};

/// Decision returned by [`SingleFlightGate::evaluate`].
#[derive(Clone, PartialEq, Eq)]
pub enum GateOutcome {
	/// The caller owns the in-flight marker and must run the protected action.
	Proceed,
	/// Another caller already succeeded; return `payload` without running the action.
	Replay {
		/// Verbatim result stored by the admitted caller.
		payload: Vec<u8>,
	},
	/// The entry stayed in flight through every retry; the caller must fail without running the
	/// action.
	TimedOut,
}
impl Debug for GateOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Proceed => f.write_str("Proceed"),
			Self::Replay { payload } =>
				f.debug_struct("Replay").field("payload_len", &payload.len()).finish(),
			Self::TimedOut => f.write_str("TimedOut"),
		}
	}
}

/// Store-backed single-flight gate.
#[derive(Clone)]
pub struct SingleFlightGate {
	store: Arc<dyn CoordinationStore>,
	metrics: Arc<GateMetrics>,
}
impl SingleFlightGate {
	/// Creates a gate that coordinates through `store`.
	pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
		Self { store, metrics: Default::default() }
	}

	/// Coordination store shared by every evaluation.
	pub fn store(&self) -> &Arc<dyn CoordinationStore> {
		&self.store
	}

	/// Decision counters recorded by this gate instance.
	pub fn metrics(&self) -> &GateMetrics {
		&self.metrics
	}

	/// Decides whether the caller proceeds, replays, or times out.
	///
	/// Dropping the returned future abandons the evaluation; use
	/// [`evaluate_until`](Self::evaluate_until) to tie it to an explicit cancellation signal.
	pub async fn evaluate(&self, key: &Fingerprint, config: &GateConfig) -> Result<GateOutcome> {
		self.evaluate_until(key, config, std::future::pending()).await
	}

	/// Like [`evaluate`](Self::evaluate), but resolves to [`Error::Cancelled`] as soon as
	/// `cancel` completes while the caller is suspended between polls.
	pub async fn evaluate_until<C>(
		&self,
		key: &Fingerprint,
		config: &GateConfig,
		cancel: C,
	) -> Result<GateOutcome>
	where
		C: Future<Output = ()>,
	{
		let span = GateSpan::new("evaluate", key);

		span.instrument(async move {
			let mut cancel = pin!(cancel);
			let mut retries = 0_u32;

			loop {
				let outcome =
					self.store.put_if_absent(key, GateEntry::InFlight, config.in_flight_ttl).await?;

				match outcome {
					PutOutcome::Inserted => {
						gate_event!(info, fingerprint = %key, retries, "Admitted refresh request.");
						self.record(GateEvent::Admitted);

						return Ok(GateOutcome::Proceed);
					},
					PutOutcome::Occupied(GateEntry::Completed { payload }) => {
						gate_event!(info, fingerprint = %key, retries, "Replaying buffered response.");
						self.record(GateEvent::Replayed);

						return Ok(GateOutcome::Replay { payload });
					},
					PutOutcome::Occupied(GateEntry::InFlight) if retries < config.max_retries => {
						gate_event!(warn, fingerprint = %key, retries, "Waiting for in-flight refresh.");
						self.record(GateEvent::Waited);

						tokio::select! {
							biased;
							_ = &mut cancel => return Err(Error::Cancelled),
							_ = tokio::time::sleep(config.wait_unit.unsigned_abs()) => {},
						}

						retries += 1;
					},
					PutOutcome::Occupied(GateEntry::InFlight) => {
						gate_event!(
							error,
							fingerprint = %key,
							retries,
							"Timed out waiting for in-flight refresh to complete."
						);
						self.record(GateEvent::TimedOut);

						return Ok(GateOutcome::TimedOut);
					},
				}
			}
		})
		.await
	}

	/// Stores the admitted caller's successful result for replay during `result_ttl`.
	pub async fn complete(
		&self,
		key: &Fingerprint,
		payload: impl Into<Vec<u8>>,
		config: &GateConfig,
	) -> Result<()> {
		self.store.set(key, GateEntry::completed(payload), config.result_ttl).await?;

		gate_event!(info, fingerprint = %key, "Buffered refresh response.");
		self.record(GateEvent::Completed);

		Ok(())
	}

	/// Removes the admitted caller's in-flight marker after the protected action failed, so
	/// the next poll of any waiter observes `Absent`.
	pub async fn abort(&self, key: &Fingerprint) -> Result<()> {
		self.store.delete(key).await?;

		gate_event!(warn, fingerprint = %key, "Released in-flight marker after failure.");
		self.record(GateEvent::Aborted);

		Ok(())
	}

	fn record(&self, event: GateEvent) {
		match event {
			GateEvent::Admitted => self.metrics.record_admitted(),
			GateEvent::Replayed => self.metrics.record_replayed(),
			GateEvent::TimedOut => self.metrics.record_timed_out(),
			GateEvent::Waited => self.metrics.record_wait(),
			GateEvent::Aborted => self.metrics.record_aborted(),
			GateEvent::Completed | GateEvent::Bypassed => {},
		}

		obs::record_gate_event(event);
	}
}
impl Debug for SingleFlightGate {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SingleFlightGate").field("metrics", &self.metrics).finish()
	}
}
