// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for gate decisions taken by this process.
#[derive(Debug, Default)]
pub struct GateMetrics {
	admitted: AtomicU64,
	replayed: AtomicU64,
	timed_out: AtomicU64,
	waits: AtomicU64,
	aborted: AtomicU64,
}
impl GateMetrics {
	/// Returns how many evaluations were admitted to run the protected action.
	pub fn admitted(&self) -> u64 {
		self.admitted.load(Ordering::Relaxed)
	}

	/// Returns how many evaluations replayed a completed result.
	pub fn replayed(&self) -> u64 {
		self.replayed.load(Ordering::Relaxed)
	}

	/// Returns how many evaluations gave up after exhausting their retries.
	pub fn timed_out(&self) -> u64 {
		self.timed_out.load(Ordering::Relaxed)
	}

	/// Returns the total number of suspensions across all evaluations.
	pub fn waits(&self) -> u64 {
		self.waits.load(Ordering::Relaxed)
	}

	/// Returns how many admitted callers aborted.
	pub fn aborted(&self) -> u64 {
		self.aborted.load(Ordering::Relaxed)
	}

	pub(crate) fn record_admitted(&self) {
		self.admitted.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_replayed(&self) {
		self.replayed.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_timed_out(&self) {
		self.timed_out.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_wait(&self) {
		self.waits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_aborted(&self) {
		self.aborted.fetch_add(1, Ordering::Relaxed);
	}
}
