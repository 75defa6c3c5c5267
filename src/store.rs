//! Coordination store contracts and built-in store implementations for gate entries.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, fingerprint::Fingerprint};

/// Boxed future returned by [`CoordinationStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Shared, TTL-capable key-value store reachable by every handler instance.
///
/// Implementations must hide expired entries from every operation and must execute
/// [`put_if_absent`](CoordinationStore::put_if_absent) atomically with respect to concurrent
/// callers, since the gate relies on it for single admission.
pub trait CoordinationStore
where
	Self: Send + Sync,
{
	/// Fetches the live entry stored under `key`, if any.
	fn get<'a>(&'a self, key: &'a Fingerprint) -> StoreFuture<'a, Option<GateEntry>>;

	/// Stores `entry` under `key` for `ttl`, replacing whatever was there.
	fn set<'a>(
		&'a self,
		key: &'a Fingerprint,
		entry: GateEntry,
		ttl: Duration,
	) -> StoreFuture<'a, ()>;

	/// Removes the entry stored under `key`; missing keys are not an error.
	fn delete<'a>(&'a self, key: &'a Fingerprint) -> StoreFuture<'a, ()>;

	/// Stores `entry` only when no live entry exists, returning the occupant otherwise.
	fn put_if_absent<'a>(
		&'a self,
		key: &'a Fingerprint,
		entry: GateEntry,
		ttl: Duration,
	) -> StoreFuture<'a, PutOutcome>;
}

/// Value recorded under a request fingerprint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GateEntry {
	/// The protected action for this fingerprint is running somewhere.
	InFlight,
	/// The protected action succeeded; `payload` is replayed verbatim to duplicates.
	Completed {
		/// Response body produced by the admitted caller.
		#[serde(with = "payload_base64")]
		payload: Vec<u8>,
	},
}
impl GateEntry {
	/// Builds a completed entry.
	pub fn completed(payload: impl Into<Vec<u8>>) -> Self {
		Self::Completed { payload: payload.into() }
	}

	/// Returns true for the in-flight marker.
	pub fn is_in_flight(&self) -> bool {
		matches!(self, Self::InFlight)
	}
}
impl Debug for GateEntry {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::InFlight => f.write_str("InFlight"),
			Self::Completed { payload } =>
				f.debug_struct("Completed").field("payload_len", &payload.len()).finish(),
		}
	}
}

/// Entry plus the instant after which stores must treat it as absent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
	/// Stored gate entry.
	pub entry: GateEntry,
	/// Expiry instant.
	#[serde(with = "time::serde::rfc3339")]
	pub expires_at: OffsetDateTime,
}
impl StoredEntry {
	/// Wraps `entry` with an expiry `ttl` from `now`.
	pub fn new(entry: GateEntry, ttl: Duration, now: OffsetDateTime) -> Self {
		Self { entry, expires_at: now.saturating_add(ttl) }
	}

	/// Returns true once `now` reaches the expiry instant.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		now >= self.expires_at
	}
}

/// Result of a [`CoordinationStore::put_if_absent`] attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PutOutcome {
	/// No live entry existed; the provided entry is now stored.
	Inserted,
	/// A live entry already occupied the key and was left untouched.
	Occupied(GateEntry),
}

/// Error type produced by [`CoordinationStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine (the store is unavailable).
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

mod payload_base64 {
	// crates.io
	use base64::{Engine as _, engine::general_purpose::STANDARD};
	use serde::{Deserialize, Deserializer, Serializer, de::Error as DeError};

	pub(super) fn serialize<S>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&STANDARD.encode(payload))
	}

	pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;

		STANDARD.decode(raw.as_bytes()).map_err(D::Error::custom)
	}
}
