//! Thread-safe in-memory [`CoordinationStore`] for single-instance deployments and tests.

// self
use crate::{
	_prelude::*,
	fingerprint::Fingerprint,
	store::{CoordinationStore, GateEntry, PutOutcome, StoreError, StoreFuture, StoredEntry},
};

type StoreMap = Arc<RwLock<HashMap<Fingerprint, StoredEntry>>>;

/// Thread-safe storage backend that keeps gate entries in-process.
///
/// Expired entries are dropped lazily on access; call [`MemoryStore::purge_expired`] from a
/// housekeeping task to reclaim entries nobody asks for again.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Removes every expired entry, returning how many were dropped.
	pub fn purge_expired(&self) -> usize {
		let now = OffsetDateTime::now_utc();
		let mut guard = self.0.write();
		let before = guard.len();

		guard.retain(|_, stored| !stored.is_expired_at(now));

		before - guard.len()
	}

	/// Number of stored entries, including expired ones not yet purged.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns true when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn get_now(map: StoreMap, key: Fingerprint) -> Option<GateEntry> {
		let now = OffsetDateTime::now_utc();

		{
			let guard = map.read();

			match guard.get(&key) {
				Some(stored) if !stored.is_expired_at(now) => return Some(stored.entry.clone()),
				Some(_) => {},
				None => return None,
			}
		}

		let mut guard = map.write();

		// Re-check under the write lock; a writer may have refreshed the entry meanwhile.
		if guard.get(&key).is_some_and(|stored| stored.is_expired_at(now)) {
			guard.remove(&key);
		}

		guard.get(&key).map(|stored| stored.entry.clone())
	}

	fn set_now(map: StoreMap, key: Fingerprint, entry: GateEntry, ttl: Duration) {
		let stored = StoredEntry::new(entry, ttl, OffsetDateTime::now_utc());

		map.write().insert(key, stored);
	}

	fn put_if_absent_now(
		map: StoreMap,
		key: Fingerprint,
		entry: GateEntry,
		ttl: Duration,
	) -> PutOutcome {
		let now = OffsetDateTime::now_utc();
		let mut guard = map.write();

		match guard.get(&key) {
			Some(stored) if !stored.is_expired_at(now) => PutOutcome::Occupied(stored.entry.clone()),
			_ => {
				guard.insert(key, StoredEntry::new(entry, ttl, now));

				PutOutcome::Inserted
			},
		}
	}
}
impl CoordinationStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a Fingerprint) -> StoreFuture<'a, Option<GateEntry>> {
		let map = self.0.clone();
		let key = *key;

		Box::pin(async move { Ok(Self::get_now(map, key)) })
	}

	fn set<'a>(
		&'a self,
		key: &'a Fingerprint,
		entry: GateEntry,
		ttl: Duration,
	) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let key = *key;

		Box::pin(async move {
			Self::set_now(map, key, entry, ttl);

			Ok(())
		})
	}

	fn delete<'a>(&'a self, key: &'a Fingerprint) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let key = *key;

		Box::pin(async move {
			map.write().remove(&key);

			Ok::<_, StoreError>(())
		})
	}

	fn put_if_absent<'a>(
		&'a self,
		key: &'a Fingerprint,
		entry: GateEntry,
		ttl: Duration,
	) -> StoreFuture<'a, PutOutcome> {
		let map = self.0.clone();
		let key = *key;

		Box::pin(async move { Ok(Self::put_if_absent_now(map, key, entry, ttl)) })
	}
}
