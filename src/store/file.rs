//! File-backed [`CoordinationStore`] shared by processes on one host.
//!
//! The JSON snapshot on disk is the only source of truth. Every operation takes an exclusive
//! advisory lock on a sibling `.lock` file, reloads the snapshot, applies its change, and
//! publishes the result through a `.tmp` file plus rename before releasing the lock. Two
//! stores opened on the same path, in one process or many, therefore admit one caller per
//! fingerprint.
//!
//! Disk work runs on the Tokio blocking pool. Each call still rewrites the whole snapshot while
//! holding the lock, so the store suits low-throughput deployments; prefer a networked store
//! when many hosts or heavy refresh traffic share the gate.

// std
use std::{
	ffi::OsString,
	fs::{self, OpenOptions},
	io::{self, Write},
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	fingerprint::Fingerprint,
	store::{CoordinationStore, GateEntry, PutOutcome, StoreError, StoreFuture, StoredEntry},
};

/// Snapshot keyed by [`Fingerprint::encode`].
type Snapshot = HashMap<String, StoredEntry>;

/// Persists gate entries to a JSON file guarded by an advisory lock.
#[derive(Clone, Debug)]
pub struct FileStore {
	paths: Arc<SnapshotPaths>,
}
impl FileStore {
	/// Opens the snapshot at `path`, creating parent directories as needed.
	///
	/// A missing or empty file yields an empty store. A snapshot that cannot be decoded is
	/// reported here instead of on first use.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let paths = SnapshotPaths::new(path.into());

		create_parent(&paths.snapshot)?;
		paths.locked(|_, _| ((), false))?;

		Ok(Self { paths: Arc::new(paths) })
	}

	/// Location of the snapshot file.
	pub fn path(&self) -> &Path {
		&self.paths.snapshot
	}

	fn transact<'a, T, F>(&'a self, op: F) -> StoreFuture<'a, T>
	where
		T: 'static + Send,
		F: 'static + Send + FnOnce(&mut Snapshot, OffsetDateTime) -> (T, bool),
	{
		let paths = self.paths.clone();

		Box::pin(async move {
			tokio::task::spawn_blocking(move || paths.locked(op)).await.map_err(|e| {
				StoreError::Backend { message: format!("File store worker failed: {e}") }
			})?
		})
	}
}
impl CoordinationStore for FileStore {
	fn get<'a>(&'a self, key: &'a Fingerprint) -> StoreFuture<'a, Option<GateEntry>> {
		let slot = key.encode();

		self.transact(move |entries, _| (entries.get(&slot).map(|stored| stored.entry.clone()), false))
	}

	fn set<'a>(
		&'a self,
		key: &'a Fingerprint,
		entry: GateEntry,
		ttl: Duration,
	) -> StoreFuture<'a, ()> {
		let slot = key.encode();

		self.transact(move |entries, now| {
			entries.insert(slot, StoredEntry::new(entry, ttl, now));

			((), true)
		})
	}

	fn delete<'a>(&'a self, key: &'a Fingerprint) -> StoreFuture<'a, ()> {
		let slot = key.encode();

		self.transact(move |entries, _| ((), entries.remove(&slot).is_some()))
	}

	fn put_if_absent<'a>(
		&'a self,
		key: &'a Fingerprint,
		entry: GateEntry,
		ttl: Duration,
	) -> StoreFuture<'a, PutOutcome> {
		let slot = key.encode();

		self.transact(move |entries, now| match entries.get(&slot) {
			Some(occupant) => (PutOutcome::Occupied(occupant.entry.clone()), false),
			None => {
				entries.insert(slot, StoredEntry::new(entry, ttl, now));

				(PutOutcome::Inserted, true)
			},
		})
	}
}

#[derive(Debug)]
struct SnapshotPaths {
	snapshot: PathBuf,
	staging: PathBuf,
	lock: PathBuf,
}
impl SnapshotPaths {
	fn new(snapshot: PathBuf) -> Self {
		let sibling = |suffix: &str| {
			let mut name = OsString::from(snapshot.as_os_str());

			name.push(suffix);

			PathBuf::from(name)
		};

		Self { staging: sibling(".tmp"), lock: sibling(".lock"), snapshot }
	}

	/// Runs `op` against the live entries while holding the exclusive lock.
	///
	/// `op` returns its value and whether it changed the snapshot. Expired entries are hidden
	/// from `op` and dropped whenever the snapshot is rewritten.
	fn locked<T>(
		&self,
		op: impl FnOnce(&mut Snapshot, OffsetDateTime) -> (T, bool),
	) -> Result<T, StoreError> {
		let handle = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(false)
			.open(&self.lock)
			.map_err(io_failure("open", &self.lock))?;
		let mut lock = fd_lock::RwLock::new(handle);
		let _guard = lock.write().map_err(io_failure("lock", &self.lock))?;
		let now = OffsetDateTime::now_utc();
		let mut entries = read_snapshot(&self.snapshot)?;

		entries.retain(|_, stored| !stored.is_expired_at(now));

		let (value, changed) = op(&mut entries, now);

		if changed {
			self.publish(&entries)?;
		}

		Ok(value)
	}

	fn publish(&self, entries: &Snapshot) -> Result<(), StoreError> {
		let serialized = serde_json::to_vec_pretty(entries).map_err(|e| {
			StoreError::Serialization { message: format!("Cannot encode gate snapshot: {e}") }
		})?;
		let mut file = OpenOptions::new()
			.write(true)
			.create(true)
			.truncate(true)
			.open(&self.staging)
			.map_err(io_failure("open", &self.staging))?;

		file.write_all(&serialized).map_err(io_failure("write", &self.staging))?;
		file.sync_all().map_err(io_failure("sync", &self.staging))?;
		drop(file);

		fs::rename(&self.staging, &self.snapshot).map_err(io_failure("publish", &self.snapshot))
	}
}

fn io_failure<'p>(action: &'static str, path: &'p Path) -> impl FnOnce(io::Error) -> StoreError + 'p {
	move |e| StoreError::Backend { message: format!("Cannot {action} {}: {e}", path.display()) }
}

fn create_parent(path: &Path) -> Result<(), StoreError> {
	match path.parent() {
		Some(parent) if !parent.as_os_str().is_empty() =>
			fs::create_dir_all(parent).map_err(io_failure("create", parent)),
		_ => Ok(()),
	}
}

fn read_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
	let bytes = match fs::read(path) {
		Ok(bytes) => bytes,
		Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Snapshot::new()),
		Err(e) => return Err(io_failure("read", path)(e)),
	};

	if bytes.iter().all(u8::is_ascii_whitespace) {
		return Ok(Snapshot::new());
	}

	let mut de = serde_json::Deserializer::from_slice(&bytes);

	serde_path_to_error::deserialize(&mut de).map_err(|e| StoreError::Serialization {
		message: format!("Cannot decode {} at `{}`: {}", path.display(), e.path(), e.inner()),
	})
}
