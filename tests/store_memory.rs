mod common;

// crates.io
use time::Duration;
// self
use oauth2_refresh_buffer::store::{CoordinationStore, GateEntry, MemoryStore, PutOutcome};

#[tokio::test]
async fn set_get_delete_round_trip() {
	let store = MemoryStore::default();
	let key = common::key("memory-round-trip");

	assert_eq!(store.get(&key).await.expect("Get should succeed."), None);

	store
		.set(&key, GateEntry::completed(b"{\"access_token\":\"a\"}".to_vec()), Duration::minutes(1))
		.await
		.expect("Set should succeed.");

	assert_eq!(
		store.get(&key).await.expect("Get should succeed."),
		Some(GateEntry::completed(b"{\"access_token\":\"a\"}".to_vec()))
	);

	store.delete(&key).await.expect("Delete should succeed.");
	store.delete(&key).await.expect("Deleting a missing key should succeed.");

	assert_eq!(store.get(&key).await.expect("Get should succeed."), None);
}

#[tokio::test]
async fn set_overwrites_in_flight_marker() {
	let store = MemoryStore::default();
	let key = common::key("memory-overwrite");

	store
		.set(&key, GateEntry::InFlight, Duration::minutes(1))
		.await
		.expect("Seeding in-flight marker should succeed.");
	store
		.set(&key, GateEntry::completed(b"done".to_vec()), Duration::minutes(1))
		.await
		.expect("Overwriting should succeed.");

	assert_eq!(
		store.get(&key).await.expect("Get should succeed."),
		Some(GateEntry::completed(b"done".to_vec()))
	);
}

#[tokio::test]
async fn put_if_absent_respects_live_and_expired_entries() {
	let store = MemoryStore::default();
	let key = common::key("memory-put");
	let first = store
		.put_if_absent(&key, GateEntry::InFlight, Duration::milliseconds(40))
		.await
		.expect("First put should succeed.");
	let second = store
		.put_if_absent(&key, GateEntry::completed(b"late".to_vec()), Duration::minutes(1))
		.await
		.expect("Second put should succeed.");

	assert_eq!(first, PutOutcome::Inserted);
	assert_eq!(second, PutOutcome::Occupied(GateEntry::InFlight));

	tokio::time::sleep(std::time::Duration::from_millis(60)).await;

	let third = store
		.put_if_absent(&key, GateEntry::InFlight, Duration::minutes(1))
		.await
		.expect("Third put should succeed.");

	assert_eq!(third, PutOutcome::Inserted);
}

#[tokio::test]
async fn expired_entries_are_invisible_and_purgeable() {
	let store = MemoryStore::default();
	let short = common::key("memory-short");
	let long = common::key("memory-long");

	store
		.set(&short, GateEntry::completed(b"short".to_vec()), Duration::milliseconds(20))
		.await
		.expect("Set should succeed.");
	store
		.set(&long, GateEntry::completed(b"long".to_vec()), Duration::minutes(1))
		.await
		.expect("Set should succeed.");
	tokio::time::sleep(std::time::Duration::from_millis(40)).await;

	assert_eq!(store.len(), 2);
	assert_eq!(store.purge_expired(), 1);
	assert_eq!(store.get(&short).await.expect("Get should succeed."), None);
	assert_eq!(
		store.get(&long).await.expect("Get should succeed."),
		Some(GateEntry::completed(b"long".to_vec()))
	);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_put_if_absent_allows_single_winner() {
	let store = MemoryStore::default();
	let key = common::key("memory-race");
	let tasks = (0..32)
		.map(|_| {
			let store = store.clone();

			tokio::spawn(async move {
				store
					.put_if_absent(&key, GateEntry::InFlight, Duration::minutes(1))
					.await
					.expect("Racing put should succeed.")
			})
		})
		.collect::<Vec<_>>();
	let mut winners = 0;

	for task in tasks {
		if task.await.expect("Racing task should not panic.") == PutOutcome::Inserted {
			winners += 1;
		}
	}

	assert_eq!(winners, 1, "only one put_if_absent should insert");
}
