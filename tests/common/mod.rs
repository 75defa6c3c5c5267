#![allow(dead_code)]

// std
use std::{future::Future, pin::Pin};
// crates.io
use time::Duration;
// self
pub use oauth2_refresh_buffer::_preludet::{CountingEndpoint, refresh_request};
use oauth2_refresh_buffer::{
	config::GateConfig,
	fingerprint::{Fingerprint, RequestParams},
	store::{CoordinationStore, GateEntry, PutOutcome, StoreError, StoreFuture},
};

pub fn gate_config(wait_ms: i64, retries: u32) -> GateConfig {
	GateConfig::default().with_wait_unit(Duration::milliseconds(wait_ms)).with_max_retries(retries)
}

pub fn key(refresh_token: &str) -> Fingerprint {
	let params: RequestParams = [
		("grant_type", "refresh_token"),
		("client_id", "client-it"),
		("refresh_token", refresh_token),
	]
	.into_iter()
	.collect();

	Fingerprint::of(&params).expect("Integration fixture should fingerprint.")
}

/// Store whose every operation fails, standing in for an unreachable backend.
pub struct UnavailableStore;
impl UnavailableStore {
	fn fail<'a, T>() -> Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>
	where
		T: 'a + Send,
	{
		Box::pin(async { Err(StoreError::Backend { message: "connection refused".into() }) })
	}
}
impl CoordinationStore for UnavailableStore {
	fn get<'a>(&'a self, _key: &'a Fingerprint) -> StoreFuture<'a, Option<GateEntry>> {
		Self::fail()
	}

	fn set<'a>(
		&'a self,
		_key: &'a Fingerprint,
		_entry: GateEntry,
		_ttl: Duration,
	) -> StoreFuture<'a, ()> {
		Self::fail()
	}

	fn delete<'a>(&'a self, _key: &'a Fingerprint) -> StoreFuture<'a, ()> {
		Self::fail()
	}

	fn put_if_absent<'a>(
		&'a self,
		_key: &'a Fingerprint,
		_entry: GateEntry,
		_ttl: Duration,
	) -> StoreFuture<'a, PutOutcome> {
		Self::fail()
	}
}
