//! Single-flight buffer for OAuth 2.0 refresh-token requests: fingerprint duplicate
//! submissions, admit exactly one token exchange, and replay its result to every other caller.

#![deny(clippy::all, missing_docs)]
#![cfg_attr(not(test), deny(unused_crate_dependencies))]

pub mod buffer;
pub mod config;
pub mod consumer;
pub mod error;
pub mod fingerprint;
pub mod gate;
pub mod http;
pub mod obs;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for tests; enabled via `cfg(test)` or the `test`
	//! crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		config::GateConfig,
		http::{ActionFuture, HttpRequest, HttpResponse, TokenEndpoint},
	};
	#[cfg(feature = "reqwest")]
	use crate::http::ReqwestTokenEndpoint;
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};

	/// Gate configuration used across tests: 50 ms polls, 10 retries.
	pub fn test_gate_config() -> GateConfig {
		GateConfig::default().with_wait_unit(Duration::milliseconds(50)).with_max_retries(10)
	}

	/// Deterministic token endpoint that counts invocations and answers with a fixed response.
	#[derive(Debug)]
	pub struct CountingEndpoint {
		status: u16,
		body: Vec<u8>,
		delay: Duration,
		calls: AtomicUsize,
	}
	impl CountingEndpoint {
		/// Creates an endpoint answering `status` with `body` after `delay`.
		pub fn new(status: u16, body: impl Into<Vec<u8>>, delay: Duration) -> Self {
			Self { status, body: body.into(), delay, calls: AtomicUsize::new(0) }
		}

		/// Returns how many times the endpoint has been invoked.
		pub fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}
	}
	impl TokenEndpoint for CountingEndpoint {
		fn execute(&self, _request: HttpRequest) -> ActionFuture<'_> {
			Box::pin(async move {
				self.calls.fetch_add(1, Ordering::SeqCst);

				if self.delay.is_positive() {
					tokio::time::sleep(self.delay.unsigned_abs()).await;
				}

				let mut response = HttpResponse::new(self.body.clone());

				*response.status_mut() = crate::http::StatusCode::from_u16(self.status)
					.expect("Counting endpoint status should be a valid HTTP status.");

				Ok(response)
			})
		}
	}

	/// Builds a reqwest forwarder that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_endpoint(upstream: Url) -> ReqwestTokenEndpoint {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestTokenEndpoint::with_client(upstream, client)
	}

	/// Builds a form-encoded refresh-token request addressed to `/oauth/token`.
	pub fn refresh_request(client_id: &str, refresh_token: &str) -> HttpRequest {
		let body = url::form_urlencoded::Serializer::new(String::new())
			.append_pair("grant_type", "refresh_token")
			.append_pair("client_id", client_id)
			.append_pair("client_secret", "secret")
			.append_pair("refresh_token", refresh_token)
			.append_pair("scope", "openid profile")
			.finish();

		crate::http::Request::builder()
			.method(crate::http::Method::POST)
			.uri("/oauth/token")
			.header(crate::http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
			.body(body.into_bytes())
			.expect("Refresh request fixture should build.")
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::RwLock;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
