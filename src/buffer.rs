//! Integration adapter that puts the single-flight gate in front of a token endpoint.
//!
//! [`RefreshBuffer::handle`] takes an inbound HTTP request and always produces a response:
//!
//! - Requests that are not form-encoded `grant_type=refresh_token` POSTs to the token path, or
//!   whose consumer has buffering disabled, go straight to the [`TokenEndpoint`].
//! - Eligible requests are fingerprinted and evaluated. The admitted caller runs the endpoint
//!   and buffers a `200 OK` body; any other outcome releases the in-flight marker.
//! - Duplicates receive the buffered body with an `X-Buffered` marker and no-store cache
//!   headers, or an empty `500` when the admitted caller did not finish in time.
//!
//! Gate errors never escape: encoding failures become `400`, transport failures `502`, and
//! store failures follow the configured [`StoreFailurePolicy`].

// crates.io
use oauth2::http::HeaderValue;
// self
use crate::{
	_prelude::*,
	config::{ConfigSource, GateConfig, StoreFailurePolicy},
	consumer::ConsumerId,
	fingerprint::{Fingerprint, RequestParams},
	gate::{GateOutcome, SingleFlightGate},
	http::{HttpRequest, HttpResponse, Method, StatusCode, TokenEndpoint, header},
	obs::{self, GateEvent, gate_event},
	store::CoordinationStore,
};

/// Token path handled by default.
pub const DEFAULT_TOKEN_PATH: &str = "/oauth/token";
/// Response header marking a replayed (buffered) response.
pub const BUFFERED_HEADER: &str = "x-buffered";
/// Request header naming the consumer when the body does not.
pub const CONSUMER_HEADER: &str = "x-consumer-id";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const REFRESH_GRANT: &str = "refresh_token";

/// Gate-eligible request, resolved against its consumer's configuration.
#[derive(Clone, Debug)]
pub struct Admission {
	/// Request fingerprint used as the store key.
	pub key: Fingerprint,
	/// Consumer the configuration was resolved for.
	pub consumer: Option<ConsumerId>,
	/// Configuration for this evaluation.
	pub config: GateConfig,
}

/// Refresh-token buffer wired to a store, a configuration source, and a token endpoint.
#[derive(Clone)]
pub struct RefreshBuffer {
	gate: SingleFlightGate,
	configs: Arc<dyn ConfigSource>,
	endpoint: Arc<dyn TokenEndpoint>,
	token_path: String,
	failure_policy: StoreFailurePolicy,
}
impl RefreshBuffer {
	/// Creates a buffer handling [`DEFAULT_TOKEN_PATH`] with the fail-open store policy.
	pub fn new(
		store: Arc<dyn CoordinationStore>,
		configs: Arc<dyn ConfigSource>,
		endpoint: Arc<dyn TokenEndpoint>,
	) -> Self {
		Self {
			gate: SingleFlightGate::new(store),
			configs,
			endpoint,
			token_path: DEFAULT_TOKEN_PATH.into(),
			failure_policy: StoreFailurePolicy::default(),
		}
	}

	/// Overrides the path whose refresh requests are buffered.
	pub fn with_token_path(mut self, path: impl Into<String>) -> Self {
		self.token_path = path.into();

		self
	}

	/// Overrides the reaction to coordination store failures.
	pub fn with_failure_policy(mut self, policy: StoreFailurePolicy) -> Self {
		self.failure_policy = policy;

		self
	}

	/// Gate shared by every request handled through this buffer.
	pub fn gate(&self) -> &SingleFlightGate {
		&self.gate
	}

	/// Returns true when `request` would go through the gate.
	///
	/// Malformed bodies and configuration lookup failures count as not gated here; [`handle`]
	/// reports them properly.
	///
	/// [`handle`]: Self::handle
	pub async fn should_gate(&self, request: &HttpRequest) -> bool {
		matches!(self.admission(request).await, Ok(Some(_)))
	}

	/// Classifies `request`, returning its fingerprint and configuration when it is eligible.
	pub async fn admission(&self, request: &HttpRequest) -> Result<Option<Admission>> {
		if !self.is_refresh_request(request) {
			return Ok(None);
		}

		let params = RequestParams::from_form(request.body())?;

		if params.get("grant_type") != Some(REFRESH_GRANT) {
			return Ok(None);
		}

		let consumer = consumer_of(request, &params);
		let Some(config) = self.configs.resolve(consumer.as_ref()).await? else {
			return Ok(None);
		};
		let key = Fingerprint::of(&params)?;

		Ok(Some(Admission { key, consumer, config }))
	}

	/// Handles `request`, buffering it when eligible.
	pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
		let admission = match self.admission(&request).await {
			Ok(Some(admission)) => admission,
			Ok(None) => return self.forward(request).await,
			Err(Error::Encoding(e)) => {
				gate_event!(warn, error = %e, "Rejected refresh request that cannot be fingerprinted.");

				return error_response(StatusCode::BAD_REQUEST, "invalid_request");
			},
			Err(e) => {
				gate_event!(warn, error = %e, "Buffer configuration unavailable; forwarding unbuffered.");

				return self.forward(request).await;
			},
		};
		let Admission { key, config, .. } = admission;

		match self.gate.evaluate(&key, &config).await {
			Ok(GateOutcome::Proceed) => self.run_admitted(&key, &config, request).await,
			Ok(GateOutcome::Replay { payload }) => buffered_response(payload),
			Ok(GateOutcome::TimedOut) => timeout_response(),
			Err(Error::Storage(e)) => match self.failure_policy {
				StoreFailurePolicy::FailOpen => {
					gate_event!(
						warn,
						fingerprint = %key,
						error = %e,
						"Coordination store unavailable; bypassing the gate."
					);
					obs::record_gate_event(GateEvent::Bypassed);

					self.forward(request).await
				},
				StoreFailurePolicy::FailClosed => {
					gate_event!(
						error,
						fingerprint = %key,
						error = %e,
						"Coordination store unavailable; rejecting refresh request."
					);

					error_response(StatusCode::SERVICE_UNAVAILABLE, "temporarily_unavailable")
				},
			},
			Err(e) => {
				gate_event!(error, fingerprint = %key, error = %e, "Gate evaluation failed.");

				error_response(StatusCode::INTERNAL_SERVER_ERROR, "server_error")
			},
		}
	}

	async fn run_admitted(
		&self,
		key: &Fingerprint,
		config: &GateConfig,
		request: HttpRequest,
	) -> HttpResponse {
		match self.endpoint.execute(request).await {
			Ok(response) if response.status() == StatusCode::OK => {
				if let Err(e) = self.gate.complete(key, response.body().clone(), config).await {
					gate_event!(
						warn,
						fingerprint = %key,
						error = %e,
						"Failed to buffer refresh response; duplicates will wait for expiry."
					);
				}

				response
			},
			Ok(response) => {
				self.release(key).await;

				response
			},
			Err(e) => {
				gate_event!(error, fingerprint = %key, error = %e, "Token endpoint call failed.");
				self.release(key).await;

				error_response(StatusCode::BAD_GATEWAY, "temporarily_unavailable")
			},
		}
	}

	async fn release(&self, key: &Fingerprint) {
		if let Err(e) = self.gate.abort(key).await {
			gate_event!(
				warn,
				fingerprint = %key,
				error = %e,
				"Failed to release in-flight marker; duplicates will wait for expiry."
			);
		}
	}

	async fn forward(&self, request: HttpRequest) -> HttpResponse {
		match self.endpoint.execute(request).await {
			Ok(response) => response,
			Err(e) => {
				gate_event!(error, error = %e, "Token endpoint call failed.");

				error_response(StatusCode::BAD_GATEWAY, "temporarily_unavailable")
			},
		}
	}

	fn is_refresh_request(&self, request: &HttpRequest) -> bool {
		if request.method() != Method::POST || request.uri().path() != self.token_path {
			return false;
		}

		request
			.headers()
			.get(header::CONTENT_TYPE)
			.and_then(|value| value.to_str().ok())
			.and_then(|value| value.split(';').next())
			.is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
	}
}
impl Debug for RefreshBuffer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshBuffer")
			.field("gate", &self.gate)
			.field("token_path", &self.token_path)
			.field("failure_policy", &self.failure_policy)
			.finish()
	}
}

#[derive(Serialize)]
struct ErrorBody {
	error: &'static str,
}

fn consumer_of(request: &HttpRequest, params: &RequestParams) -> Option<ConsumerId> {
	request
		.headers()
		.get(CONSUMER_HEADER)
		.and_then(|value| value.to_str().ok())
		.or_else(|| params.get("client_id"))
		.and_then(|raw| ConsumerId::new(raw).ok())
}

fn with_no_store_headers(mut response: HttpResponse) -> HttpResponse {
	let headers = response.headers_mut();

	headers.insert(
		header::CONTENT_TYPE,
		HeaderValue::from_static("application/json; charset=UTF-8"),
	);
	headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store, private"));
	headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));

	response
}

fn buffered_response(payload: Vec<u8>) -> HttpResponse {
	let mut response = with_no_store_headers(HttpResponse::new(payload));

	response.headers_mut().insert(BUFFERED_HEADER, HeaderValue::from_static("1"));

	response
}

fn timeout_response() -> HttpResponse {
	let mut response = with_no_store_headers(HttpResponse::new(Vec::new()));

	*response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;

	response
}

fn error_response(status: StatusCode, error: &'static str) -> HttpResponse {
	let body = serde_json::to_vec(&ErrorBody { error }).unwrap_or_default();
	let mut response = with_no_store_headers(HttpResponse::new(body));

	*response.status_mut() = status;

	response
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::*, config::StaticConfigSource, http::Request, store::MemoryStore};

	fn buffer() -> RefreshBuffer {
		RefreshBuffer::new(
			Arc::new(MemoryStore::default()),
			Arc::new(StaticConfigSource::enabled(test_gate_config())),
			Arc::new(CountingEndpoint::new(200, "{}", Duration::ZERO)),
		)
	}

	fn form_request(method: Method, path: &str, content_type: &str, body: &str) -> HttpRequest {
		Request::builder()
			.method(method)
			.uri(path)
			.header(header::CONTENT_TYPE, content_type)
			.body(body.as_bytes().to_vec())
			.expect("Request fixture should build.")
	}

	#[tokio::test]
	async fn eligibility_requires_post_path_form_and_refresh_grant() {
		let buffer = buffer();
		let body = "grant_type=refresh_token&refresh_token=abc";

		assert!(
			buffer
				.should_gate(&form_request(Method::POST, "/oauth/token", FORM_CONTENT_TYPE, body))
				.await
		);
		assert!(
			buffer
				.should_gate(&form_request(
					Method::POST,
					"/oauth/token",
					"application/x-www-form-urlencoded; charset=UTF-8",
					body
				))
				.await
		);
		assert!(
			!buffer
				.should_gate(&form_request(Method::GET, "/oauth/token", FORM_CONTENT_TYPE, body))
				.await
		);
		assert!(
			!buffer
				.should_gate(&form_request(Method::POST, "/oauth/other", FORM_CONTENT_TYPE, body))
				.await
		);
		assert!(
			!buffer
				.should_gate(&form_request(Method::POST, "/oauth/token", "application/json", body))
				.await
		);
		assert!(
			!buffer
				.should_gate(&form_request(
					Method::POST,
					"/oauth/token",
					FORM_CONTENT_TYPE,
					"grant_type=authorization_code&code=xyz"
				))
				.await
		);
	}

	#[tokio::test]
	async fn consumer_header_takes_precedence_over_client_id() {
		let buffer = buffer();
		let mut request = refresh_request("body-client", "token");

		request.headers_mut().insert(CONSUMER_HEADER, HeaderValue::from_static("header-client"));

		let admission = buffer
			.admission(&request)
			.await
			.expect("Admission should succeed.")
			.expect("Refresh request should be eligible.");

		assert_eq!(admission.consumer.as_deref(), Some("header-client"));

		let admission = buffer
			.admission(&refresh_request("body-client", "token"))
			.await
			.expect("Admission should succeed.")
			.expect("Refresh request should be eligible.");

		assert_eq!(admission.consumer.as_deref(), Some("body-client"));
	}

	#[test]
	fn buffered_response_carries_marker_and_cache_headers() {
		let response = buffered_response(b"{\"access_token\":\"a\"}".to_vec());

		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(response.body(), b"{\"access_token\":\"a\"}");
		assert_eq!(response.headers()[BUFFERED_HEADER], "1");
		assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store, private");
		assert_eq!(response.headers()[header::PRAGMA], "no-cache");
	}

	#[test]
	fn timeout_response_is_empty_server_error() {
		let response = timeout_response();

		assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
		assert!(response.body().is_empty());
		assert!(!response.headers().contains_key(BUFFERED_HEADER));
	}
}
