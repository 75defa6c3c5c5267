//! Demonstrates shielding an upstream token endpoint from duplicate refresh-token submissions.
//!
//! Five concurrent requests carry the same refresh token. The first one reaches the upstream;
//! the others wait on the gate and receive the buffered response marked with `X-Buffered`.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use oauth2_refresh_buffer::{
	buffer::{BUFFERED_HEADER, RefreshBuffer},
	config::ConsumerConfigs,
	http::{Method, Request, ReqwestTokenEndpoint, header},
	store::{CoordinationStore, MemoryStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.delay(std::time::Duration::from_millis(200))
				.body(
					"{\"access_token\":\"demo-access\",\"refresh_token\":\"demo-refresh-2\",\"token_type\":\"bearer\",\"expires_in\":900}",
				);
		})
		.await;
	let store: Arc<dyn CoordinationStore> = Arc::new(MemoryStore::default());
	let configs = ConsumerConfigs::from_json(
		r#"{"consumers":{"mobile-app":{"enabled":true,"wait_timeout_ms":100,"wait_retry_count":10}}}"#,
	)?;
	let endpoint = ReqwestTokenEndpoint::new(Url::parse(&server.url("/token"))?)?;
	let buffer = RefreshBuffer::new(store, Arc::new(configs), Arc::new(endpoint));
	let body = url::form_urlencoded::Serializer::new(String::new())
		.append_pair("grant_type", "refresh_token")
		.append_pair("client_id", "mobile-app")
		.append_pair("refresh_token", "demo-refresh-1")
		.finish();
	let mut handles = Vec::new();

	for attempt in 0..5 {
		let buffer = buffer.clone();
		let request = Request::builder()
			.method(Method::POST)
			.uri("/oauth/token")
			.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
			.body(body.clone().into_bytes())?;

		handles.push(tokio::spawn(async move { (attempt, buffer.handle(request).await) }));
	}

	for handle in handles {
		let (attempt, response) = handle.await?;

		println!(
			"attempt {attempt}: status={} buffered={} body={}",
			response.status(),
			response.headers().contains_key(BUFFERED_HEADER),
			String::from_utf8_lossy(response.body())
		);
	}

	token_mock.assert_calls_async(1).await;

	println!("gate metrics: {:?}", buffer.gate().metrics());

	Ok(())
}
