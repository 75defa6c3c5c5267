//! Transport primitives for the protected token exchange.
//!
//! The buffer never interprets the exchange itself. It hands the inbound request to a
//! [`TokenEndpoint`] (the protected action) and only looks at the resulting status and body.
//! [`ReqwestTokenEndpoint`] forwards the request to an upstream authorization server, which is
//! what a buffering proxy in front of an existing token endpoint needs.

pub use oauth2::{
	HttpRequest, HttpResponse,
	http::{Method, Request, Response, StatusCode, header},
};

// self
use crate::{_prelude::*, error::TransportError};
#[cfg(feature = "reqwest")] use crate::error::ConfigError;

/// Boxed future returned by [`TokenEndpoint::execute`].
pub type ActionFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Protected action guarded by the gate.
///
/// Implementations must be `Send + Sync` so one instance can be shared by every handler task.
/// Any HTTP response (including 4xx/5xx) is returned as `Ok`; `Err` is reserved for failures
/// that produced no response at all.
pub trait TokenEndpoint
where
	Self: Send + Sync,
{
	/// Runs the token exchange for `request`.
	fn execute(&self, request: HttpRequest) -> ActionFuture<'_>;
}

/// Forwards token requests to an upstream token endpoint over reqwest.
///
/// The inbound path and query are discarded; the body, method, and headers (minus `Host`) are
/// sent to `upstream` as-is. Redirects are never followed, since token endpoints must answer
/// directly.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTokenEndpoint {
	upstream: Url,
	client: ReqwestClient,
}
#[cfg(feature = "reqwest")]
impl ReqwestTokenEndpoint {
	/// Creates a forwarder with a client that refuses redirects.
	pub fn new(upstream: Url) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

		Ok(Self { upstream, client })
	}

	/// Wraps an existing reqwest client; configure it to disable redirect following.
	pub fn with_client(upstream: Url, client: ReqwestClient) -> Self {
		Self { upstream, client }
	}

	/// Upstream token endpoint.
	pub fn upstream(&self) -> &Url {
		&self.upstream
	}

	fn outbound(&self, request: HttpRequest) -> Result<reqwest::Request, TransportError> {
		let (parts, body) = request.into_parts();
		let mut headers = parts.headers;

		headers.remove(header::HOST);
		headers.remove(header::CONTENT_LENGTH);

		self.client
			.request(parts.method, self.upstream.clone())
			.headers(headers)
			.body(body)
			.build()
			.map_err(TransportError::from)
	}
}
#[cfg(feature = "reqwest")]
impl TokenEndpoint for ReqwestTokenEndpoint {
	fn execute(&self, request: HttpRequest) -> ActionFuture<'_> {
		Box::pin(async move {
			let outbound = self.outbound(request)?;
			let response = self.client.execute(outbound).await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut response_new = HttpResponse::new(response.bytes().await?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// crates.io
	use httpmock::prelude::*;
	// self
	use super::*;
	use crate::_preludet::*;

	#[tokio::test]
	async fn forwards_body_to_upstream_and_mirrors_response() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST)
					.path("/token")
					.header("content-type", "application/x-www-form-urlencoded");
				then.status(401)
					.header("content-type", "application/json")
					.body("{\"error\":\"invalid_grant\"}");
			})
			.await;
		let endpoint = test_reqwest_endpoint(
			Url::parse(&server.url("/token")).expect("Mock token endpoint should parse."),
		);
		let response = endpoint
			.execute(refresh_request("client-forward", "refresh-forward"))
			.await
			.expect("Forwarding should produce a response.");

		mock.assert_async().await;

		assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
		assert_eq!(response.body(), b"{\"error\":\"invalid_grant\"}");
		assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
	}

	#[tokio::test]
	async fn unreachable_upstream_is_a_transport_error() {
		let endpoint = test_reqwest_endpoint(
			Url::parse("http://127.0.0.1:9/token").expect("Discard-port URL should parse."),
		);
		let err = endpoint
			.execute(refresh_request("client-down", "refresh-down"))
			.await
			.expect_err("Unreachable upstream should fail.");

		assert!(matches!(err, TransportError::Network { .. }));
	}
}
