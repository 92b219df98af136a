//! Remote call executor: transport-agnostic request/response primitives plus a
//! bounded retry loop shared by every outbound call.

#[cfg(feature = "reqwest")] pub mod reqwest;
#[cfg(feature = "reqwest")] pub use reqwest::ReqwestTransport;

// crates.io
use rand::Rng;
use tokio::time::{sleep, timeout};
// self
use crate::{
	_prelude::*,
	error::{TransientError, TransportError},
	obs::{self, CallKind, CallOutcome},
	secret::TokenSecret,
};

const AUTHORIZATION: &str = "Authorization";
const BODY_PREVIEW_LEN: usize = 256;

/// HTTP methods used against the remote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiMethod {
	/// HTTP GET.
	Get,
	/// HTTP POST.
	Post,
}
impl ApiMethod {
	/// Returns the wire-format method name.
	pub const fn as_str(self) -> &'static str {
		match self {
			ApiMethod::Get => "GET",
			ApiMethod::Post => "POST",
		}
	}
}

/// Request payload variants supported by the executor.
#[derive(Clone, Debug)]
pub enum ApiBody {
	/// JSON-encoded payload.
	Json(serde_json::Value),
	/// URL-encoded form payload.
	Form(Vec<(String, String)>),
}

/// A single outbound request, transport-agnostic and cheap to clone for retries.
#[derive(Clone)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: ApiMethod,
	/// Fully resolved target URL.
	pub url: Url,
	/// Header name/value pairs applied in order.
	pub headers: Vec<(String, String)>,
	/// Optional payload.
	pub body: Option<ApiBody>,
}
impl ApiRequest {
	/// Builds a GET request for the provided URL.
	pub fn get(url: Url) -> Self {
		Self { method: ApiMethod::Get, url, headers: Vec::new(), body: None }
	}

	/// Builds a POST request carrying a JSON payload.
	pub fn post_json(url: Url, payload: serde_json::Value) -> Self {
		Self { method: ApiMethod::Post, url, headers: Vec::new(), body: Some(ApiBody::Json(payload)) }
	}

	/// Builds a POST request carrying a URL-encoded form payload.
	pub fn post_form(url: Url, pairs: Vec<(String, String)>) -> Self {
		Self { method: ApiMethod::Post, url, headers: Vec::new(), body: Some(ApiBody::Form(pairs)) }
	}

	/// Appends a header pair.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Attaches a bearer-token `Authorization` header.
	pub fn with_bearer(self, token: &TokenSecret) -> Self {
		self.with_header(AUTHORIZATION, format!("Bearer {}", token.expose()))
	}

	/// Attaches an HTTP Basic `Authorization` header built from client credentials.
	pub fn with_basic(self, client_id: &str, client_secret: &TokenSecret) -> Self {
		// crates.io
		use base64::{Engine as _, engine::general_purpose::STANDARD};

		let encoded = STANDARD.encode(format!("{client_id}:{}", client_secret.expose()));

		self.with_header(AUTHORIZATION, format!("Basic {encoded}"))
	}
}
impl Debug for ApiRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let headers = self
			.headers
			.iter()
			.map(|(name, value)| {
				if name.eq_ignore_ascii_case(AUTHORIZATION) {
					(name.as_str(), "<redacted>")
				} else {
					(name.as_str(), value.as_str())
				}
			})
			.collect::<Vec<_>>();

		f.debug_struct("ApiRequest")
			.field("method", &self.method)
			.field("url", &self.url.as_str())
			.field("headers", &headers)
			.field("body", &self.body)
			.finish()
	}
}

/// A response returned by a transport, buffered in full.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Retry-After hint expressed as a relative duration, when supplied.
	pub retry_after: Option<Duration>,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns `true` for statuses the executor retries (429 and 5xx).
	pub fn is_retryable(&self) -> bool {
		self.status == 429 || self.status >= 500
	}

	/// Deserializes the body as JSON, reporting the failing path on error.
	pub fn json<T>(&self) -> Result<T, TransientError>
	where
		T: for<'de> Deserialize<'de>,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer).map_err(|source| {
			TransientError::ResponseParse { source, status: Some(self.status) }
		})
	}

	/// Returns a truncated lossy rendering of the body for error messages.
	pub fn body_preview(&self) -> String {
		let text = String::from_utf8_lossy(&self.body);

		text.chars().take(BODY_PREVIEW_LEN).collect()
	}
}

/// Boxed future returned by [`ApiTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of executing gateway requests.
///
/// The trait is the gateway's only dependency on an HTTP stack. Implementations
/// must be `Send + Sync` so a single transport can be shared across tenants.
pub trait ApiTransport
where
	Self: Send + Sync,
{
	/// Executes a single request without retries or deadlines; the executor
	/// layers both on top.
	fn execute(&self, request: ApiRequest) -> TransportFuture<'_>;
}

/// Bounded exponential backoff applied to retryable failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
	/// Total attempts including the first (minimum 1).
	pub max_attempts: u32,
	/// Delay before the second attempt; doubles per attempt afterwards.
	pub base_delay: Duration,
	/// Upper bound applied to computed delays and Retry-After hints.
	pub max_delay: Duration,
}
impl RetryPolicy {
	/// Computes the delay before the next attempt. A Retry-After hint overrides
	/// the exponential schedule, capped at `max_delay`; otherwise a small random
	/// jitter is added to spread concurrent retries.
	pub fn backoff_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
		if let Some(hint) = retry_after {
			return hint.min(self.max_delay).max(Duration::ZERO);
		}

		let exponent = attempt.saturating_sub(1).min(16);
		let scaled = self.base_delay.saturating_mul(2_i32.saturating_pow(exponent));
		let jitter = Duration::milliseconds(rand::rng().random_range(0..=250));

		scaled.min(self.max_delay).saturating_add(jitter)
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self { max_attempts: 3, base_delay: Duration::seconds(1), max_delay: Duration::seconds(15) }
	}
}

/// Executes a request with a per-attempt deadline, retrying network failures,
/// timeouts, and retryable statuses until the policy is exhausted.
///
/// Non-retryable responses are returned as-is; callers map business-level
/// failures (4xx fault payloads) themselves.
pub async fn execute_with_retry<T>(
	transport: &T,
	policy: &RetryPolicy,
	deadline: Duration,
	kind: CallKind,
	request: ApiRequest,
) -> crate::error::Result<ApiResponse>
where
	T: ?Sized + ApiTransport,
{
	let attempts = policy.max_attempts.max(1);
	let mut attempt = 0;

	loop {
		attempt += 1;

		obs::record_remote_attempt(kind, CallOutcome::Attempt);

		let outcome = timeout(to_std(deadline), transport.execute(request.clone())).await;

		match outcome {
			Ok(Ok(response)) if !response.is_retryable() => {
				obs::record_remote_attempt(kind, CallOutcome::Success);

				return Ok(response);
			},
			Ok(Ok(response)) => {
				obs::record_remote_attempt(kind, CallOutcome::Failure);

				if attempt >= attempts {
					return Err(TransientError::RemoteUnavailable {
						message: format!(
							"status {} after {attempt} attempts: {}",
							response.status,
							response.body_preview(),
						),
						status: Some(response.status),
						retry_after: response.retry_after,
					}
					.into());
				}

				sleep(to_std(policy.backoff_for(attempt, response.retry_after))).await;
			},
			Ok(Err(transport_error)) => {
				obs::record_remote_attempt(kind, CallOutcome::Failure);

				if attempt >= attempts {
					return Err(transport_error.into());
				}

				sleep(to_std(policy.backoff_for(attempt, None))).await;
			},
			Err(_) => {
				obs::record_remote_attempt(kind, CallOutcome::Failure);

				if attempt >= attempts {
					return Err(TransientError::Timeout { timeout: deadline }.into());
				}

				sleep(to_std(policy.backoff_for(attempt, None))).await;
			},
		}
	}
}

fn to_std(duration: Duration) -> std::time::Duration {
	duration.try_into().unwrap_or_default()
}
