#![cfg(feature = "reqwest")]

// std
use std::sync::atomic::{AtomicUsize, Ordering};
// crates.io
use httpmock::prelude::*;
// self
use books_gateway::{
	_preludet::*,
	credential::Credential,
	error::{TransientError, TransportError},
	obs::CallKind,
	remote::{self, ApiRequest, ApiResponse, ApiTransport, RetryPolicy, TransportFuture},
	store::CredentialStore,
	tenant::{Environment, RealmId, Tenant, TenantId},
};

/// Transport that pops one canned outcome per attempt.
struct ScriptedTransport {
	cursor: AtomicUsize,
	script: Vec<Result<ApiResponse, ()>>,
}
impl ScriptedTransport {
	fn new(script: Vec<Result<ApiResponse, ()>>) -> Self {
		Self { cursor: AtomicUsize::new(0), script }
	}

	fn calls(&self) -> usize {
		self.cursor.load(Ordering::SeqCst)
	}
}
impl ApiTransport for ScriptedTransport {
	fn execute(&self, _: ApiRequest) -> TransportFuture<'_> {
		let index = self.cursor.fetch_add(1, Ordering::SeqCst);
		let outcome = self
			.script
			.get(index)
			.cloned()
			.expect("Scripted transport ran out of canned responses.");

		Box::pin(async move {
			outcome.map_err(|()| {
				TransportError::Io(std::io::Error::other("scripted network failure"))
			})
		})
	}
}

fn ok(status: u16) -> Result<ApiResponse, ()> {
	Ok(ApiResponse { status, retry_after: None, body: b"{}".to_vec() })
}

fn fast_policy() -> RetryPolicy {
	RetryPolicy {
		max_attempts: 3,
		base_delay: Duration::milliseconds(1),
		max_delay: Duration::milliseconds(5),
	}
}

fn request() -> ApiRequest {
	ApiRequest::get(Url::parse("https://example.test/v3").expect("URL fixture should parse."))
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
	let transport = ScriptedTransport::new(vec![Err(()), ok(503), ok(200)]);
	let response = remote::execute_with_retry(
		&transport,
		&fast_policy(),
		Duration::seconds(1),
		CallKind::Query,
		request(),
	)
	.await
	.expect("Third attempt should succeed.");

	assert_eq!(response.status, 200);
	assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn exhausted_retries_surface_the_retryable_status() {
	let transport = ScriptedTransport::new(vec![ok(429), ok(429), ok(429)]);
	let err = remote::execute_with_retry(
		&transport,
		&fast_policy(),
		Duration::seconds(1),
		CallKind::Query,
		request(),
	)
	.await
	.expect_err("Throttling on every attempt should exhaust the policy.");

	assert_eq!(transport.calls(), 3);
	assert!(matches!(
		err,
		Error::Transient(TransientError::RemoteUnavailable { status: Some(429), .. }),
	));
}

#[tokio::test]
async fn business_rejections_are_not_retried() {
	let transport = ScriptedTransport::new(vec![ok(400)]);
	let response = remote::execute_with_retry(
		&transport,
		&fast_policy(),
		Duration::seconds(1),
		CallKind::Write,
		request(),
	)
	.await
	.expect("Non-retryable statuses should be returned to the caller.");

	assert_eq!(response.status, 400);
	assert_eq!(transport.calls(), 1);
}

async fn seed_credential_with_access(
	gateway: &books_gateway::gateway::ReqwestGateway,
	store: &books_gateway::store::MemoryStore,
	access: &str,
) -> TenantId {
	let tenant_id = TenantId::new("tenant-401").expect("Tenant identifier should be valid.");
	let realm = RealmId::new("4620816365").expect("Realm identifier should be valid.");
	let now = OffsetDateTime::now_utc();

	gateway
		.register_tenant(Tenant::new(tenant_id.clone(), "Tenant 401"))
		.await
		.expect("Tenant registration should succeed.");

	let credential = Credential::builder(tenant_id.clone(), Environment::Sandbox, realm)
		.refresh_secret(test_cipher().seal(&books_gateway::secret::TokenSecret::new("refresh-0")))
		.access_token(access)
		.access_expires_at(now + Duration::hours(1))
		.refresh_expires_at(now + Duration::days(100))
		.build()
		.expect("Credential fixture should build successfully.");

	store.upsert_credential(credential).await.expect("Credential seed should succeed.");

	tenant_id
}

#[tokio::test]
async fn stale_server_side_tokens_trigger_one_rotation() {
	let server = MockServer::start_async().await;
	let (gateway, store) = build_test_gateway(&server.base_url());
	let tenant = seed_credential_with_access(&gateway, &store, "access-stale").await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"access-fresh\",\"refresh_token\":\"refresh-1\",\
				 \"token_type\":\"bearer\",\"expires_in\":3600,\
				 \"x_refresh_token_expires_in\":8726400}",
			);
		})
		.await;
	let rejected = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/v3/company/4620816365/query")
				.header("authorization", "Bearer access-stale");
			then.status(401).header("content-type", "application/json").body("{}");
		})
		.await;
	let accepted = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/v3/company/4620816365/query")
				.header("authorization", "Bearer access-fresh");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"QueryResponse\":{\"Customer\":[{\"Id\":\"1\",\"DisplayName\":\"ACME\"}]}}");
		})
		.await;
	let response = gateway
		.query(&tenant, Environment::Sandbox, "SELECT * FROM Customer")
		.await
		.expect("Query should succeed after one forced rotation.");

	rejected.assert_async().await;
	token_mock.assert_async().await;
	accepted.assert_async().await;

	assert_eq!(
		response.pointer("/Customer/0/DisplayName").and_then(|name| name.as_str()),
		Some("ACME"),
	);
}
