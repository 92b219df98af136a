#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use books_gateway::{
	_preludet::*,
	gateway::WriteRequest,
	idempotency::{Fingerprint, IdempotencyRecord, LedgerKey, RecordState},
	store::IdempotencyLedger,
	tenant::{Environment, IdempotencyKey, OperationKind, TenantId},
};

fn write_request(tenant: TenantId, key: &str, fingerprint: Fingerprint) -> WriteRequest {
	WriteRequest {
		tenant,
		environment: Environment::Sandbox,
		operation: OperationKind::new("create_invoice")
			.expect("Operation fixture should be valid."),
		key: IdempotencyKey::new(key).expect("Idempotency key fixture should be valid."),
		fingerprint,
		resource: "invoice".into(),
		payload: json!({ "CustomerRef": { "value": "1" }, "TotalAmt": 10.50 }),
	}
}

fn invoice_fingerprint(total: &str) -> Fingerprint {
	Fingerprint::builder().text("customer-1").text(total).finish()
}

async fn mock_token(server: &MockServer) {
	server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"access-w\",\"refresh_token\":\"refresh-1\",\
				 \"token_type\":\"bearer\",\"expires_in\":3600,\
				 \"x_refresh_token_expires_in\":8726400}",
			);
		})
		.await;
}

#[tokio::test]
async fn identical_retries_replay_the_captured_response() {
	let server = MockServer::start_async().await;
	let (gateway, _) = build_test_gateway(&server.base_url());
	let tenant = install_test_credential(&gateway).await;

	mock_token(&server).await;

	let create_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v3/company/4620816365/invoice");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"Invoice\":{\"Id\":\"88\",\"TotalAmt\":10.50}}");
		})
		.await;
	let request = write_request(tenant, "key-replay", invoice_fingerprint("10.50"));
	let first = gateway
		.execute_write(request.clone())
		.await
		.expect("First write should reach the remote.");
	let second = gateway
		.execute_write(request)
		.await
		.expect("Second write should replay from the ledger.");

	assert!(!first.replayed);
	assert!(second.replayed);
	assert_eq!(first.status, second.status);
	assert_eq!(first.body, second.body);

	create_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn concurrent_identical_writes_share_one_remote_call() {
	let server = MockServer::start_async().await;
	let (gateway, _) = build_test_gateway(&server.base_url());
	let tenant = install_test_credential(&gateway).await;

	mock_token(&server).await;

	let create_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v3/company/4620816365/invoice");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"Invoice\":{\"Id\":\"90\",\"TotalAmt\":10.50}}");
		})
		.await;
	let request = write_request(tenant, "key-race", invoice_fingerprint("10.50"));
	let (first, second) =
		tokio::join!(gateway.execute_write(request.clone()), gateway.execute_write(request));
	let first = first.expect("First concurrent write should succeed.");
	let second = second.expect("Second concurrent write should succeed.");

	// One caller reaches the remote; the other waits out the pending record
	// and replays the winner's captured response.
	assert_eq!(first.status, second.status);
	assert_eq!(first.body, second.body);
	assert!(first.replayed != second.replayed);

	create_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn key_reuse_with_a_different_payload_is_a_conflict() {
	let server = MockServer::start_async().await;
	let (gateway, _) = build_test_gateway(&server.base_url());
	let tenant = install_test_credential(&gateway).await;

	mock_token(&server).await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/v3/company/4620816365/invoice");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"Invoice\":{\"Id\":\"89\"}}");
		})
		.await;

	gateway
		.execute_write(write_request(tenant.clone(), "key-conflict", invoice_fingerprint("10.50")))
		.await
		.expect("Original write should succeed.");

	let err = gateway
		.execute_write(write_request(tenant, "key-conflict", invoice_fingerprint("99.99")))
		.await
		.expect_err("Reusing the key with a different payload should conflict.");

	assert!(matches!(err, Error::IdempotencyConflict { .. }));
}

#[tokio::test]
async fn rejected_writes_release_the_key_for_retries() {
	let server = MockServer::start_async().await;
	let (gateway, store) = build_test_gateway(&server.base_url());
	let tenant = install_test_credential(&gateway).await;

	mock_token(&server).await;

	let rejection = server
		.mock_async(|when, then| {
			when.method(POST).path("/v3/company/4620816365/invoice");
			then.status(400).header("content-type", "application/json").body(
				"{\"Fault\":{\"Error\":[{\"Message\":\"Invalid Reference\",\
				 \"Detail\":\"bad customer\",\"code\":\"2500\"}]}}",
			);
		})
		.await;
	let request = write_request(tenant, "key-failed", invoice_fingerprint("10.50"));
	let err = gateway
		.execute_write(request.clone())
		.await
		.expect_err("Fault responses should be reported as rejections.");

	assert!(matches!(err, Error::RemoteRejected { status: 400, .. }));

	let record = store
		.fetch(&request.ledger_key())
		.await
		.expect("Ledger fetch should succeed.")
		.expect("Failed record should remain in the ledger.");

	assert_eq!(record.state, RecordState::Failed);

	// The same fingerprint may retry; it reclaims the failed slot and hits the
	// remote again.
	let err = gateway
		.execute_write(request)
		.await
		.expect_err("The retry hits the same rejection.");

	assert!(matches!(err, Error::RemoteRejected { status: 400, .. }));

	rejection.assert_calls_async(2).await;
}

#[tokio::test]
async fn in_flight_duplicates_are_reported() {
	let server = MockServer::start_async().await;
	let (gateway, store) = build_test_gateway(&server.base_url());
	let tenant = install_test_credential(&gateway).await;
	let request = write_request(tenant, "key-pending", invoice_fingerprint("10.50"));
	let key = request.ledger_key();

	// Seed a pending record as if another worker owned the write.
	store
		.admit(IdempotencyRecord::pending(
			key.clone(),
			request.fingerprint.clone(),
			OffsetDateTime::now_utc(),
		))
		.await
		.expect("Seeding the pending record should succeed.");

	let err = gateway
		.execute_write(request)
		.await
		.expect_err("A second writer should observe the in-flight duplicate.");

	assert!(matches!(err, Error::ConcurrentDuplicate { stale: false }));
}

#[tokio::test]
async fn abandoned_pending_records_are_flagged_stale() {
	let server = MockServer::start_async().await;
	let (gateway, store) = build_test_gateway(&server.base_url());
	let tenant = install_test_credential(&gateway).await;
	let request = write_request(tenant, "key-stale", invoice_fingerprint("10.50"));
	let key: LedgerKey = request.ledger_key();
	let abandoned_at = OffsetDateTime::now_utc() - Duration::hours(1);

	store
		.admit(IdempotencyRecord::pending(key, request.fingerprint.clone(), abandoned_at))
		.await
		.expect("Seeding the abandoned record should succeed.");

	let err = gateway
		.execute_write(request)
		.await
		.expect_err("An abandoned in-flight record should be reported.");

	assert!(matches!(err, Error::ConcurrentDuplicate { stale: true }));
}
