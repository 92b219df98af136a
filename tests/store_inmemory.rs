// crates.io
use serde_json::json;
use time::{Duration, OffsetDateTime};
// self
use books_gateway::{
	credential::Credential,
	idempotency::{Fingerprint, IdempotencyRecord, LedgerKey, RecordState, StoredResponse},
	secret::SealedSecret,
	store::{
		CompareAndSwapOutcome, CredentialStore, IdempotencyLedger, LedgerSlot, MemoryStore,
	},
	tenant::{Environment, IdempotencyKey, OperationKind, RealmId, Tenant, TenantId},
};

fn tenant_id(value: &str) -> TenantId {
	TenantId::new(value).expect("Tenant fixture should be valid.")
}

fn credential(tenant: &TenantId, environment: Environment, secret: &str) -> Credential {
	Credential::builder(
		tenant.clone(),
		environment,
		RealmId::new("4620816365").expect("Realm fixture should be valid."),
	)
	.refresh_secret(SealedSecret::from_encoded(secret))
	.refresh_expires_at(OffsetDateTime::now_utc() + Duration::days(100))
	.build()
	.expect("Credential fixture should build.")
}

fn ledger_key(tenant: &TenantId, key: &str) -> LedgerKey {
	LedgerKey {
		tenant: tenant.clone(),
		environment: Environment::Sandbox,
		operation: OperationKind::new("create_invoice")
			.expect("Operation fixture should be valid."),
		key: IdempotencyKey::new(key).expect("Idempotency key fixture should be valid."),
	}
}

fn pending(key: LedgerKey) -> IdempotencyRecord {
	IdempotencyRecord::pending(
		key,
		Fingerprint::builder().text("payload").finish(),
		OffsetDateTime::now_utc(),
	)
}

#[tokio::test]
async fn rotation_swaps_only_when_the_refresh_secret_matches() {
	let store = MemoryStore::default();
	let tenant = tenant_id("tenant-cas");
	let current = credential(&tenant, Environment::Sandbox, "sealed-v1");
	let key = current.key();
	let rotated = credential(&tenant, Environment::Sandbox, "sealed-v2");

	store
		.upsert_credential(current.clone())
		.await
		.expect("Upsert should succeed.");

	// Wrong expectation leaves the record untouched.
	let outcome = store
		.compare_and_swap_refresh(&key, &SealedSecret::from_encoded("sealed-v0"), rotated.clone())
		.await
		.expect("Compare-and-swap should succeed.");

	assert_eq!(outcome, CompareAndSwapOutcome::RefreshMismatch);
	assert_eq!(
		store
			.fetch_credential(&key)
			.await
			.expect("Fetch should succeed.")
			.expect("Credential should remain.")
			.refresh_secret,
		current.refresh_secret,
	);

	// Matching expectation installs the replacement.
	let outcome = store
		.compare_and_swap_refresh(&key, &current.refresh_secret, rotated.clone())
		.await
		.expect("Compare-and-swap should succeed.");

	assert_eq!(outcome, CompareAndSwapOutcome::Updated);
	assert_eq!(
		store
			.fetch_credential(&key)
			.await
			.expect("Fetch should succeed.")
			.expect("Credential should remain.")
			.refresh_secret,
		rotated.refresh_secret,
	);

	store.remove_credential(&key).await.expect("Removal should succeed.");

	let outcome = store
		.compare_and_swap_refresh(&key, &rotated.refresh_secret, rotated.clone())
		.await
		.expect("Compare-and-swap should succeed.");

	assert_eq!(outcome, CompareAndSwapOutcome::Missing);
}

#[tokio::test]
async fn marking_unusable_stamps_the_credential() {
	let store = MemoryStore::default();
	let tenant = tenant_id("tenant-disable");
	let credential = credential(&tenant, Environment::Sandbox, "sealed-v1");
	let key = credential.key();
	let instant = OffsetDateTime::now_utc();

	store.upsert_credential(credential).await.expect("Upsert should succeed.");

	let disabled = store
		.mark_unusable(&key, instant)
		.await
		.expect("Marking should succeed.")
		.expect("The credential should exist.");

	assert_eq!(disabled.disabled_at, Some(instant));
	assert!(disabled.needs_reauthorization_at(instant));
}

#[tokio::test]
async fn tenant_removal_cascades_across_both_stores() {
	let store = MemoryStore::default();
	let doomed = tenant_id("tenant-doomed");
	let survivor = tenant_id("tenant-survivor");

	store
		.upsert_tenant(Tenant::new(doomed.clone(), "Doomed"))
		.await
		.expect("Upsert should succeed.");

	for environment in [Environment::Sandbox, Environment::Production] {
		store
			.upsert_credential(credential(&doomed, environment, "sealed"))
			.await
			.expect("Upsert should succeed.");
	}

	store
		.upsert_credential(credential(&survivor, Environment::Sandbox, "sealed"))
		.await
		.expect("Upsert should succeed.");
	store.admit(pending(ledger_key(&doomed, "key-1"))).await.expect("Admit should succeed.");
	store.admit(pending(ledger_key(&doomed, "key-2"))).await.expect("Admit should succeed.");
	store.admit(pending(ledger_key(&survivor, "key-3"))).await.expect("Admit should succeed.");

	assert!(store.remove_tenant(&doomed).await.expect("Removal should succeed.").is_some());
	assert_eq!(
		store.remove_credentials_for(&doomed).await.expect("Removal should succeed."),
		2,
	);
	assert_eq!(store.purge_for(&doomed).await.expect("Purge should succeed."), 2);

	// The survivor's records are untouched.
	let survivor_key = credential(&survivor, Environment::Sandbox, "sealed").key();

	assert!(
		store
			.fetch_credential(&survivor_key)
			.await
			.expect("Fetch should succeed.")
			.is_some()
	);
	assert!(
		store
			.fetch(&ledger_key(&survivor, "key-3"))
			.await
			.expect("Fetch should succeed.")
			.is_some()
	);
}

#[tokio::test]
async fn ledger_admission_is_first_writer_wins() {
	let store = MemoryStore::default();
	let tenant = tenant_id("tenant-ledger");
	let key = ledger_key(&tenant, "key-1");
	let record = pending(key.clone());

	assert_eq!(
		store.admit(record.clone()).await.expect("Admit should succeed."),
		LedgerSlot::Created,
	);

	match store.admit(pending(key)).await.expect("Admit should succeed.") {
		LedgerSlot::Existing(existing) => assert_eq!(existing.fingerprint, record.fingerprint),
		LedgerSlot::Created => panic!("The second admission must observe the first record."),
	}
}

#[tokio::test]
async fn records_settle_and_failed_slots_can_be_reclaimed() {
	let store = MemoryStore::default();
	let tenant = tenant_id("tenant-settle");
	let key = ledger_key(&tenant, "key-1");
	let response = StoredResponse { status: 200, body: json!({ "Invoice": { "Id": "88" } }) };

	store.admit(pending(key.clone())).await.expect("Admit should succeed.");
	store
		.complete(&key, response.clone(), OffsetDateTime::now_utc())
		.await
		.expect("Completion should succeed.");

	let record = store
		.fetch(&key)
		.await
		.expect("Fetch should succeed.")
		.expect("The record should exist.");

	assert_eq!(record.state, RecordState::Completed);
	assert_eq!(record.response, Some(response));

	// A completed record cannot be reclaimed.
	assert!(!store.reclaim(&key, OffsetDateTime::now_utc()).await.expect("Reclaim should run."));

	let failed = ledger_key(&tenant, "key-2");

	store.admit(pending(failed.clone())).await.expect("Admit should succeed.");
	store
		.mark_failed(&failed, OffsetDateTime::now_utc())
		.await
		.expect("Failure marking should succeed.");

	assert!(store.reclaim(&failed, OffsetDateTime::now_utc()).await.expect("Reclaim should run."));

	let record = store
		.fetch(&failed)
		.await
		.expect("Fetch should succeed.")
		.expect("The record should exist.");

	assert_eq!(record.state, RecordState::Pending);
	assert_eq!(record.response, None);
}

#[tokio::test]
async fn settled_records_are_immutable() {
	let store = MemoryStore::default();
	let tenant = tenant_id("tenant-immutable");
	let key = ledger_key(&tenant, "key-1");
	let captured = StoredResponse { status: 200, body: json!({ "Invoice": { "Id": "1" } }) };

	store.admit(pending(key.clone())).await.expect("Admit should succeed.");
	store
		.complete(&key, captured.clone(), OffsetDateTime::now_utc())
		.await
		.expect("Completion should succeed.");

	let rewrite = StoredResponse { status: 200, body: json!({ "Invoice": { "Id": "2" } }) };
	let err = store
		.complete(&key, rewrite, OffsetDateTime::now_utc())
		.await
		.expect_err("Re-completing a settled record should fail.");

	assert!(err.to_string().contains("already settled"));

	let err = store
		.mark_failed(&key, OffsetDateTime::now_utc())
		.await
		.expect_err("Failing a settled record should fail.");

	assert!(err.to_string().contains("already settled"));

	let record = store
		.fetch(&key)
		.await
		.expect("Fetch should succeed.")
		.expect("The record should exist.");

	assert_eq!(record.state, RecordState::Completed);
	assert_eq!(record.response, Some(captured));
}

#[tokio::test]
async fn settling_an_unknown_key_is_a_backend_error() {
	let store = MemoryStore::default();
	let tenant = tenant_id("tenant-missing");
	let key = ledger_key(&tenant, "key-unknown");
	let response = StoredResponse { status: 200, body: json!({}) };

	let err = store
		.complete(&key, response, OffsetDateTime::now_utc())
		.await
		.expect_err("Completing an unknown key should fail.");

	assert!(err.to_string().contains("no ledger record"));
}
