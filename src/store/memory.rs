//! Thread-safe in-memory store implementing both storage contracts for local
//! development and tests.

// self
use crate::{
	_prelude::*,
	credential::{Credential, CredentialKey},
	idempotency::{IdempotencyRecord, LedgerKey, RecordState, StoredResponse},
	secret::SealedSecret,
	store::{
		CompareAndSwapOutcome, CredentialStore, IdempotencyLedger, LedgerSlot, StoreError,
		StoreFuture,
	},
	tenant::{Tenant, TenantId},
};

type TenantMap = Arc<RwLock<HashMap<TenantId, Tenant>>>;
type CredentialMap = Arc<RwLock<HashMap<CredentialKey, Credential>>>;
type LedgerMap = Arc<RwLock<HashMap<LedgerKey, IdempotencyRecord>>>;

/// Thread-safe storage backend that keeps records in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
	tenants: TenantMap,
	credentials: CredentialMap,
	ledger: LedgerMap,
}
impl MemoryStore {
	fn cas_now(
		map: CredentialMap,
		key: CredentialKey,
		expected_refresh: SealedSecret,
		replacement: Credential,
	) -> CompareAndSwapOutcome {
		let mut guard = map.write();
		let outcome = match guard.get(&key) {
			Some(existing) if existing.refresh_secret == expected_refresh =>
				CompareAndSwapOutcome::Updated,
			Some(_) => CompareAndSwapOutcome::RefreshMismatch,
			None => CompareAndSwapOutcome::Missing,
		};

		if matches!(outcome, CompareAndSwapOutcome::Updated) {
			guard.insert(key, replacement);
		}

		outcome
	}

	fn mark_unusable_now(
		map: CredentialMap,
		key: CredentialKey,
		instant: OffsetDateTime,
	) -> Option<Credential> {
		let mut guard = map.write();

		match guard.get_mut(&key) {
			Some(credential) => {
				credential.disable(instant);

				Some(credential.clone())
			},
			None => None,
		}
	}

	fn admit_now(map: LedgerMap, record: IdempotencyRecord) -> LedgerSlot {
		let mut guard = map.write();

		match guard.get(&record.key) {
			Some(existing) => LedgerSlot::Existing(existing.clone()),
			None => {
				guard.insert(record.key.clone(), record);

				LedgerSlot::Created
			},
		}
	}

	fn settle_now(
		map: LedgerMap,
		key: LedgerKey,
		state: RecordState,
		response: Option<StoredResponse>,
		instant: OffsetDateTime,
	) -> Result<(), StoreError> {
		let mut guard = map.write();
		let record = guard
			.get_mut(&key)
			.ok_or_else(|| StoreError::Backend { message: format!("no ledger record for {key}") })?;

		// Records only settle out of Pending; a settled record is immutable.
		if record.state != RecordState::Pending {
			return Err(StoreError::Backend {
				message: format!("ledger record for {key} is already settled"),
			});
		}

		record.state = state;
		record.response = response;
		record.updated_at = instant;

		Ok(())
	}

	fn reclaim_now(map: LedgerMap, key: LedgerKey, instant: OffsetDateTime) -> bool {
		let mut guard = map.write();

		match guard.get_mut(&key) {
			Some(record) if record.state == RecordState::Failed => {
				record.state = RecordState::Pending;
				record.response = None;
				record.updated_at = instant;

				true
			},
			_ => false,
		}
	}
}
impl CredentialStore for MemoryStore {
	fn upsert_tenant(&self, tenant: Tenant) -> StoreFuture<'_, ()> {
		let map = self.tenants.clone();

		Box::pin(async move {
			map.write().insert(tenant.id.clone(), tenant);

			Ok(())
		})
	}

	fn fetch_tenant<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, Option<Tenant>> {
		let map = self.tenants.clone();
		let tenant = tenant.to_owned();

		Box::pin(async move { Ok(map.read().get(&tenant).cloned()) })
	}

	fn remove_tenant<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, Option<Tenant>> {
		let map = self.tenants.clone();
		let tenant = tenant.to_owned();

		Box::pin(async move { Ok(map.write().remove(&tenant)) })
	}

	fn upsert_credential(&self, credential: Credential) -> StoreFuture<'_, ()> {
		let map = self.credentials.clone();

		Box::pin(async move {
			map.write().insert(credential.key(), credential);

			Ok(())
		})
	}

	fn fetch_credential<'a>(
		&'a self,
		key: &'a CredentialKey,
	) -> StoreFuture<'a, Option<Credential>> {
		let map = self.credentials.clone();
		let key = key.to_owned();

		Box::pin(async move { Ok(map.read().get(&key).cloned()) })
	}

	fn remove_credential<'a>(
		&'a self,
		key: &'a CredentialKey,
	) -> StoreFuture<'a, Option<Credential>> {
		let map = self.credentials.clone();
		let key = key.to_owned();

		Box::pin(async move { Ok(map.write().remove(&key)) })
	}

	fn remove_credentials_for<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, usize> {
		let map = self.credentials.clone();
		let tenant = tenant.to_owned();

		Box::pin(async move {
			let mut guard = map.write();
			let before = guard.len();

			guard.retain(|key, _| key.tenant != tenant);

			Ok(before - guard.len())
		})
	}

	fn compare_and_swap_refresh<'a>(
		&'a self,
		key: &'a CredentialKey,
		expected_refresh: &'a SealedSecret,
		replacement: Credential,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		let map = self.credentials.clone();
		let key = key.to_owned();
		let expected_refresh = expected_refresh.to_owned();

		Box::pin(async move { Ok(Self::cas_now(map, key, expected_refresh, replacement)) })
	}

	fn mark_unusable<'a>(
		&'a self,
		key: &'a CredentialKey,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, Option<Credential>> {
		let map = self.credentials.clone();
		let key = key.to_owned();

		Box::pin(async move { Ok(Self::mark_unusable_now(map, key, instant)) })
	}
}
impl IdempotencyLedger for MemoryStore {
	fn admit(&self, record: IdempotencyRecord) -> StoreFuture<'_, LedgerSlot> {
		let map = self.ledger.clone();

		Box::pin(async move { Ok(Self::admit_now(map, record)) })
	}

	fn fetch<'a>(&'a self, key: &'a LedgerKey) -> StoreFuture<'a, Option<IdempotencyRecord>> {
		let map = self.ledger.clone();
		let key = key.to_owned();

		Box::pin(async move { Ok(map.read().get(&key).cloned()) })
	}

	fn complete<'a>(
		&'a self,
		key: &'a LedgerKey,
		response: StoredResponse,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, ()> {
		let map = self.ledger.clone();
		let key = key.to_owned();

		Box::pin(async move {
			Self::settle_now(map, key, RecordState::Completed, Some(response), instant)
		})
	}

	fn mark_failed<'a>(
		&'a self,
		key: &'a LedgerKey,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, ()> {
		let map = self.ledger.clone();
		let key = key.to_owned();

		Box::pin(async move { Self::settle_now(map, key, RecordState::Failed, None, instant) })
	}

	fn reclaim<'a>(
		&'a self,
		key: &'a LedgerKey,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, bool> {
		let map = self.ledger.clone();
		let key = key.to_owned();

		Box::pin(async move { Ok(Self::reclaim_now(map, key, instant)) })
	}

	fn purge_for<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, usize> {
		let map = self.ledger.clone();
		let tenant = tenant.to_owned();

		Box::pin(async move {
			let mut guard = map.write();
			let before = guard.len();

			guard.retain(|key, _| key.tenant != tenant);

			Ok(before - guard.len())
		})
	}
}
