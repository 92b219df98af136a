//! Storage contracts and built-in store implementations for credentials and the
//! idempotency ledger.

pub mod memory;

pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	credential::{Credential, CredentialKey},
	idempotency::{IdempotencyRecord, LedgerKey, StoredResponse},
	secret::SealedSecret,
	tenant::{Tenant, TenantId},
};

/// Persistence contract for gateway storage backends.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract for tenants and their credentials.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Persists or replaces a tenant record.
	fn upsert_tenant(&self, tenant: Tenant) -> StoreFuture<'_, ()>;

	/// Fetches a tenant record, if present.
	fn fetch_tenant<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, Option<Tenant>>;

	/// Removes a tenant record, returning the evicted value.
	fn remove_tenant<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, Option<Tenant>>;

	/// Persists or replaces a credential record.
	fn upsert_credential(&self, credential: Credential) -> StoreFuture<'_, ()>;

	/// Fetches the credential for the provided key, if present.
	fn fetch_credential<'a>(
		&'a self,
		key: &'a CredentialKey,
	) -> StoreFuture<'a, Option<Credential>>;

	/// Removes the credential for the provided key, returning the evicted value.
	fn remove_credential<'a>(
		&'a self,
		key: &'a CredentialKey,
	) -> StoreFuture<'a, Option<Credential>>;

	/// Removes every credential belonging to the provided tenant, returning the
	/// number of evicted records.
	fn remove_credentials_for<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, usize>;

	/// Atomically rotates a credential if its sealed refresh secret still
	/// matches the expected value.
	fn compare_and_swap_refresh<'a>(
		&'a self,
		key: &'a CredentialKey,
		expected_refresh: &'a SealedSecret,
		replacement: Credential,
	) -> StoreFuture<'a, CompareAndSwapOutcome>;

	/// Marks a credential unusable at the provided instant, returning the
	/// updated record.
	fn mark_unusable<'a>(
		&'a self,
		key: &'a CredentialKey,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, Option<Credential>>;
}

/// Storage backend contract for the idempotency ledger.
pub trait IdempotencyLedger
where
	Self: Send + Sync,
{
	/// Inserts the record if no record exists under its key, atomically.
	fn admit(&self, record: IdempotencyRecord) -> StoreFuture<'_, LedgerSlot>;

	/// Fetches the record under the provided key, if present.
	fn fetch<'a>(&'a self, key: &'a LedgerKey) -> StoreFuture<'a, Option<IdempotencyRecord>>;

	/// Transitions a pending record to completed, capturing the response for
	/// replay. Settled records are immutable; settling one is an error.
	fn complete<'a>(
		&'a self,
		key: &'a LedgerKey,
		response: StoredResponse,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, ()>;

	/// Transitions a pending record to failed. Settled records are immutable;
	/// settling one is an error.
	fn mark_failed<'a>(&'a self, key: &'a LedgerKey, instant: OffsetDateTime)
	-> StoreFuture<'a, ()>;

	/// Transitions a failed record back to pending so a retry can own the
	/// write. Returns `false` when the record is absent or not failed.
	fn reclaim<'a>(&'a self, key: &'a LedgerKey, instant: OffsetDateTime)
	-> StoreFuture<'a, bool>;

	/// Removes every ledger record belonging to the provided tenant, returning
	/// the number of evicted records.
	fn purge_for<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, usize>;
}

/// Result of a ledger admission attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerSlot {
	/// The key was unseen; the provided record was inserted.
	Created,
	/// A record already existed under the key; it is returned unchanged.
	Existing(IdempotencyRecord),
}

/// Result of a refresh-secret compare-and-swap attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The refresh secret matched the expected value and the record was updated.
	Updated,
	/// The record exists but the expected refresh secret did not match.
	RefreshMismatch,
	/// No record matched the provided key.
	Missing,
}

/// Error type produced by store implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures (e.g., serde) surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
