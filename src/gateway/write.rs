//! Ledgered writes: admission, replay, and at-most-once settlement.

// crates.io
use tokio::time::sleep;
// self
use crate::{
	_prelude::*,
	gateway::Gateway,
	idempotency::{
		Fingerprint, IdempotencyRecord, LedgerKey, RecordState, StoredResponse, WriteAdmission,
	},
	remote::ApiTransport,
	store::LedgerSlot,
	tenant::{Environment, IdempotencyKey, OperationKind, TenantId},
};

/// A write request guarded by the idempotency ledger.
#[derive(Clone, Debug)]
pub struct WriteRequest {
	/// Owning tenant.
	pub tenant: TenantId,
	/// Remote environment the write targets.
	pub environment: Environment,
	/// Logical operation the idempotency key scopes.
	pub operation: OperationKind,
	/// Caller-supplied idempotency key.
	pub key: IdempotencyKey,
	/// Fingerprint of the canonicalized request payload.
	pub fingerprint: Fingerprint,
	/// Remote resource segment (e.g. `invoice`).
	pub resource: String,
	/// JSON payload posted to the resource endpoint.
	pub payload: serde_json::Value,
}
impl WriteRequest {
	/// Returns the ledger key addressed by this request.
	pub fn ledger_key(&self) -> LedgerKey {
		LedgerKey {
			tenant: self.tenant.clone(),
			environment: self.environment,
			operation: self.operation.clone(),
			key: self.key.clone(),
		}
	}
}

/// Result of a settled write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteOutcome {
	/// HTTP status of the settled response.
	pub status: u16,
	/// JSON body of the settled response.
	pub body: serde_json::Value,
	/// `true` when the response was replayed from the ledger instead of
	/// reaching the remote.
	pub replayed: bool,
}

impl<T> Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	/// Admits a write against the ledger: the caller either owns the write
	/// ([`WriteAdmission::Begin`]) and must settle it, or receives the captured
	/// response of an earlier identical write ([`WriteAdmission::Replay`]).
	///
	/// Reusing a key with a different fingerprint is a conflict. A key whose
	/// record is still pending is waited on briefly; if the owner does not
	/// settle in time the write is reported as a concurrent duplicate.
	pub async fn admit_write(
		&self,
		key: &LedgerKey,
		fingerprint: &Fingerprint,
	) -> Result<WriteAdmission> {
		loop {
			let now = OffsetDateTime::now_utc();
			let candidate = IdempotencyRecord::pending(key.clone(), fingerprint.clone(), now);

			match self.ledger.admit(candidate).await? {
				LedgerSlot::Created => return Ok(WriteAdmission::Begin),
				LedgerSlot::Existing(existing) => {
					if existing.fingerprint != *fingerprint {
						return Err(Error::IdempotencyConflict {
							recorded: existing.fingerprint,
							submitted: fingerprint.clone(),
						});
					}

					match existing.state {
						RecordState::Completed => {
							let response = existing.response.ok_or_else(|| {
								crate::store::StoreError::Backend {
									message: format!("completed record without response for {key}"),
								}
							})?;

							return Ok(WriteAdmission::Replay(response));
						},
						RecordState::Failed =>
							if self.ledger.reclaim(key, now).await? {
								return Ok(WriteAdmission::Begin);
							},
						RecordState::Pending =>
							if let Some(admission) =
								self.await_pending(key, fingerprint, &existing).await?
							{
								return Ok(admission);
							},
					}
				},
			}
		}
	}

	/// Executes a write end to end: admit, post, settle, replay.
	pub async fn execute_write(&self, request: WriteRequest) -> Result<WriteOutcome> {
		let key = request.ledger_key();

		match self.admit_write(&key, &request.fingerprint).await? {
			WriteAdmission::Replay(response) =>
				Ok(WriteOutcome { status: response.status, body: response.body, replayed: true }),
			WriteAdmission::Begin => {
				let outcome = self
					.send_write(
						&request.tenant,
						request.environment,
						&request.resource,
						request.payload.clone(),
					)
					.await;

				match outcome {
					Ok((status, body)) => {
						let response = StoredResponse { status, body: body.clone() };

						self.ledger
							.complete(&key, response, OffsetDateTime::now_utc())
							.await?;

						Ok(WriteOutcome { status, body, replayed: false })
					},
					Err(err @ Error::RemoteRejected { .. }) => {
						// Definitive rejection: release the key so a corrected
						// request can retry with the same fingerprint.
						self.ledger.mark_failed(&key, OffsetDateTime::now_utc()).await?;

						Err(err)
					},
					// The remote outcome is unknown (timeout, network, shutdown
					// mid-flight); the record stays pending until it exceeds the
					// staleness window and is reconciled manually.
					Err(err) => Err(err),
				}
			},
		}
	}

	// `Ok(None)` means the pending record vanished and admission must restart.
	async fn await_pending(
		&self,
		key: &LedgerKey,
		fingerprint: &Fingerprint,
		existing: &IdempotencyRecord,
	) -> Result<Option<WriteAdmission>> {
		let policy = &self.config.pending;
		let deadline = OffsetDateTime::now_utc() + policy.max_wait;

		loop {
			let now = OffsetDateTime::now_utc();

			if now >= deadline {
				return Err(Error::ConcurrentDuplicate {
					stale: existing.is_stale_at(now, policy.stale_after),
				});
			}

			sleep(policy.poll_interval.try_into().unwrap_or_default()).await;

			match self.ledger.fetch(key).await? {
				Some(record) if record.fingerprint != *fingerprint =>
					return Err(Error::IdempotencyConflict {
						recorded: record.fingerprint,
						submitted: fingerprint.clone(),
					}),
				Some(record) => match record.state {
					RecordState::Completed => {
						let response = record.response.ok_or_else(|| {
							crate::store::StoreError::Backend {
								message: format!("completed record without response for {key}"),
							}
						})?;

						return Ok(Some(WriteAdmission::Replay(response)));
					},
					RecordState::Failed =>
						if self.ledger.reclaim(key, OffsetDateTime::now_utc()).await? {
							return Ok(Some(WriteAdmission::Begin));
						},
					RecordState::Pending => {},
				},
				// The owner vanished along with its record; re-admit from scratch.
				None => return Ok(None),
			}
		}
	}
}
