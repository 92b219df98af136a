//! Idempotency ledger types: keys, fingerprints, and stored write records.

// crates.io
use rust_decimal::{Decimal, RoundingStrategy};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	tenant::{Environment, IdempotencyKey, OperationKind, TenantId},
};

/// Unique key identifying a ledger record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerKey {
	/// Owning tenant.
	pub tenant: TenantId,
	/// Remote environment the write targets.
	pub environment: Environment,
	/// Logical operation the key scopes (e.g. `create_invoice`).
	pub operation: OperationKind,
	/// Caller-supplied idempotency key.
	pub key: IdempotencyKey,
}
impl Display for LedgerKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}/{}/{}/{}", self.tenant, self.environment, self.operation, self.key)
	}
}

/// Lifecycle state of a ledger record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordState {
	/// The write was admitted and is in flight.
	Pending,
	/// The write succeeded and its response was captured for replay.
	Completed,
	/// The write was definitively rejected by the remote.
	Failed,
}

/// Response captured from a completed write, replayed verbatim on key reuse.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
	/// HTTP status of the original response.
	pub status: u16,
	/// JSON body of the original response.
	pub body: serde_json::Value,
}

/// One entry in the idempotency ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
	/// Ledger key of the record.
	pub key: LedgerKey,
	/// Fingerprint of the request payload recorded at admission.
	pub fingerprint: Fingerprint,
	/// Current lifecycle state.
	pub state: RecordState,
	/// Captured response; present only when [`RecordState::Completed`].
	pub response: Option<StoredResponse>,
	/// Instant the key was first admitted.
	pub created_at: OffsetDateTime,
	/// Instant of the most recent state transition.
	pub updated_at: OffsetDateTime,
}
impl IdempotencyRecord {
	/// Builds a fresh pending record at the provided instant.
	pub fn pending(key: LedgerKey, fingerprint: Fingerprint, instant: OffsetDateTime) -> Self {
		Self {
			key,
			fingerprint,
			state: RecordState::Pending,
			response: None,
			created_at: instant,
			updated_at: instant,
		}
	}

	/// Returns `true` when the record has sat in [`RecordState::Pending`]
	/// longer than the provided window.
	pub fn is_stale_at(&self, instant: OffsetDateTime, window: Duration) -> bool {
		self.state == RecordState::Pending && instant - self.updated_at > window
	}
}

/// Decision made when a write is admitted against the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteAdmission {
	/// No prior record matched; the caller owns the write and must settle it.
	Begin,
	/// A completed record matched; its captured response is returned verbatim.
	Replay(StoredResponse),
}

/// Deterministic request fingerprint: lowercase SHA-256 hex over the
/// canonicalized payload parts.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);
impl Fingerprint {
	/// Returns a builder collecting canonicalized payload parts.
	pub fn builder() -> FingerprintBuilder {
		FingerprintBuilder { parts: Vec::new() }
	}

	/// Returns the hex digest.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Display for Fingerprint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Accumulates payload parts and hashes them into a [`Fingerprint`].
///
/// Parts are joined with `|`, so the same values in a different order produce
/// a different fingerprint. Monetary amounts are quantized to two decimal
/// places with half-up rounding before formatting, keeping `10.5`, `10.50`,
/// and `10.500` identical.
#[derive(Clone, Debug)]
pub struct FingerprintBuilder {
	parts: Vec<String>,
}
impl FingerprintBuilder {
	/// Appends a textual part verbatim.
	pub fn text(mut self, part: impl Display) -> Self {
		self.parts.push(part.to_string());

		self
	}

	/// Appends an optional textual part, using the empty string when absent.
	pub fn opt(mut self, part: Option<&str>) -> Self {
		self.parts.push(part.unwrap_or_default().into());

		self
	}

	/// Appends a monetary amount quantized to two decimal places, half-up.
	pub fn amount(mut self, amount: Decimal) -> Self {
		let quantized = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

		self.parts.push(format!("{quantized:.2}"));

		self
	}

	/// Hashes the accumulated parts into a [`Fingerprint`].
	pub fn finish(self) -> Fingerprint {
		let joined = self.parts.join("|");
		let digest = Sha256::digest(joined.as_bytes());
		let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();

		Fingerprint(hex)
	}
}
