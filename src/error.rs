//! Gateway-level error types shared across the token manager, ledger, and resolver.

// self
use crate::_prelude::*;

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Sealed secret could not be opened.
	#[error("Sealed secret could not be opened.")]
	Decryption(#[from] crate::secret::DecryptionError),

	/// The tenant is not registered.
	#[error("Tenant `{tenant}` is not registered.")]
	TenantNotFound {
		/// Tenant identifier that was looked up.
		tenant: crate::tenant::TenantId,
	},
	/// No credential is installed for the requested tenant and environment.
	#[error("No credential is installed for `{key}`.")]
	CredentialNotFound {
		/// Credential key that was looked up.
		key: crate::credential::CredentialKey,
	},
	/// The refresh secret is expired or was rejected by the remote.
	#[error("Credential for `{key}` requires re-authorization: {reason}.")]
	ReauthorizationRequired {
		/// Credential key that was looked up.
		key: crate::credential::CredentialKey,
		/// Remote- or gateway-supplied reason string.
		reason: String,
	},
	/// An idempotency key was replayed with a different request payload.
	#[error("Idempotency key was reused with a different payload.")]
	IdempotencyConflict {
		/// Fingerprint recorded when the key was first seen.
		recorded: crate::idempotency::Fingerprint,
		/// Fingerprint of the conflicting request.
		submitted: crate::idempotency::Fingerprint,
	},
	/// Another request holding the same idempotency key is still in flight.
	#[error("A request with the same idempotency key is already in progress.")]
	ConcurrentDuplicate {
		/// Set when the in-flight record exceeded the staleness window and may
		/// need manual reconciliation.
		stale: bool,
	},
	/// A referenced entity could not be found and auto-creation was not permitted.
	#[error("{kind} `{name}` could not be resolved.")]
	ReferenceNotFound {
		/// Entity kind that was searched.
		kind: crate::resolver::EntityKind,
		/// Name or identifier that was searched for.
		name: String,
	},
	/// The remote rejected a request with a non-retryable business error.
	#[error("Remote rejected the request with status {status}: {detail}.")]
	RemoteRejected {
		/// HTTP status code of the rejection.
		status: u16,
		/// Remote fault code, when one was supplied.
		code: Option<String>,
		/// Remote- or gateway-supplied detail string.
		detail: String,
	},
}

/// Configuration and validation failures raised by the gateway.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Endpoint configuration contains an invalid URL.
	#[error("Endpoint configuration contains an invalid URL.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Cipher key material is malformed.
	#[error(transparent)]
	CipherKey(#[from] crate::secret::CipherKeyError),
	/// Identifier validation failed.
	#[error(transparent)]
	Identifier(#[from] crate::tenant::IdentifierError),
	/// Credential builder validation failed.
	#[error("Unable to build credential record.")]
	CredentialBuild(#[from] crate::credential::CredentialBuilderError),
	/// Token endpoint returned a non-positive or oversized duration.
	#[error("The expires_in value is outside the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint response omitted the rotated refresh secret.
	#[error("Token endpoint response is missing the rotated refresh token.")]
	MissingRefreshToken,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for ConfigError {
	fn from(e: reqwest::Error) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Remote returned a retryable status and retries were exhausted.
	#[error("Remote returned a retryable failure: {message}.")]
	RemoteUnavailable {
		/// Remote- or gateway-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Remote responded with malformed JSON that could not be parsed.
	#[error("Remote returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// The request deadline elapsed before a response arrived.
	#[error("Remote call timed out after {timeout}.")]
	Timeout {
		/// Per-attempt deadline that elapsed.
		timeout: Duration,
	},
}
/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the remote.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the remote.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
