//! High-level gateway orchestrators: token lifecycle, authorized calls,
//! ledgered writes, and reference resolution.

pub mod call;
pub mod common;
pub mod refresh;
pub mod write;

pub use common::*;
pub use refresh::*;
pub use write::*;

// self
use crate::{
	_prelude::*,
	config::GatewayConfig,
	credential::{Credential, CredentialKey},
	remote::ApiTransport,
	secret::{SecretCipher, TokenSecret},
	store::{CredentialStore, IdempotencyLedger},
	tenant::{Environment, RealmId, Tenant, TenantId},
};
#[cfg(feature = "reqwest")] use crate::remote::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Gateway specialized for the crate's default reqwest transport.
pub type ReqwestGateway = Gateway<ReqwestTransport>;

/// Coordinates all remote interaction for registered tenants.
///
/// The gateway owns the transport, both storage backends, and the secret
/// cipher so the individual operations can focus on their own semantics
/// (refresh rotation, ledger admission, reference lookup cascades). Client
/// credentials live here so every token exchange authenticates consistently.
#[derive(Clone)]
pub struct Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	/// Transport used for every outbound remote request.
	pub transport: Arc<T>,
	/// Store that persists tenants and their credentials.
	pub credentials: Arc<dyn CredentialStore>,
	/// Store that persists the idempotency ledger.
	pub ledger: Arc<dyn IdempotencyLedger>,
	/// Cipher sealing long-lived refresh secrets at rest.
	pub cipher: SecretCipher,
	/// Gateway configuration.
	pub config: GatewayConfig,
	/// OAuth 2.0 client identifier used in every token exchange.
	pub client_id: String,
	/// Confidential client secret paired with the identifier.
	pub client_secret: TokenSecret,
	/// Shared metrics recorder for refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	pub(crate) refresh_guards: Arc<Mutex<HashMap<CredentialKey, Arc<AsyncMutex<()>>>>>,
}
impl<T> Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates a gateway that reuses the caller-provided transport.
	pub fn with_transport(
		credentials: Arc<dyn CredentialStore>,
		ledger: Arc<dyn IdempotencyLedger>,
		cipher: SecretCipher,
		config: GatewayConfig,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		transport: impl Into<Arc<T>>,
	) -> Self {
		Self {
			transport: transport.into(),
			credentials,
			ledger,
			cipher,
			config,
			client_id: client_id.into(),
			client_secret: TokenSecret::new(client_secret),
			refresh_metrics: Default::default(),
			refresh_guards: Default::default(),
		}
	}

	/// Registers (or replaces) a tenant record.
	pub async fn register_tenant(&self, tenant: Tenant) -> Result<()> {
		Ok(self.credentials.upsert_tenant(tenant).await?)
	}

	/// Fetches a registered tenant, failing when it is unknown.
	pub async fn tenant(&self, tenant: &TenantId) -> Result<Tenant> {
		self.credentials
			.fetch_tenant(tenant)
			.await?
			.ok_or_else(|| Error::TenantNotFound { tenant: tenant.clone() })
	}

	/// Removes a tenant along with every credential and ledger record it owns.
	///
	/// Returns the number of evicted credential and ledger records.
	pub async fn remove_tenant(&self, tenant: &TenantId) -> Result<(usize, usize)> {
		self.credentials.remove_tenant(tenant).await?;

		let credentials = self.credentials.remove_credentials_for(tenant).await?;
		let ledger_records = self.ledger.purge_for(tenant).await?;

		Ok((credentials, ledger_records))
	}

	/// Seals and installs a credential obtained from an external authorization
	/// grant. The refresh secret is encrypted before it reaches the store.
	pub async fn install_credential(
		&self,
		tenant: TenantId,
		environment: Environment,
		realm: RealmId,
		refresh_token: TokenSecret,
		refresh_expires_at: OffsetDateTime,
	) -> Result<()> {
		// The tenant must be registered before credentials can attach to it.
		self.tenant(&tenant).await?;

		let sealed = self.cipher.seal(&refresh_token);
		let credential = Credential::builder(tenant, environment, realm)
			.refresh_secret(sealed)
			.refresh_expires_at(refresh_expires_at)
			.build()
			.map_err(crate::error::ConfigError::from)?;

		Ok(self.credentials.upsert_credential(credential).await?)
	}

	/// Removes the credential for a tenant/environment pair, returning `true`
	/// when one existed.
	pub async fn revoke_credential(
		&self,
		tenant: TenantId,
		environment: Environment,
	) -> Result<bool> {
		let key = CredentialKey::new(tenant, environment);

		Ok(self.credentials.remove_credential(&key).await?.is_some())
	}
}
#[cfg(feature = "reqwest")]
impl Gateway<ReqwestTransport> {
	/// Creates a gateway with its own reqwest-backed transport so callers do
	/// not need to pass HTTP handles explicitly.
	pub fn new(
		credentials: Arc<dyn CredentialStore>,
		ledger: Arc<dyn IdempotencyLedger>,
		cipher: SecretCipher,
		config: GatewayConfig,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> Self {
		Self::with_transport(
			credentials,
			ledger,
			cipher,
			config,
			client_id,
			client_secret,
			ReqwestTransport::default(),
		)
	}
}
impl<T> Debug for Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Gateway")
			.field("config", &self.config)
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.finish()
	}
}
