//! Shared helpers for gateway operations (access requests, singleflight guards).

// self
use crate::{
	_prelude::*,
	credential::{Credential, CredentialKey},
	gateway::Gateway,
	remote::ApiTransport,
	tenant::{Environment, TenantId},
};

/// Parameters for requesting a usable access token.
#[derive(Clone, Debug)]
pub struct AccessRequest {
	/// Tenant identifier tied to the request.
	pub tenant: TenantId,
	/// Remote environment to authenticate against.
	pub environment: Environment,
	/// Forces a refresh exchange even when the cached token is still fresh.
	pub force: bool,
}
impl AccessRequest {
	/// Creates a new request for the provided tenant/environment pair.
	pub fn new(tenant: TenantId, environment: Environment) -> Self {
		Self { tenant, environment, force: false }
	}

	/// Forces the gateway to bypass the cached access token.
	pub fn force_refresh(mut self) -> Self {
		self.force = true;

		self
	}

	/// Returns the credential key addressed by this request.
	pub fn key(&self) -> CredentialKey {
		CredentialKey::new(self.tenant.clone(), self.environment)
	}

	/// Determines whether the cached credential needs a refresh exchange.
	pub fn should_refresh(
		&self,
		credential: &Credential,
		now: OffsetDateTime,
		grace_period: Duration,
	) -> bool {
		self.force || credential.needs_refresh_at(now, grace_period)
	}
}

/// Returns (and creates on demand) the singleflight guard for a credential key.
pub(crate) fn refresh_guard<T>(gateway: &Gateway<T>, key: &CredentialKey) -> Arc<AsyncMutex<()>>
where
	T: ?Sized + ApiTransport,
{
	let mut guards = gateway.refresh_guards.lock();

	guards.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
}
