//! Per-tenant-per-environment credential records and lifecycle helpers.

// self
use crate::{
	_prelude::*,
	secret::{SealedSecret, TokenSecret},
	tenant::{Environment, RealmId, TenantId},
};

/// Unique key identifying a credential record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialKey {
	/// Owning tenant.
	pub tenant: TenantId,
	/// Remote environment the credential is bound to.
	pub environment: Environment,
}
impl CredentialKey {
	/// Builds a key for the provided tenant and environment.
	pub fn new(tenant: TenantId, environment: Environment) -> Self {
		Self { tenant, environment }
	}
}
impl Display for CredentialKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}/{}", self.tenant, self.environment)
	}
}

/// Errors produced by [`CredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuilderError {
	/// Issued when no sealed refresh secret was provided.
	#[error("Sealed refresh secret is required.")]
	MissingRefreshSecret,
	/// Issued when no refresh-secret expiry was configured.
	#[error("Refresh-secret expiry is required.")]
	MissingRefreshExpiry,
}

/// Credential for one `(tenant, environment)` pair.
///
/// The long-lived refresh secret is held only in sealed form; the short-lived
/// access token lives alongside it and is refreshed by the token lifecycle
/// manager, which is the sole mutator of this record.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
	/// Owning tenant.
	pub tenant: TenantId,
	/// Remote environment the credential is bound to.
	pub environment: Environment,
	/// Remote company/realm identifier.
	pub realm: RealmId,
	/// Sealed long-lived refresh secret. Rotates on every refresh exchange.
	pub refresh_secret: SealedSecret,
	/// Current short-lived access token, if one has been issued.
	pub access_token: Option<TokenSecret>,
	/// Expiry instant of the access token.
	pub access_expires_at: Option<OffsetDateTime>,
	/// Expiry instant of the refresh secret itself.
	pub refresh_expires_at: OffsetDateTime,
	/// Instant of the most recent successful refresh exchange.
	pub last_refreshed_at: Option<OffsetDateTime>,
	/// Number of refresh exchanges performed against this record.
	pub refresh_counter: u64,
	/// Set when the remote rejected the refresh secret; requires re-authorization.
	pub disabled_at: Option<OffsetDateTime>,
}
impl Credential {
	/// Returns a builder for constructing rotation-friendly records.
	pub fn builder(tenant: TenantId, environment: Environment, realm: RealmId) -> CredentialBuilder {
		CredentialBuilder::new(tenant, environment, realm)
	}

	/// Returns the store key for this record.
	pub fn key(&self) -> CredentialKey {
		CredentialKey::new(self.tenant.clone(), self.environment)
	}

	/// Returns `true` when the record has been marked unusable or its refresh
	/// secret has expired, i.e. a fresh authorization grant is required.
	pub fn needs_reauthorization_at(&self, instant: OffsetDateTime) -> bool {
		self.disabled_at.is_some() || instant >= self.refresh_expires_at
	}

	/// Returns `true` when the access token is absent or will expire within the
	/// provided grace period.
	pub fn needs_refresh_at(&self, instant: OffsetDateTime, grace_period: Duration) -> bool {
		match (&self.access_token, self.access_expires_at) {
			(Some(_), Some(expires_at)) => expires_at - instant <= grace_period,
			_ => true,
		}
	}

	/// Marks the record unusable as of the provided instant.
	pub fn disable(&mut self, instant: OffsetDateTime) {
		self.disabled_at = Some(instant);
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("tenant", &self.tenant)
			.field("environment", &self.environment)
			.field("realm", &self.realm)
			.field("refresh_secret", &"<sealed>")
			.field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
			.field("access_expires_at", &self.access_expires_at)
			.field("refresh_expires_at", &self.refresh_expires_at)
			.field("last_refreshed_at", &self.last_refreshed_at)
			.field("refresh_counter", &self.refresh_counter)
			.field("disabled_at", &self.disabled_at)
			.finish()
	}
}

/// Builder for [`Credential`].
#[derive(Clone, Debug)]
pub struct CredentialBuilder {
	tenant: TenantId,
	environment: Environment,
	realm: RealmId,
	refresh_secret: Option<SealedSecret>,
	access_token: Option<TokenSecret>,
	access_expires_at: Option<OffsetDateTime>,
	refresh_expires_at: Option<OffsetDateTime>,
	last_refreshed_at: Option<OffsetDateTime>,
	refresh_counter: u64,
}
impl CredentialBuilder {
	fn new(tenant: TenantId, environment: Environment, realm: RealmId) -> Self {
		Self {
			tenant,
			environment,
			realm,
			refresh_secret: None,
			access_token: None,
			access_expires_at: None,
			refresh_expires_at: None,
			last_refreshed_at: None,
			refresh_counter: 0,
		}
	}

	/// Provides the sealed refresh secret.
	pub fn refresh_secret(mut self, sealed: SealedSecret) -> Self {
		self.refresh_secret = Some(sealed);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the access-token expiry instant.
	pub fn access_expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.access_expires_at = Some(instant);

		self
	}

	/// Sets the refresh-secret expiry instant.
	pub fn refresh_expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.refresh_expires_at = Some(instant);

		self
	}

	/// Sets the last-refreshed instant.
	pub fn last_refreshed_at(mut self, instant: OffsetDateTime) -> Self {
		self.last_refreshed_at = Some(instant);

		self
	}

	/// Sets the refresh counter carried over from a previous record.
	pub fn refresh_counter(mut self, count: u64) -> Self {
		self.refresh_counter = count;

		self
	}

	/// Consumes the builder and produces a [`Credential`].
	pub fn build(self) -> Result<Credential, CredentialBuilderError> {
		let refresh_secret =
			self.refresh_secret.ok_or(CredentialBuilderError::MissingRefreshSecret)?;
		let refresh_expires_at =
			self.refresh_expires_at.ok_or(CredentialBuilderError::MissingRefreshExpiry)?;

		Ok(Credential {
			tenant: self.tenant,
			environment: self.environment,
			realm: self.realm,
			refresh_secret,
			access_token: self.access_token,
			access_expires_at: self.access_expires_at,
			refresh_expires_at,
			last_refreshed_at: self.last_refreshed_at,
			refresh_counter: self.refresh_counter,
			disabled_at: None,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn fixture(refresh_expires_at: OffsetDateTime) -> Credential {
		Credential::builder(
			TenantId::new("t-1").expect("Tenant fixture should be valid."),
			Environment::Sandbox,
			RealmId::new("realm-1").expect("Realm fixture should be valid."),
		)
		.refresh_secret(SealedSecret::from_encoded("sealed"))
		.access_token("access")
		.access_expires_at(macros::datetime!(2025-01-01 01:00 UTC))
		.refresh_expires_at(refresh_expires_at)
		.build()
		.expect("Credential fixture should build successfully.")
	}

	#[test]
	fn refresh_window_respects_grace_period() {
		let credential = fixture(macros::datetime!(2025-06-01 00:00 UTC));
		let grace = Duration::minutes(5);

		assert!(!credential.needs_refresh_at(macros::datetime!(2025-01-01 00:00 UTC), grace));
		assert!(credential.needs_refresh_at(macros::datetime!(2025-01-01 00:56 UTC), grace));
		assert!(credential.needs_refresh_at(macros::datetime!(2025-01-01 02:00 UTC), grace));
	}

	#[test]
	fn missing_access_token_always_needs_refresh() {
		let mut credential = fixture(macros::datetime!(2025-06-01 00:00 UTC));

		credential.access_token = None;

		assert!(credential.needs_refresh_at(macros::datetime!(2025-01-01 00:00 UTC), Duration::ZERO));
	}

	#[test]
	fn reauthorization_covers_disable_and_expiry() {
		let mut credential = fixture(macros::datetime!(2025-01-02 00:00 UTC));

		assert!(!credential.needs_reauthorization_at(macros::datetime!(2025-01-01 00:00 UTC)));
		assert!(credential.needs_reauthorization_at(macros::datetime!(2025-01-02 00:00 UTC)));

		credential.disable(macros::datetime!(2025-01-01 00:00 UTC));

		assert!(credential.needs_reauthorization_at(macros::datetime!(2025-01-01 00:01 UTC)));
	}

	#[test]
	fn debug_redacts_secrets() {
		let rendered = format!("{:?}", fixture(macros::datetime!(2025-06-01 00:00 UTC)));

		assert!(rendered.contains("<sealed>"));
		assert!(rendered.contains("<redacted>"));
		assert!(!rendered.contains("access\""));
	}

	#[test]
	fn builder_requires_secret_and_expiry() {
		let builder = Credential::builder(
			TenantId::new("t-1").expect("Tenant fixture should be valid."),
			Environment::Sandbox,
			RealmId::new("realm-1").expect("Realm fixture should be valid."),
		);

		assert_eq!(builder.clone().build().err(), Some(CredentialBuilderError::MissingRefreshSecret));
		assert_eq!(
			builder.refresh_secret(SealedSecret::from_encoded("sealed")).build().err(),
			Some(CredentialBuilderError::MissingRefreshExpiry),
		);
	}
}
