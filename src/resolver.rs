//! Reference resolution: id/name lookups with per-kind query policies, an
//! operation-scoped cache, and policy-gated auto-creation.
//!
//! A [`ReferenceResolver`] is created per inbound operation and owns a cache
//! keyed by normalized entry (`id:<digits>` or `name:<lowercase>`), so the
//! same identifier never triggers two remote lookups within one operation.
//! Name matching for customers and vendors relies on the remote's
//! case-insensitive collation; items and classes are matched case-sensitively
//! by `FullyQualifiedName` because the remote rejects function-wrapped
//! predicates on those fields. Accounts run a dedicated cascade (exact
//! qualified name, then leaf with and without a type filter, then creation).

mod account;
pub(crate) mod query;

// self
use crate::{
	_prelude::*,
	gateway::Gateway,
	obs::{self, CallKind, CallOutcome, CallSpan},
	remote::ApiTransport,
	tenant::{Environment, TenantId},
};

/// Entity kinds the resolver understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
	/// A customer, matched by `DisplayName`.
	Customer,
	/// A vendor, matched by `DisplayName`.
	Vendor,
	/// An account, matched through the qualified-name cascade.
	Account,
	/// An item, matched case-sensitively by `FullyQualifiedName`.
	Item,
	/// A class, matched case-sensitively by `FullyQualifiedName`.
	Class,
}
impl EntityKind {
	/// Returns the remote entity name used in query statements.
	pub const fn entity(self) -> &'static str {
		match self {
			EntityKind::Customer => "Customer",
			EntityKind::Vendor => "Vendor",
			EntityKind::Account => "Account",
			EntityKind::Item => "Item",
			EntityKind::Class => "Class",
		}
	}

	/// Returns the resource segment used for creation endpoints.
	pub const fn resource(self) -> &'static str {
		match self {
			EntityKind::Customer => "customer",
			EntityKind::Vendor => "vendor",
			EntityKind::Account => "account",
			EntityKind::Item => "item",
			EntityKind::Class => "class",
		}
	}

	/// Returns the field name lookups match against.
	pub const fn lookup_field(self) -> &'static str {
		match self {
			EntityKind::Customer | EntityKind::Vendor => "DisplayName",
			EntityKind::Account => "FullyQualifiedName",
			EntityKind::Item | EntityKind::Class => "FullyQualifiedName",
		}
	}
}
impl Display for EntityKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.entity())
	}
}

/// How a resolved reference was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionOrigin {
	/// The entity already existed and matched the lookup.
	Found,
	/// The entity was created by the resolver.
	Created,
	/// Creation hit a duplicate-name rejection and an existing entity was
	/// substituted in its place.
	Substituted,
}

/// A resolved remote reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedReference {
	/// Remote identifier.
	pub id: String,
	/// Remote display or qualified name.
	pub name: String,
	/// Remote subtype (e.g. `AccountType`), when the entity carries one.
	pub subtype: Option<String>,
	/// How the reference was obtained.
	pub origin: ResolutionOrigin,
}

/// Per-call resolution options.
#[derive(Clone, Debug, Default)]
pub struct ResolveOptions {
	/// Expected subtype; accounts use it as an `AccountType` filter and log a
	/// warning when the resolved entity disagrees.
	pub type_hint: Option<String>,
	/// Overrides the configured auto-creation default for this call.
	pub auto_create: Option<bool>,
}

/// Normalizes a needle into a cache entry.
pub(crate) fn cache_entry(needle: &str) -> String {
	if query::is_remote_id(needle) {
		format!("id:{needle}")
	} else {
		format!("name:{}", needle.to_lowercase())
	}
}

/// Resolves references for one tenant/environment pair within one operation.
///
/// Created via [`Gateway::resolver`]. The cache lives as long as the resolver
/// does; drop it with the operation so later requests never see entries
/// warmed by an earlier one.
pub struct ReferenceResolver<'a, T>
where
	T: ?Sized + ApiTransport,
{
	gateway: &'a Gateway<T>,
	tenant: TenantId,
	environment: Environment,
	cache: RwLock<HashMap<(EntityKind, String), ResolvedReference>>,
}

impl<T> Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates an operation-scoped resolver for the tenant/environment pair.
	pub fn resolver(&self, tenant: TenantId, environment: Environment) -> ReferenceResolver<'_, T> {
		ReferenceResolver { gateway: self, tenant, environment, cache: RwLock::new(HashMap::new()) }
	}
}

impl<T> ReferenceResolver<'_, T>
where
	T: ?Sized + ApiTransport,
{
	/// Resolves a reference by remote id or name, consulting the cache first
	/// and creating the entity when policy allows.
	pub async fn resolve(
		&self,
		kind: EntityKind,
		needle: &str,
		options: ResolveOptions,
	) -> Result<ResolvedReference> {
		const KIND: CallKind = CallKind::Resolve;

		let span = CallSpan::new(KIND, "resolve");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span
			.instrument(async move {
				let needle = needle.trim();

				if needle.is_empty() {
					return Err(Error::ReferenceNotFound { kind, name: needle.into() });
				}

				let cache_key = (kind, cache_entry(needle));

				if let Some(cached) = self.cache.read().get(&cache_key).cloned() {
					return Ok(cached);
				}

				let resolved = if query::is_remote_id(needle) {
					match self.resolve_by_id(kind, needle).await {
						Ok(found) => found,
						// Purely numeric names exist; retry the needle as a
						// name, without creating anything from a bare number.
						Err(Error::ReferenceNotFound { .. }) => {
							let lookup_only =
								ResolveOptions { auto_create: Some(false), ..options.clone() };

							self.resolve_named(kind, needle, &lookup_only).await?
						},
						Err(err) => return Err(err),
					}
				} else {
					self.resolve_named(kind, needle, &options).await?
				};

				self.cache.write().insert(cache_key, resolved.clone());

				Ok(resolved)
			})
			.await;

		match &result {
			Ok(_) => obs::record_call_outcome(KIND, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(KIND, CallOutcome::Failure),
		}

		result
	}

	pub(crate) async fn query(&self, statement: &str) -> Result<serde_json::Value> {
		self.gateway.query(&self.tenant, self.environment, statement).await
	}

	pub(crate) async fn create(
		&self,
		resource: &str,
		payload: serde_json::Value,
	) -> Result<serde_json::Value> {
		self.gateway.create(&self.tenant, self.environment, resource, payload).await
	}

	pub(crate) fn auto_create_allowed(&self, call_override: Option<bool>) -> bool {
		self.gateway.config.auto_create.allows(self.environment, call_override)
	}

	async fn resolve_named(
		&self,
		kind: EntityKind,
		needle: &str,
		options: &ResolveOptions,
	) -> Result<ResolvedReference> {
		if kind == EntityKind::Account {
			self.resolve_account(needle, options).await
		} else {
			self.resolve_by_name(kind, needle, options).await
		}
	}

	async fn resolve_by_id(&self, kind: EntityKind, id: &str) -> Result<ResolvedReference> {
		let statement = query::select_one(kind.entity(), "Id", id, None);
		let response = self.query(&statement).await?;

		query::first_entity(&response, kind.entity())
			.and_then(|entity| query::reference_from(&entity, ResolutionOrigin::Found))
			.ok_or_else(|| Error::ReferenceNotFound { kind, name: id.into() })
	}

	async fn resolve_by_name(
		&self,
		kind: EntityKind,
		name: &str,
		options: &ResolveOptions,
	) -> Result<ResolvedReference> {
		let statement = query::select_one(kind.entity(), kind.lookup_field(), name, None);
		let response = self.query(&statement).await?;

		if let Some(found) = query::first_entity(&response, kind.entity())
			.and_then(|entity| query::reference_from(&entity, ResolutionOrigin::Found))
		{
			return Ok(found);
		}
		if !self.auto_create_allowed(options.auto_create) {
			return Err(Error::ReferenceNotFound { kind, name: name.into() });
		}

		let Some(payload) = creation_payload(kind, name) else {
			// The kind cannot be created from a bare name.
			return Err(Error::ReferenceNotFound { kind, name: name.into() });
		};

		match self.create(kind.resource(), payload).await {
			Ok(body) => query::created_entity(&body, kind.entity())
				.and_then(|entity| query::reference_from(&entity, ResolutionOrigin::Created))
				.ok_or_else(|| Error::ReferenceNotFound { kind, name: name.into() }),
			Err(rejection) if rejection_is_duplicate(&rejection) =>
				match self.substitute_existing(kind, name).await? {
					Some(substituted) => Ok(substituted),
					// The remote claims the name exists yet no lookup finds
					// it; surface its conflict untouched.
					None => Err(rejection),
				},
			Err(err) => Err(err),
		}
	}

	/// Re-queries after a duplicate-name rejection, returning the entity that
	/// won the race when one is visible.
	pub(crate) async fn substitute_existing(
		&self,
		kind: EntityKind,
		name: &str,
	) -> Result<Option<ResolvedReference>> {
		let statement = query::select_one(kind.entity(), kind.lookup_field(), name, None);
		let response = self.query(&statement).await?;
		let substituted = query::first_entity(&response, kind.entity())
			.and_then(|entity| query::reference_from(&entity, ResolutionOrigin::Substituted));

		#[cfg(feature = "tracing")]
		if let Some(reference) = &substituted {
			tracing::warn!(
				kind = kind.entity(),
				name,
				id = reference.id.as_str(),
				"creation rejected as duplicate; substituting the existing entity",
			);
		}

		Ok(substituted)
	}
}

pub(crate) fn rejection_is_duplicate(err: &Error) -> bool {
	matches!(
		err,
		Error::RemoteRejected { code: Some(code), .. } if code == query::DUPLICATE_NAME_CODE
	)
}

fn creation_payload(kind: EntityKind, name: &str) -> Option<serde_json::Value> {
	// crates.io
	use serde_json::json;

	match kind {
		EntityKind::Customer | EntityKind::Vendor => Some(json!({ "DisplayName": name })),
		EntityKind::Class => Some(json!({ "Name": name })),
		// Accounts go through their own cascade; items need more than a name.
		EntityKind::Account | EntityKind::Item => None,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn cache_entries_distinguish_ids_from_names() {
		assert_eq!(cache_entry("12345"), "id:12345");
		assert_eq!(cache_entry("Prime Supplies"), "name:prime supplies");
		assert_eq!(cache_entry("12a"), "name:12a");
	}

	#[test]
	fn creation_payload_covers_nameable_kinds_only() {
		assert!(creation_payload(EntityKind::Customer, "ACME").is_some());
		assert!(creation_payload(EntityKind::Vendor, "ACME").is_some());
		assert!(creation_payload(EntityKind::Class, "Ops").is_some());
		assert!(creation_payload(EntityKind::Item, "Widget").is_none());
		assert!(creation_payload(EntityKind::Account, "Travel").is_none());
	}

	#[test]
	fn duplicate_rejections_are_detected_by_code() {
		let duplicate = Error::RemoteRejected {
			status: 400,
			code: Some("6240".into()),
			detail: "Duplicate Name Exists Error".into(),
		};
		let other = Error::RemoteRejected {
			status: 400,
			code: Some("2500".into()),
			detail: "Invalid Reference Id".into(),
		};

		assert!(rejection_is_duplicate(&duplicate));
		assert!(!rejection_is_duplicate(&other));
	}
}
