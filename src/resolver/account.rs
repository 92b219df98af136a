//! Account resolution cascade: exact qualified name, leaf name with and
//! without a type filter, then policy-gated creation under the parent.

// self
use crate::{
	_prelude::*,
	remote::ApiTransport,
	resolver::{
		self, EntityKind, ReferenceResolver, ResolutionOrigin, ResolveOptions, ResolvedReference,
		query,
	},
};

const FALLBACK_ACCOUNT_NAME: &str = "Auto Account";
const DEFAULT_ACCOUNT_TYPE: &str = "Expense";

impl<T> ReferenceResolver<'_, T>
where
	T: ?Sized + ApiTransport,
{
	pub(crate) async fn resolve_account(
		&self,
		needle: &str,
		options: &ResolveOptions,
	) -> Result<ResolvedReference> {
		const KIND: EntityKind = EntityKind::Account;

		let type_hint = options.type_hint.as_deref();

		// Qualified paths get an exact full-path match first; no type filter so
		// a hint mismatch still finds the account (it is reported, not rejected).
		if needle.contains(':')
			&& let Some(found) =
				self.lookup_account("FullyQualifiedName", needle, None).await?
		{
			return Ok(check_type_hint(found, type_hint));
		}

		let leaf = sanitize_leaf(needle);

		if let Some(hint) = type_hint
			&& let Some(found) =
				self.lookup_account("Name", &leaf, Some(("AccountType", hint))).await?
		{
			return Ok(found);
		}
		if let Some(found) = self.lookup_account("Name", &leaf, None).await? {
			return Ok(check_type_hint(found, type_hint));
		}
		if !self.auto_create_allowed(options.auto_create) {
			return Err(Error::ReferenceNotFound { kind: KIND, name: needle.into() });
		}

		self.create_account(needle, &leaf, type_hint).await
	}

	async fn lookup_account(
		&self,
		field: &str,
		value: &str,
		extra: Option<(&str, &str)>,
	) -> Result<Option<ResolvedReference>> {
		let statement = query::select_one(EntityKind::Account.entity(), field, value, extra);
		let response = self.query(&statement).await?;

		Ok(query::first_entity(&response, EntityKind::Account.entity())
			.and_then(|entity| query::reference_from(&entity, ResolutionOrigin::Found)))
	}

	async fn create_account(
		&self,
		needle: &str,
		leaf: &str,
		type_hint: Option<&str>,
	) -> Result<ResolvedReference> {
		// crates.io
		use serde_json::json;

		let mut payload = json!({
			"Name": leaf,
			"AccountType": type_hint.unwrap_or(DEFAULT_ACCOUNT_TYPE),
		});

		// A missing parent is tolerated; the account is created at the root.
		if let Some(parent_path) = parent_path(needle)
			&& let Some(parent) =
				self.lookup_account("FullyQualifiedName", parent_path, None).await?
		{
			payload["ParentRef"] = json!({ "value": parent.id });
		}

		match self.create(EntityKind::Account.resource(), payload).await {
			Ok(body) => query::created_entity(&body, EntityKind::Account.entity())
				.and_then(|entity| query::reference_from(&entity, ResolutionOrigin::Created))
				.ok_or_else(|| Error::ReferenceNotFound {
					kind: EntityKind::Account,
					name: needle.into(),
				}),
			Err(rejection) if resolver::rejection_is_duplicate(&rejection) => {
				// Another writer created the account between our lookup and
				// create; adopt theirs.
				match self.recover_duplicate_account(needle, leaf).await? {
					Some(substituted) => {
						#[cfg(feature = "tracing")]
						tracing::warn!(
							name = leaf,
							id = substituted.id.as_str(),
							"account creation rejected as duplicate; substituting the existing account",
						);

						Ok(substituted)
					},
					None => Err(rejection),
				}
			},
			Err(err) => Err(err),
		}
	}

	/// Looks the duplicate up by the original qualified path first, then by
	/// the payload leaf name, both unfiltered.
	async fn recover_duplicate_account(
		&self,
		needle: &str,
		leaf: &str,
	) -> Result<Option<ResolvedReference>> {
		if needle.contains(':')
			&& let Some(found) =
				self.lookup_account("FullyQualifiedName", needle, None).await?
		{
			return Ok(Some(substituted(found)));
		}

		Ok(self.lookup_account("Name", leaf, None).await?.map(substituted))
	}
}

fn substituted(mut reference: ResolvedReference) -> ResolvedReference {
	reference.origin = ResolutionOrigin::Substituted;

	reference
}

fn check_type_hint(reference: ResolvedReference, type_hint: Option<&str>) -> ResolvedReference {
	#[cfg(feature = "tracing")]
	if let (Some(hint), Some(actual)) = (type_hint, reference.subtype.as_deref())
		&& hint != actual
	{
		tracing::warn!(
			name = reference.name.as_str(),
			expected = hint,
			actual,
			"resolved account type differs from the requested hint",
		);
	}
	#[cfg(not(feature = "tracing"))]
	let _ = type_hint;

	reference
}

/// Strips control characters from the leaf segment of a qualified name,
/// falling back to a stable placeholder when nothing printable remains.
pub(crate) fn sanitize_leaf(needle: &str) -> String {
	let leaf = needle.rsplit(':').next().unwrap_or(needle);
	let cleaned = leaf.chars().filter(|c| !matches!(c, '\r' | '\n' | '\t')).collect::<String>();
	let trimmed = cleaned.trim();

	if trimmed.is_empty() { FALLBACK_ACCOUNT_NAME.into() } else { trimmed.into() }
}

fn parent_path(needle: &str) -> Option<&str> {
	needle.rsplit_once(':').map(|(parent, _)| parent)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn leaf_sanitization_strips_controls_and_falls_back() {
		assert_eq!(sanitize_leaf("Expenses:Travel"), "Travel");
		assert_eq!(sanitize_leaf("Tra\tvel\r\n"), "Travel");
		assert_eq!(sanitize_leaf("Meals"), "Meals");
		assert_eq!(sanitize_leaf("Expenses:\r\n\t"), FALLBACK_ACCOUNT_NAME);
	}

	#[test]
	fn parent_path_splits_on_the_last_separator() {
		assert_eq!(parent_path("Expenses:Travel:Air"), Some("Expenses:Travel"));
		assert_eq!(parent_path("Expenses:Travel"), Some("Expenses"));
		assert_eq!(parent_path("Travel"), None);
	}

	#[test]
	fn substitution_rewrites_the_origin() {
		let reference = ResolvedReference {
			id: "9".into(),
			name: "Travel".into(),
			subtype: Some("Expense".into()),
			origin: ResolutionOrigin::Found,
		};

		assert_eq!(substituted(reference).origin, ResolutionOrigin::Substituted);
	}
}
