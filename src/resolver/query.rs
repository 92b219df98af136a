//! Query-statement construction and response extraction helpers.

// self
use crate::resolver::{ResolutionOrigin, ResolvedReference};

/// Remote fault code returned when a created entity's name already exists.
pub(crate) const DUPLICATE_NAME_CODE: &str = "6240";

/// Doubles single quotes so user-supplied values cannot break out of the
/// statement's string literal.
pub(crate) fn escape(value: &str) -> String {
	value.replace('\'', "''")
}

/// Returns `true` when the needle looks like a remote identifier.
pub(crate) fn is_remote_id(value: &str) -> bool {
	!value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// Builds a single-row lookup statement with an optional extra equality filter.
pub(crate) fn select_one(
	entity: &str,
	field: &str,
	value: &str,
	extra: Option<(&str, &str)>,
) -> String {
	let mut statement = format!("SELECT * FROM {entity} WHERE {field} = '{}'", escape(value));

	if let Some((extra_field, extra_value)) = extra {
		statement.push_str(&format!(" AND {extra_field} = '{}'", escape(extra_value)));
	}

	statement.push_str(" STARTPOSITION 1 MAXRESULTS 1");

	statement
}

/// Extracts the first entity row from a `QueryResponse` object.
pub(crate) fn first_entity(query_response: &serde_json::Value, entity: &str) -> Option<serde_json::Value> {
	query_response.get(entity)?.get(0).cloned()
}

/// Extracts the entity object from a creation response body.
pub(crate) fn created_entity(body: &serde_json::Value, entity: &str) -> Option<serde_json::Value> {
	body.get(entity).cloned()
}

/// Builds a [`ResolvedReference`] from an entity object, preferring the most
/// specific name field available.
pub(crate) fn reference_from(
	entity: &serde_json::Value,
	origin: ResolutionOrigin,
) -> Option<ResolvedReference> {
	let id = entity.get("Id")?.as_str()?.to_owned();
	let name = entity
		.get("FullyQualifiedName")
		.or_else(|| entity.get("DisplayName"))
		.or_else(|| entity.get("Name"))
		.and_then(|name| name.as_str())?
		.to_owned();
	let subtype =
		entity.get("AccountType").and_then(|subtype| subtype.as_str()).map(str::to_owned);

	Some(ResolvedReference { id, name, subtype, origin })
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[test]
	fn quotes_are_doubled() {
		assert_eq!(escape("O'Brien's"), "O''Brien''s");
		assert_eq!(escape("plain"), "plain");
	}

	#[test]
	fn remote_ids_are_all_digits() {
		assert!(is_remote_id("42"));
		assert!(!is_remote_id(""));
		assert!(!is_remote_id("42a"));
		assert!(!is_remote_id("4 2"));
	}

	#[test]
	fn select_one_builds_bounded_statements() {
		assert_eq!(
			select_one("Customer", "DisplayName", "O'Brien", None),
			"SELECT * FROM Customer WHERE DisplayName = 'O''Brien' \
			 STARTPOSITION 1 MAXRESULTS 1",
		);
		assert_eq!(
			select_one("Account", "Name", "Travel", Some(("AccountType", "Expense"))),
			"SELECT * FROM Account WHERE Name = 'Travel' AND AccountType = 'Expense' \
			 STARTPOSITION 1 MAXRESULTS 1",
		);
	}

	#[test]
	fn reference_prefers_the_most_specific_name() {
		let entity = json!({
			"Id": "77",
			"Name": "Travel",
			"FullyQualifiedName": "Expenses:Travel",
			"AccountType": "Expense"
		});
		let reference = reference_from(&entity, ResolutionOrigin::Found)
			.expect("Entity with Id and name should resolve.");

		assert_eq!(reference.id, "77");
		assert_eq!(reference.name, "Expenses:Travel");
		assert_eq!(reference.subtype.as_deref(), Some("Expense"));
	}

	#[test]
	fn reference_requires_id_and_name() {
		assert!(reference_from(&json!({ "Name": "Travel" }), ResolutionOrigin::Found).is_none());
		assert!(reference_from(&json!({ "Id": "77" }), ResolutionOrigin::Found).is_none());
	}

	#[test]
	fn first_entity_reads_the_query_envelope() {
		let response = json!({ "Customer": [{ "Id": "1", "DisplayName": "ACME" }] });

		assert!(first_entity(&response, "Customer").is_some());
		assert!(first_entity(&response, "Vendor").is_none());
		assert!(first_entity(&json!({}), "Customer").is_none());
	}
}
