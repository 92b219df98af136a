//! Gateway configuration: remote endpoints, refresh windows, retry, and ledger
//! policies. Every field carries a production-ready default so a config can be
//! deserialized from a partial document.

// self
use crate::{_prelude::*, error::ConfigError, tenant::Environment};

/// Endpoints for one remote environment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEndpoints {
	/// Token-exchange endpoint.
	pub token_url: Url,
	/// Base URL for company-scoped API calls.
	pub api_base: Url,
}
impl RemoteEndpoints {
	/// Builds the query endpoint for the provided realm.
	pub fn query_url(&self, realm: &str, minor_version: &str) -> Result<Url, ConfigError> {
		let mut url = self
			.api_base
			.join(&format!("v3/company/{realm}/query"))
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;

		url.query_pairs_mut().append_pair("minorversion", minor_version);

		Ok(url)
	}

	/// Builds the endpoint for creating or sparse-updating a resource.
	pub fn resource_url(
		&self,
		realm: &str,
		resource: &str,
		minor_version: &str,
	) -> Result<Url, ConfigError> {
		let mut url = self
			.api_base
			.join(&format!("v3/company/{realm}/{resource}"))
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;

		url.query_pairs_mut().append_pair("minorversion", minor_version);

		Ok(url)
	}
}

/// Per-environment endpoint table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentEndpoints {
	/// Sandbox environment endpoints.
	pub sandbox: RemoteEndpoints,
	/// Production environment endpoints.
	pub production: RemoteEndpoints,
}
impl EnvironmentEndpoints {
	/// Returns the endpoints for the provided environment.
	pub fn resolve(&self, environment: Environment) -> &RemoteEndpoints {
		match environment {
			Environment::Sandbox => &self.sandbox,
			Environment::Production => &self.production,
		}
	}
}
impl Default for EnvironmentEndpoints {
	fn default() -> Self {
		Self {
			sandbox: RemoteEndpoints {
				token_url: default_token_url(),
				api_base: parse_known("https://sandbox-quickbooks.api.intuit.com"),
			},
			production: RemoteEndpoints {
				token_url: default_token_url(),
				api_base: parse_known("https://quickbooks.api.intuit.com"),
			},
		}
	}
}

/// Policy applied when a write finds an in-flight record under its key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PendingPolicy {
	/// Total time to wait for the in-flight owner to settle before reporting a
	/// concurrent duplicate.
	pub max_wait: Duration,
	/// Interval between ledger polls while waiting.
	pub poll_interval: Duration,
	/// Age past which a pending record is considered abandoned and flagged for
	/// manual reconciliation.
	pub stale_after: Duration,
}
impl Default for PendingPolicy {
	fn default() -> Self {
		Self {
			max_wait: Duration::seconds(2),
			poll_interval: Duration::milliseconds(100),
			stale_after: Duration::minutes(10),
		}
	}
}

/// Per-environment default for resolver auto-creation, overridable per call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoCreatePolicy {
	/// Default for sandbox realms.
	pub sandbox: bool,
	/// Default for production realms.
	pub production: bool,
}
impl AutoCreatePolicy {
	/// Resolves the effective flag for a call, honoring an explicit override.
	pub fn allows(&self, environment: Environment, call_override: Option<bool>) -> bool {
		call_override.unwrap_or(match environment {
			Environment::Sandbox => self.sandbox,
			Environment::Production => self.production,
		})
	}
}
impl Default for AutoCreatePolicy {
	fn default() -> Self {
		Self { sandbox: true, production: false }
	}
}

/// Top-level gateway configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
	/// Remote endpoint table.
	pub endpoints: EnvironmentEndpoints,
	/// Access tokens expiring within this window are refreshed preemptively.
	pub grace_period: Duration,
	/// Per-attempt deadline for outbound requests.
	pub request_timeout: Duration,
	/// Retry schedule for retryable failures.
	pub retry: crate::remote::RetryPolicy,
	/// In-flight duplicate handling for ledgered writes.
	pub pending: PendingPolicy,
	/// Resolver auto-creation defaults.
	pub auto_create: AutoCreatePolicy,
	/// `minorversion` query parameter appended to API calls.
	pub minor_version: String,
}
impl Default for GatewayConfig {
	fn default() -> Self {
		Self {
			endpoints: EnvironmentEndpoints::default(),
			grace_period: Duration::minutes(5),
			request_timeout: Duration::seconds(30),
			retry: crate::remote::RetryPolicy::default(),
			pending: PendingPolicy::default(),
			auto_create: AutoCreatePolicy::default(),
			minor_version: "65".into(),
		}
	}
}

fn default_token_url() -> Url {
	parse_known("https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer")
}

// Only called with compile-time constant URLs.
fn parse_known(raw: &str) -> Url {
	Url::parse(raw).expect("Built-in endpoint URL should be valid.")
}
