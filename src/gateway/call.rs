//! Authorized remote calls: bearer attachment, 401-driven rotation, and fault
//! mapping shared by queries, writes, and the resolver.

// self
use crate::{
	_prelude::*,
	config::RemoteEndpoints,
	gateway::{AccessRequest, Gateway},
	obs::{self, CallKind, CallOutcome, CallSpan},
	remote::{self, ApiRequest, ApiTransport},
	tenant::{Environment, RealmId, TenantId},
};

impl<T> Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	/// Runs a query against the tenant's realm, returning the `QueryResponse`
	/// object from the response envelope.
	pub async fn query(
		&self,
		tenant: &TenantId,
		environment: Environment,
		statement: &str,
	) -> Result<serde_json::Value> {
		const KIND: CallKind = CallKind::Query;

		let span = CallSpan::new(KIND, "query");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span
			.instrument(async move {
				let minor_version = self.config.minor_version.clone();
				let (_, body) = self
					.authorized_call(KIND, tenant, environment, move |endpoints, realm| {
						let mut url = endpoints.query_url(realm, &minor_version)?;

						url.query_pairs_mut().append_pair("query", statement);

						Ok(ApiRequest::get(url))
					})
					.await?;

				Ok(body.get("QueryResponse").cloned().unwrap_or(serde_json::Value::Null))
			})
			.await;

		match &result {
			Ok(_) => obs::record_call_outcome(KIND, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(KIND, CallOutcome::Failure),
		}

		result
	}

	/// Creates a resource in the tenant's realm, returning the response body.
	pub async fn create(
		&self,
		tenant: &TenantId,
		environment: Environment,
		resource: &str,
		payload: serde_json::Value,
	) -> Result<serde_json::Value> {
		let (_, body) = self.send_write(tenant, environment, resource, payload).await?;

		Ok(body)
	}

	/// Applies a sparse update to a resource in the tenant's realm. The payload
	/// must carry `Id`, `SyncToken`, and `sparse: true`.
	pub async fn update(
		&self,
		tenant: &TenantId,
		environment: Environment,
		resource: &str,
		payload: serde_json::Value,
	) -> Result<serde_json::Value> {
		let (_, body) = self.send_write(tenant, environment, resource, payload).await?;

		Ok(body)
	}

	/// Posts a payload to a resource endpoint, returning status + body so the
	/// ledger can capture the response for replay.
	pub(crate) async fn send_write(
		&self,
		tenant: &TenantId,
		environment: Environment,
		resource: &str,
		payload: serde_json::Value,
	) -> Result<(u16, serde_json::Value)> {
		const KIND: CallKind = CallKind::Write;

		let span = CallSpan::new(KIND, "send_write");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span
			.instrument(async move {
				let minor_version = self.config.minor_version.clone();

				self.authorized_call(KIND, tenant, environment, move |endpoints, realm| {
					let url = endpoints.resource_url(realm, resource, &minor_version)?;

					Ok(ApiRequest::post_json(url, payload.clone()))
				})
				.await
			})
			.await;

		match &result {
			Ok(_) => obs::record_call_outcome(KIND, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(KIND, CallOutcome::Failure),
		}

		result
	}

	/// Executes a request with a bearer token, forcing one rotation and retry
	/// when the remote answers 401, then maps non-2xx fault payloads.
	pub(crate) async fn authorized_call<F>(
		&self,
		kind: CallKind,
		tenant: &TenantId,
		environment: Environment,
		build: F,
	) -> Result<(u16, serde_json::Value)>
	where
		F: Fn(&RemoteEndpoints, &RealmId) -> Result<ApiRequest>,
	{
		let access = AccessRequest::new(tenant.clone(), environment);
		let grant = self.ensure_access_token(access.clone()).await?;
		let endpoints = self.config.endpoints.resolve(environment);
		let request = build(endpoints, &grant.realm)?
			.with_bearer(&grant.token)
			.with_header("Accept", "application/json");
		let mut response = remote::execute_with_retry(
			self.transport.as_ref(),
			&self.config.retry,
			self.config.request_timeout,
			kind,
			request,
		)
		.await?;

		if response.status == 401 {
			// The cached token aged out server-side; rotate once and retry.
			let grant = self.force_rotate(access).await?;
			let request = build(endpoints, &grant.realm)?
				.with_bearer(&grant.token)
				.with_header("Accept", "application/json");

			response = remote::execute_with_retry(
				self.transport.as_ref(),
				&self.config.retry,
				self.config.request_timeout,
				kind,
				request,
			)
			.await?;
		}

		let status = response.status;
		let body = if response.body.is_empty() {
			serde_json::Value::Null
		} else {
			response.json::<serde_json::Value>()?
		};

		if !response.is_success() {
			let (code, detail) = fault_parts(&body, &response.body_preview());

			return Err(Error::RemoteRejected { status, code, detail });
		}

		Ok((status, body))
	}
}

/// Extracts the first fault code and message from a remote error envelope,
/// falling back to the raw body preview.
pub(crate) fn fault_parts(body: &serde_json::Value, fallback: &str) -> (Option<String>, String) {
	let first = body
		.get("Fault")
		.and_then(|fault| fault.get("Error"))
		.and_then(|errors| errors.get(0));
	let code = first
		.and_then(|error| error.get("code"))
		.and_then(|code| code.as_str())
		.map(str::to_owned);
	let detail = first
		.and_then(|error| {
			error
				.get("Detail")
				.or_else(|| error.get("Message"))
				.and_then(|detail| detail.as_str())
		})
		.map(str::to_owned)
		.unwrap_or_else(|| fallback.to_owned());

	(code, detail)
}
