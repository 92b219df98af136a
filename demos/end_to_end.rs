//! Demonstrates the full gateway lifecycle against a mock remote: install a
//! tenant credential, resolve a customer reference, and post an idempotent
//! invoice whose retry replays from the ledger.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use rust_decimal::Decimal;
use serde_json::json;
use time::{Duration, OffsetDateTime};
use url::Url;
// self
use books_gateway::{
	config::{EnvironmentEndpoints, GatewayConfig, RemoteEndpoints},
	gateway::{Gateway, WriteRequest},
	idempotency::Fingerprint,
	remote::ReqwestTransport,
	reqwest::Client,
	resolver::EntityKind,
	secret::{SecretCipher, TokenSecret},
	store::{CredentialStore, IdempotencyLedger, MemoryStore},
	tenant::{Environment, IdempotencyKey, OperationKind, RealmId, Tenant, TenantId},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"refresh_token\":\"demo-refresh-1\",\
				 \"token_type\":\"bearer\",\"expires_in\":3600,\
				 \"x_refresh_token_expires_in\":8726400}",
			);
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/v3/company/4620816365/query");
			then.status(200).header("content-type", "application/json").json_body(json!({
				"QueryResponse": { "Customer": [{ "Id": "1", "DisplayName": "ACME" }] }
			}));
		})
		.await;

	let invoice_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v3/company/4620816365/invoice");
			then.status(200).header("content-type", "application/json").json_body(json!({
				"Invoice": { "Id": "88", "TotalAmt": 10.50 }
			}));
		})
		.await;
	let endpoints = RemoteEndpoints {
		token_url: Url::parse(&server.url("/token"))?,
		api_base: Url::parse(&server.base_url())?,
	};
	let config = GatewayConfig {
		endpoints: EnvironmentEndpoints { sandbox: endpoints.clone(), production: endpoints },
		..Default::default()
	};
	let store = Arc::new(MemoryStore::default());
	let credentials: Arc<dyn CredentialStore> = store.clone();
	let ledger: Arc<dyn IdempotencyLedger> = store;
	let transport = ReqwestTransport::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()?,
	);
	let gateway = Gateway::with_transport(
		credentials,
		ledger,
		SecretCipher::new(&[0x42; 32])?,
		config,
		"demo-client",
		"demo-client-secret",
		transport,
	);
	let tenant = TenantId::new("tenant-acme")?;

	gateway.register_tenant(Tenant::new(tenant.clone(), "ACME Corporation")).await?;
	gateway
		.install_credential(
			tenant.clone(),
			Environment::Sandbox,
			RealmId::new("4620816365")?,
			TokenSecret::new("demo-refresh-0"),
			OffsetDateTime::now_utc() + Duration::days(100),
		)
		.await?;

	let customer = gateway
		.resolver(tenant.clone(), Environment::Sandbox)
		.resolve(EntityKind::Customer, "ACME", Default::default())
		.await?;

	println!("Resolved customer {} as remote id {}.", customer.name, customer.id);

	let request = WriteRequest {
		tenant,
		environment: Environment::Sandbox,
		operation: OperationKind::new("create_invoice")?,
		key: IdempotencyKey::new("invoice-2024-07-0001")?,
		fingerprint: Fingerprint::builder()
			.text(&customer.id)
			.amount(Decimal::new(1050, 2))
			.finish(),
		resource: "invoice".into(),
		payload: json!({
			"CustomerRef": { "value": customer.id },
			"Line": [{
				"Amount": 10.50,
				"DetailType": "SalesItemLineDetail",
				"SalesItemLineDetail": { "ItemRef": { "value": "1" } }
			}]
		}),
	};
	let first = gateway.execute_write(request.clone()).await?;
	let second = gateway.execute_write(request).await?;

	println!(
		"Invoice settled with status {} (replayed: {}); retry replayed: {}.",
		first.status, first.replayed, second.replayed,
	);

	invoice_mock.assert_calls_async(1).await;

	Ok(())
}
