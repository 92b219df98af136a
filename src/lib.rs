//! Multi-tenant gateway core for third-party accounting APIs—safe token
//! rotation, idempotent writes, and reference resolution in one crate built
//! for production.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod config;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod idempotency;
pub mod obs;
pub mod remote;
pub mod resolver;
pub mod secret;
pub mod store;
pub mod tenant;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		config::{EnvironmentEndpoints, GatewayConfig, RemoteEndpoints},
		gateway::{Gateway, ReqwestGateway},
		remote::ReqwestTransport,
		secret::{SecretCipher, TokenSecret},
		store::{CredentialStore, IdempotencyLedger, MemoryStore},
		tenant::{Environment, RealmId, Tenant, TenantId},
	};

	/// Builds a reqwest transport that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_transport() -> ReqwestTransport {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestTransport::with_client(client)
	}

	/// Builds a cipher from a fixed test key.
	pub fn test_cipher() -> SecretCipher {
		SecretCipher::new(&[7; 32]).expect("Fixed 32-byte test key should be accepted.")
	}

	/// Builds a config whose endpoints all point at the provided mock base URL,
	/// with fast retries so failure tests finish quickly.
	pub fn test_config(base: &str) -> GatewayConfig {
		let token_url =
			Url::parse(&format!("{base}/token")).expect("Mock token URL should parse.");
		let api_base = Url::parse(base).expect("Mock base URL should parse.");
		let endpoints = RemoteEndpoints { token_url, api_base };
		let mut config = GatewayConfig {
			endpoints: EnvironmentEndpoints {
				sandbox: endpoints.clone(),
				production: endpoints,
			},
			..Default::default()
		};

		config.retry.base_delay = Duration::milliseconds(10);
		config.retry.max_delay = Duration::milliseconds(50);
		config.request_timeout = Duration::seconds(5);

		config
	}

	/// Constructs a [`Gateway`] backed by an in-memory store and the reqwest
	/// transport used across integration tests.
	pub fn build_test_gateway(base: &str) -> (ReqwestGateway, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let credentials: Arc<dyn CredentialStore> = store_backend.clone();
		let ledger: Arc<dyn IdempotencyLedger> = store_backend.clone();
		let gateway = Gateway::with_transport(
			credentials,
			ledger,
			test_cipher(),
			test_config(base),
			"client-id",
			"client-secret",
			test_reqwest_transport(),
		);

		(gateway, store_backend)
	}

	/// Registers a tenant and installs a sandbox credential whose refresh
	/// secret is `refresh-0`. Returns the tenant identifier.
	pub async fn install_test_credential(gateway: &ReqwestGateway) -> TenantId {
		let tenant_id = TenantId::new("tenant-1").expect("Tenant fixture should be valid.");
		let realm = RealmId::new("4620816365").expect("Realm fixture should be valid.");

		gateway
			.register_tenant(Tenant::new(tenant_id.clone(), "Tenant One"))
			.await
			.expect("Tenant registration should succeed.");
		gateway
			.install_credential(
				tenant_id.clone(),
				Environment::Sandbox,
				realm,
				TokenSecret::new("refresh-0"),
				OffsetDateTime::now_utc() + Duration::days(100),
			)
			.await
			.expect("Credential installation should succeed.");

		tenant_id
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
#[cfg(test)] use books_gateway as _;
