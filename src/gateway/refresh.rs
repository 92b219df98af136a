//! Refresh-token orchestration with singleflight guards, CAS rotation, and metrics.
//!
//! The gateway exposes [`Gateway::ensure_access_token`] so callers can request a
//! usable access token for a tenant/environment pair without worrying about
//! concurrent rotations. Each request acquires a per-[`CredentialKey`] guard,
//! evaluates the preemptive grace window, and either reuses the cached token or
//! performs a `grant_type=refresh_token` exchange. Successful exchanges rotate
//! secrets via `CredentialStore::compare_and_swap_refresh`, while grant
//! rejections mark the credential unusable.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	credential::{Credential, CredentialKey},
	error::ConfigError,
	gateway::{AccessRequest, Gateway, common},
	obs::{self, CallKind, CallOutcome, CallSpan},
	remote::{self, ApiRequest, ApiTransport},
	secret::TokenSecret,
	store::CompareAndSwapOutcome,
	tenant::RealmId,
};

/// A usable access token paired with the realm it authorizes.
#[derive(Clone, Debug)]
pub struct AccessGrant {
	/// Short-lived bearer token.
	pub token: TokenSecret,
	/// Remote company/realm the token authorizes.
	pub realm: RealmId,
}

#[derive(Debug, Deserialize)]
struct TokenGrantPayload {
	access_token: String,
	refresh_token: String,
	expires_in: i64,
	x_refresh_token_expires_in: i64,
}

impl<T> Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	/// Returns a usable access token, refreshing under a singleflight guard
	/// when the cached one is absent, expired, or inside the grace window.
	pub async fn ensure_access_token(&self, request: AccessRequest) -> Result<AccessGrant> {
		const KIND: CallKind = CallKind::Refresh;

		let span = CallSpan::new(KIND, "ensure_access_token");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span
			.instrument(async move {
				self.refresh_metrics.record_request();

				let key = request.key();
				let guard = common::refresh_guard(self, &key);
				let _singleflight = guard.lock().await;
				let now = OffsetDateTime::now_utc();
				let current = self
					.credentials
					.fetch_credential(&key)
					.await
					.map_err(|err| {
						self.refresh_metrics.record_failure();
						Error::from(err)
					})?
					.ok_or_else(|| {
						self.refresh_metrics.record_failure();

						Error::CredentialNotFound { key: key.clone() }
					})?;

				if current.needs_reauthorization_at(now) {
					self.refresh_metrics.record_failure();

					return Err(Error::ReauthorizationRequired {
						key,
						reason: "refresh secret is expired or disabled".into(),
					});
				}
				if !request.should_refresh(&current, now, self.config.grace_period)
					&& let Some(token) = current.access_token.clone()
				{
					self.refresh_metrics.record_reuse();

					return Ok(AccessGrant { token, realm: current.realm.clone() });
				}

				self.exchange_and_rotate(&key, current, now).await
			})
			.await;

		match &result {
			Ok(_) => obs::record_call_outcome(KIND, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(KIND, CallOutcome::Failure),
		}

		result
	}

	/// Forces a refresh exchange regardless of the cached token's freshness.
	pub async fn force_rotate(&self, request: AccessRequest) -> Result<AccessGrant> {
		self.ensure_access_token(request.force_refresh()).await
	}

	async fn exchange_and_rotate(
		&self,
		key: &CredentialKey,
		current: Credential,
		now: OffsetDateTime,
	) -> Result<AccessGrant> {
		let refresh_plain = self.cipher.open(&current.refresh_secret).map_err(|err| {
			self.refresh_metrics.record_failure();
			Error::from(err)
		})?;
		let endpoints = self.config.endpoints.resolve(key.environment);
		let request = ApiRequest::post_form(
			endpoints.token_url.clone(),
			vec![
				("grant_type".into(), "refresh_token".into()),
				("refresh_token".into(), refresh_plain.expose().into()),
			],
		)
		.with_basic(&self.client_id, &self.client_secret)
		.with_header("Accept", "application/json");

		self.refresh_metrics.record_exchange();

		let response = remote::execute_with_retry(
			self.transport.as_ref(),
			&self.config.retry,
			self.config.request_timeout,
			CallKind::Refresh,
			request,
		)
		.await
		.inspect_err(|_| {
			self.refresh_metrics.record_failure();
		})?;

		if !response.is_success() {
			// Retryable statuses were exhausted inside the executor, so any
			// remaining failure is a grant rejection.
			let _ = self.credentials.mark_unusable(key, now).await;

			self.refresh_metrics.record_failure();

			return Err(Error::ReauthorizationRequired {
				key: key.clone(),
				reason: format!("status {}: {}", response.status, response.body_preview()),
			});
		}

		let payload = response.json::<TokenGrantPayload>().map_err(|err| {
			self.refresh_metrics.record_failure();
			Error::from(err)
		})?;
		let replacement = self.rotated_credential(&current, &payload, now).map_err(|err| {
			self.refresh_metrics.record_failure();

			err
		})?;
		let grant = AccessGrant {
			token: TokenSecret::new(payload.access_token),
			realm: current.realm.clone(),
		};
		let outcome = self
			.credentials
			.compare_and_swap_refresh(key, &current.refresh_secret, replacement.clone())
			.await
			.map_err(|err| {
				self.refresh_metrics.record_failure();
				Error::from(err)
			})?;
		let grant = match outcome {
			CompareAndSwapOutcome::Updated => grant,
			CompareAndSwapOutcome::Missing => {
				self.credentials.upsert_credential(replacement).await.map_err(|err| {
					self.refresh_metrics.record_failure();
					Error::from(err)
				})?;

				grant
			},
			CompareAndSwapOutcome::RefreshMismatch => {
				// A concurrent exchange already rotated the secret; prefer its
				// token so the loser does not clobber the winner's rotation.
				let existing = self.credentials.fetch_credential(key).await.map_err(|err| {
					self.refresh_metrics.record_failure();
					Error::from(err)
				})?;

				match existing.and_then(|record| {
					record
						.access_token
						.clone()
						.map(|token| AccessGrant { token, realm: record.realm.clone() })
				}) {
					Some(winner) => winner,
					None => {
						self.credentials.upsert_credential(replacement).await.map_err(|err| {
							self.refresh_metrics.record_failure();
							Error::from(err)
						})?;

						grant
					},
				}
			},
		};

		self.refresh_metrics.record_rotation();

		Ok(grant)
	}

	fn rotated_credential(
		&self,
		current: &Credential,
		payload: &TokenGrantPayload,
		now: OffsetDateTime,
	) -> Result<Credential> {
		if payload.expires_in <= 0 || payload.x_refresh_token_expires_in <= 0 {
			return Err(ConfigError::ExpiresInOutOfRange.into());
		}
		if payload.refresh_token.is_empty() {
			return Err(ConfigError::MissingRefreshToken.into());
		}

		let sealed = self.cipher.seal(&TokenSecret::new(payload.refresh_token.clone()));
		let credential = Credential::builder(
			current.tenant.clone(),
			current.environment,
			current.realm.clone(),
		)
		.refresh_secret(sealed)
		.access_token(payload.access_token.clone())
		.access_expires_at(now + Duration::seconds(payload.expires_in))
		.refresh_expires_at(now + Duration::seconds(payload.x_refresh_token_expires_in))
		.last_refreshed_at(now)
		.refresh_counter(current.refresh_counter + 1)
		.build()
		.map_err(ConfigError::from)?;

		Ok(credential)
	}
}
