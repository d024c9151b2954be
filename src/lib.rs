//! Client-side OAuth 2.0 / OpenID Connect token acquisition for the Microsoft security token
//! service: PKCE, discovery, clock skew, PKeyAuth, proof-of-possession, and session-key protected
//! token exchanges behind one provider-agnostic orchestrator.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod account;
pub mod authorize;
pub mod cache;
pub mod clock;
pub mod config;
pub mod discovery;
pub mod error;
pub mod http;
pub mod obs;
pub mod pkce;
pub mod protocol;
pub mod strategy;
pub mod sts;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and test doubles for integration tests; enabled via `cfg(test)` or
	//! the `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use sha2::{Digest, Sha256};
	// self
	use crate::{
		authorize::{AuthorizationFuture, AuthorizationStrategy, RawAuthorizationResult},
		config::{StsConfiguration, StsConfigurationBuilder},
		http::ReqwestHttpClient,
		protocol::AuthorizationRequest,
		strategy::StrategyParameters,
		sts::{DeviceCertificateProvider, DevicePopManager, PKeyAuthClaims, confirmation_for_kid},
	};

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Strategy parameters backed by [`test_reqwest_http_client`].
	pub fn test_strategy_parameters() -> StrategyParameters {
		StrategyParameters::new(Arc::new(test_reqwest_http_client()))
	}

	/// Configuration builder for the `common` authority served by a mock server at `base_url`.
	pub fn test_configuration_builder(base_url: &str) -> StsConfigurationBuilder {
		let authority = Url::parse(&format!("{base_url}/common"))
			.expect("Mock server URL should form a valid authority.");

		StsConfiguration::builder(authority)
	}

	/// Default configuration for the mock authority at `base_url`.
	pub fn test_configuration(base_url: &str) -> StsConfiguration {
		test_configuration_builder(base_url)
			.build()
			.expect("Mock authority should produce a valid configuration.")
	}

	/// Device key manager that creates one deterministic key on first use.
	#[derive(Debug, Default)]
	pub struct FakePopManager {
		kid: Mutex<Option<String>>,
		creations: AtomicUsize,
	}
	impl FakePopManager {
		/// Number of times a key was actually created.
		pub fn creations(&self) -> usize {
			self.creations.load(Ordering::SeqCst)
		}
	}
	impl DevicePopManager for FakePopManager {
		fn get_or_create_key(&self) -> Result<String> {
			let mut kid = self.kid.lock();

			Ok(kid
				.get_or_insert_with(|| {
					self.creations.fetch_add(1, Ordering::SeqCst);

					"fake-device-kid".to_owned()
				})
				.clone())
		}

		fn thumbprint(&self) -> Option<String> {
			self.kid.lock().clone()
		}

		fn request_confirmation(&self) -> Result<String> {
			confirmation_for_kid(&self.get_or_create_key()?)
		}

		fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
			let kid = self.get_or_create_key()?;
			let mut hasher = Sha256::new();

			hasher.update(kid.as_bytes());
			hasher.update(payload);

			Ok(hasher.finalize().to_vec())
		}
	}

	/// Device certificate with a fixed thumbprint and issuer.
	#[derive(Clone, Debug)]
	pub struct FakeDeviceCertificate {
		/// Thumbprint reported to challenges.
		pub thumbprint: String,
		/// Issuer matched against `CertAuthorities`.
		pub issuer: String,
	}
	impl DeviceCertificateProvider for FakeDeviceCertificate {
		fn thumbprint(&self) -> String {
			self.thumbprint.clone()
		}

		fn is_valid_issuer(&self, authorities: &[String]) -> bool {
			authorities.iter().any(|authority| authority.eq_ignore_ascii_case(&self.issuer))
		}

		fn sign_challenge(&self, claims: &PKeyAuthClaims) -> Result<String> {
			Ok(format!("signed.{}.{}", claims.nonce, claims.aud))
		}
	}

	/// Authorization surface that immediately "lands" on a fixed redirect URI.
	#[derive(Clone, Debug)]
	pub struct RedirectingAuthorizationStrategy {
		/// Redirect URI reported back, query included.
		pub redirect: String,
		/// Authorize URLs the surface was asked to show.
		pub shown: Arc<Mutex<Vec<Url>>>,
	}
	impl RedirectingAuthorizationStrategy {
		/// Reports `redirect` for every request.
		pub fn new(redirect: impl Into<String>) -> Self {
			Self { redirect: redirect.into(), shown: Default::default() }
		}
	}
	impl AuthorizationStrategy for RedirectingAuthorizationStrategy {
		fn request_authorization<'a>(
			&'a self,
			url: Url,
			_: &'a AuthorizationRequest,
		) -> AuthorizationFuture<'a> {
			Box::pin(async move {
				self.shown.lock().push(url);

				Ok(RawAuthorizationResult::from_redirect_uri(&self.redirect))
			})
		}
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
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
