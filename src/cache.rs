//! Token cache contract and the built-in in-memory implementation.
//!
//! Only the contract lives here; persistent backends are left to the host application.

pub mod memory;

pub use memory::MemoryTokenCache;

// self
use crate::{
	_prelude::*,
	account::Account,
	protocol::{TokenResponse, TokenSecret},
};

/// Boxed future returned by [`TokenCache`] operations.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + 'a + Send>>;

/// Storage contract for token records.
pub trait TokenCache
where
	Self: Send + Sync,
{
	/// Persists or replaces the record stored under its key.
	fn save(&self, record: CacheRecord) -> CacheFuture<'_, ()>;

	/// Loads the record stored under `key`, if present.
	fn load<'a>(&'a self, key: &'a CacheKey) -> CacheFuture<'a, Option<CacheRecord>>;

	/// Removes and returns the record stored under `key`.
	fn remove<'a>(&'a self, key: &'a CacheKey) -> CacheFuture<'a, Option<CacheRecord>>;
}

/// Error type produced by [`TokenCache`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CacheError {
	/// Record could not be encoded or decoded by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Identity of a cached record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
	/// `uid.utid` of the account.
	pub home_account_id: String,
	/// Client the tokens were issued to.
	pub client_id: String,
	/// Host of the issuing token endpoint.
	pub environment: String,
	/// Tenant the tokens were issued in.
	pub realm: Option<String>,
}
impl CacheKey {
	/// Key of `account`'s tokens for `client_id`.
	pub fn for_account(account: &Account, client_id: impl Into<String>) -> Self {
		Self {
			home_account_id: account.home_account_id.clone(),
			client_id: client_id.into(),
			environment: account.environment.clone(),
			realm: account.realm.clone(),
		}
	}
}

/// Tokens cached for one account and client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
	/// Record identity.
	pub key: CacheKey,
	/// Account the tokens belong to.
	pub account: Account,
	/// Access token.
	pub access_token: Option<TokenSecret>,
	/// Token type the access token was issued as.
	pub token_type: Option<String>,
	/// Key id the access token is bound to, for proof-of-possession tokens.
	pub kid: Option<String>,
	/// Refresh token.
	pub refresh_token: Option<TokenSecret>,
	/// Id token.
	pub id_token: Option<TokenSecret>,
	/// Granted scopes.
	pub scope: Option<String>,
	/// FOCI family id.
	pub family_id: Option<String>,
	/// Access token expiry.
	#[serde(with = "time::serde::rfc3339::option")]
	pub expires_on: Option<OffsetDateTime>,
}
impl CacheRecord {
	/// Captures the tokens of `response` for `account`.
	///
	/// `kid` is the key id the access token was bound to, if any.
	pub fn from_token_response(
		account: Account,
		client_id: impl Into<String>,
		response: &TokenResponse,
		kid: Option<String>,
	) -> Self {
		Self {
			key: CacheKey::for_account(&account, client_id),
			account,
			access_token: response.access_token.clone(),
			token_type: response.token_type.clone(),
			kid,
			refresh_token: response.refresh_token.clone(),
			id_token: response.id_token.clone(),
			scope: response.scope.clone(),
			family_id: response.family_id.clone(),
			expires_on: response.expires_at(),
		}
	}

	/// Returns `true` when the access token expires before `now`.
	pub fn is_expired(&self, now: OffsetDateTime) -> bool {
		self.expires_on.is_some_and(|expires_on| expires_on <= now)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn cache_error_converts_into_crate_error() {
		let cache_error = CacheError::Backend { message: "disk unavailable".into() };
		let err: Error = cache_error.clone().into();

		assert!(matches!(err, Error::Cache(_)));
		assert!(err.to_string().contains("disk unavailable"));
	}

	#[test]
	fn record_captures_response_tokens() {
		let account = Account::from_token_parts("login.example.com", None, Some("eyJ1aWQiOiJ1IiwidXRpZCI6InQifQ"))
			.expect("Account fixture should build.");
		let response = TokenResponse {
			access_token: Some(TokenSecret::new("at")),
			token_type: Some("pop".into()),
			expires_in: Some(60),
			response_received_time: Some(OffsetDateTime::UNIX_EPOCH),
			..TokenResponse::default()
		};
		let record = CacheRecord::from_token_response(account, "client", &response, Some("kid".into()));

		assert_eq!(record.key.home_account_id, "u.t");
		assert_eq!(record.key.environment, "login.example.com");
		assert_eq!(record.kid.as_deref(), Some("kid"));
		assert!(record.is_expired(OffsetDateTime::UNIX_EPOCH + Duration::seconds(60)));
		assert!(!record.is_expired(OffsetDateTime::UNIX_EPOCH + Duration::seconds(59)));
	}

	#[test]
	fn overflowing_lifetime_leaves_expiry_unset() {
		let account = Account::from_token_parts("login.example.com", None, Some("eyJ1aWQiOiJ1IiwidXRpZCI6InQifQ"))
			.expect("Account fixture should build.");
		let json = r#"{"access_token":"at","token_type":"Bearer","expires_in":"9223372036854775807"}"#;
		let mut response: TokenResponse = serde_json::from_str(json).expect("Response should parse.");

		response.response_received_time = Some(OffsetDateTime::UNIX_EPOCH);

		let record = CacheRecord::from_token_response(account, "client", &response, None);

		assert_eq!(response.expires_in, Some(i64::MAX));
		assert_eq!(record.expires_on, None);
	}
}
