//! Device proof-of-possession key seam.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{
	_prelude::*,
	error::{ClientError, ClientErrorKind},
};

/// Device-held asymmetric key used to bind `pop` access tokens.
///
/// Key creation is a single atomic operation: concurrent callers observe the same key.
pub trait DevicePopManager
where
	Self: Send + Sync,
{
	/// Returns the thumbprint of the device key, generating the key on first use.
	fn get_or_create_key(&self) -> Result<String>;

	/// Thumbprint of the current key, or `None` when no key exists yet.
	fn thumbprint(&self) -> Option<String>;

	/// `req_cnf` confirmation value advertising the current key.
	fn request_confirmation(&self) -> Result<String>;

	/// Signs `payload` with the device key, generating the key on first use.
	///
	/// The token pipeline only needs the thumbprint and `req_cnf`; hosts call this when they
	/// build signed HTTP requests proving possession of the bound key.
	fn sign(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

/// Encodes the `req_cnf` value `base64url({"kid": kid})`.
pub fn confirmation_for_kid(kid: &str) -> Result<String> {
	let json = serde_json::to_vec(&serde_json::json!({ "kid": kid })).map_err(ClientError::from)?;

	Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Wraps a key manager failure.
pub fn key_manager_error(message: impl Into<String>) -> Error {
	ClientError::new(ClientErrorKind::KeyManager, message).into()
}
