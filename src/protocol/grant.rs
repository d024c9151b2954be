//! `grant_type` values understood by the token endpoint.

// self
use crate::_prelude::*;

/// OAuth 2.0 grant types placed in `grant_type`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrantType {
	#[default]
	/// Authorization Code grant.
	#[serde(rename = "authorization_code")]
	AuthorizationCode,
	/// Refresh Token grant.
	#[serde(rename = "refresh_token")]
	RefreshToken,
	/// Resource Owner Password Credentials grant.
	#[serde(rename = "password")]
	Password,
	/// Client Credentials grant for app-only tokens.
	#[serde(rename = "client_credentials")]
	ClientCredentials,
	/// Device Authorization grant (RFC 8628).
	#[serde(rename = "urn:ietf:params:oauth:grant-type:device_code")]
	DeviceCode,
	/// JWT bearer assertion (RFC 7523), used by the signed request envelope.
	#[serde(rename = "urn:ietf:params:oauth:grant-type:jwt-bearer")]
	JwtBearer,
}
impl GrantType {
	/// Returns the identifier sent on the wire.
	pub fn as_str(self) -> &'static str {
		match self {
			GrantType::AuthorizationCode => "authorization_code",
			GrantType::RefreshToken => "refresh_token",
			GrantType::Password => "password",
			GrantType::ClientCredentials => "client_credentials",
			GrantType::DeviceCode => "urn:ietf:params:oauth:grant-type:device_code",
			GrantType::JwtBearer => "urn:ietf:params:oauth:grant-type:jwt-bearer",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Token binding requested for an access token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AuthenticationScheme {
	#[default]
	/// Plain bearer token.
	Bearer,
	/// Proof-of-possession bound to the device key managed by the platform.
	Pop,
	/// Proof-of-possession bound to a key the caller holds.
	PopWithClientKey {
		/// Confirmation claim (`req_cnf`) describing the caller key.
		req_cnf: String,
		/// Key id the issued token must carry.
		kid: String,
	},
}
impl AuthenticationScheme {
	/// Token type name used by proof-of-possession schemes.
	pub const POP: &'static str = "pop";

	/// Returns the `token_type` request value; bearer requests omit it.
	pub fn token_type(&self) -> Option<&'static str> {
		match self {
			AuthenticationScheme::Bearer => None,
			AuthenticationScheme::Pop | AuthenticationScheme::PopWithClientKey { .. } =>
				Some(Self::POP),
		}
	}

	/// Returns `true` for either proof-of-possession variant.
	pub fn is_pop(&self) -> bool {
		!matches!(self, AuthenticationScheme::Bearer)
	}
}
