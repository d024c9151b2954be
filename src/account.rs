//! Accounts derived from token responses.
//!
//! The `id_token` is decoded without signature verification: it arrives over TLS straight from
//! the token endpoint and only feeds local account bookkeeping.

// crates.io
use base64::{
	Engine as _,
	engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD},
};
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	error::{ClientError, ClientErrorKind},
};

/// Decoded `client_info` blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
	/// Object id of the user in the home tenant.
	pub uid: String,
	/// Home tenant id.
	pub utid: String,
}
impl ClientInfo {
	/// Decodes the base64url JSON `{uid, utid}` blob.
	pub fn decode(raw: &str) -> Result<Self> {
		let bytes = decode_segment(raw).ok_or_else(|| {
			ClientError::new(ClientErrorKind::UnsupportedEncoding, "client_info is not base64url")
		})?;
		let mut deserializer = serde_json::Deserializer::from_slice(&bytes);
		let info = serde_path_to_error::deserialize(&mut deserializer).map_err(ClientError::from)?;

		Ok(info)
	}

	/// `uid.utid`.
	pub fn home_account_id(&self) -> String {
		format!("{}.{}", self.uid, self.utid)
	}
}

/// Signed-in account as seen by this client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
	/// `uid.utid` from `client_info`, else `oid.tid` from the id token.
	pub home_account_id: String,
	/// Host of the token endpoint that issued the tokens.
	pub environment: String,
	/// Tenant the tokens were issued in (`tid`).
	pub realm: Option<String>,
	/// Object id in `realm` (`oid`).
	pub local_account_id: Option<String>,
	/// `preferred_username`.
	pub username: Option<String>,
	/// Display name.
	pub name: Option<String>,
	/// Decoded `client_info`, when the response carried one.
	pub client_info: Option<ClientInfo>,
	/// Raw id token claims.
	#[serde(default)]
	pub id_token_claims: Map<String, Value>,
}
impl Account {
	/// Builds an account from the raw `id_token` and `client_info` of a token response.
	pub fn from_token_parts(
		environment: impl Into<String>,
		id_token: Option<&str>,
		client_info: Option<&str>,
	) -> Result<Self> {
		let claims = id_token.map(decode_id_token).transpose()?.unwrap_or_default();
		let client_info = client_info.map(ClientInfo::decode).transpose()?;
		let claim = |name: &str| claims.get(name).and_then(Value::as_str).map(str::to_owned);
		let realm = claim("tid");
		let local_account_id = claim("oid");
		let home_account_id = match &client_info {
			Some(info) => info.home_account_id(),
			None => match (local_account_id.as_deref().or(claim("sub").as_deref()), &realm) {
				(Some(id), Some(tid)) => format!("{id}.{tid}"),
				(Some(id), None) => id.to_owned(),
				(None, _) =>
					return Err(ClientError::new(
						ClientErrorKind::TokensMissing,
						"account identity requires client_info or an id_token subject",
					)
					.into()),
			},
		};

		Ok(Self {
			home_account_id,
			environment: environment.into(),
			realm,
			local_account_id,
			username: claim("preferred_username").or_else(|| claim("upn")),
			name: claim("name"),
			client_info,
			id_token_claims: claims,
		})
	}
}

/// Decodes the payload segment of a compact JWT without verifying it.
pub fn decode_id_token(raw: &str) -> Result<Map<String, Value>> {
	let mut segments = raw.split('.');
	let payload = match (segments.next(), segments.next()) {
		(Some(_), Some(payload)) => payload,
		_ =>
			return Err(
				ClientError::new(ClientErrorKind::JsonParseFailure, "id_token is not a JWT").into()
			),
	};
	let bytes = decode_segment(payload).ok_or_else(|| {
		ClientError::new(ClientErrorKind::UnsupportedEncoding, "id_token payload is not base64url")
	})?;

	Ok(serde_json::from_slice(&bytes).map_err(ClientError::from)?)
}

fn decode_segment(raw: &str) -> Option<Vec<u8>> {
	let raw = raw.trim();

	URL_SAFE_NO_PAD.decode(raw.trim_end_matches('=')).or_else(|_| URL_SAFE.decode(raw)).ok()
}
