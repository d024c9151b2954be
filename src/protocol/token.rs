//! Token request, token response, and token result records.

// crates.io
use serde::Deserializer;
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	protocol::{CliTelemInfo, GrantType, TokenSecret},
};

/// Grant parameters POSTed to the token endpoint.
///
/// Extension parameters keep their insertion order on the wire.
#[derive(Clone, Debug, Default)]
pub struct TokenRequest {
	/// `grant_type`.
	pub grant_type: GrantType,
	/// `client_id`.
	pub client_id: String,
	/// `redirect_uri`.
	pub redirect_uri: Option<String>,
	/// Space-delimited `scope`.
	pub scope: Option<String>,
	/// Claims request JSON.
	pub claims: Option<String>,
	/// Authorization code.
	pub code: Option<TokenSecret>,
	/// PKCE verifier matching the challenge sent during authorization.
	pub code_verifier: Option<TokenSecret>,
	/// Refresh token.
	pub refresh_token: Option<TokenSecret>,
	/// ROPC username.
	pub username: Option<String>,
	/// ROPC password.
	pub password: Option<TokenSecret>,
	/// Device code obtained from the device authorization endpoint.
	pub device_code: Option<TokenSecret>,
	/// Client assertion (signed JWT).
	pub client_assertion: Option<TokenSecret>,
	/// Client assertion type URN.
	pub client_assertion_type: Option<String>,
	/// Requested token type (`pop` for proof-of-possession).
	pub token_type: Option<String>,
	/// Proof-of-possession confirmation claim.
	pub req_cnf: Option<String>,
	/// Whether `client_info=1` is requested.
	pub client_info: bool,
	/// Correlation id sent as `client-request-id`; not part of the form.
	pub correlation_id: Option<String>,
	/// Whether the first POST already advertises `x-ms-PKeyAuth` support; not part of the form.
	pub pkey_auth_header_allowed: bool,
	extra_parameters: Vec<(String, String)>,
}
impl TokenRequest {
	/// Creates a request for `grant_type` on behalf of `client_id`.
	pub fn new(grant_type: GrantType, client_id: impl Into<String>) -> Self {
		Self { grant_type, client_id: client_id.into(), ..Self::default() }
	}

	/// Sets or replaces an extension parameter, keeping the original position on replace.
	pub fn set_extra_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
		let name = name.into();
		let value = value.into();

		match self.extra_parameters.iter_mut().find(|(k, _)| *k == name) {
			Some(slot) => slot.1 = value,
			None => self.extra_parameters.push((name, value)),
		}
	}

	/// Extension parameters in insertion order.
	pub fn extra_parameters(&self) -> &[(String, String)] {
		&self.extra_parameters
	}

	/// Flattens the request into form pairs: protocol fields first, then extensions.
	///
	/// An extension never overrides a protocol field of the same name.
	pub fn form_pairs(&self) -> Vec<(String, String)> {
		let mut pairs = Vec::new();
		let mut push = |name: &str, value: Option<&str>| {
			if let Some(value) = value {
				pairs.push((name.to_owned(), value.to_owned()));
			}
		};

		push("grant_type", Some(self.grant_type.as_str()));
		push("client_id", Some(&self.client_id));
		push("scope", self.scope.as_deref());
		push("code", self.code.as_ref().map(TokenSecret::expose));
		push("redirect_uri", self.redirect_uri.as_deref());
		push("code_verifier", self.code_verifier.as_ref().map(TokenSecret::expose));
		push("refresh_token", self.refresh_token.as_ref().map(TokenSecret::expose));
		push("username", self.username.as_deref());
		push("password", self.password.as_ref().map(TokenSecret::expose));
		push("device_code", self.device_code.as_ref().map(TokenSecret::expose));
		push("client_assertion_type", self.client_assertion_type.as_deref());
		push("client_assertion", self.client_assertion.as_ref().map(TokenSecret::expose));
		push("claims", self.claims.as_deref());
		push("token_type", self.token_type.as_deref());
		push("req_cnf", self.req_cnf.as_deref());
		push("client_info", self.client_info.then_some("1"));

		for (name, value) in &self.extra_parameters {
			if !pairs.iter().any(|(k, _)| k == name) {
				pairs.push((name.clone(), value.clone()));
			}
		}

		pairs
	}
}

/// Successful token endpoint payload.
///
/// Fields the crate does not model are kept in [`TokenResponse::extra`] so the response
/// round-trips losslessly.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
	/// Access token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub access_token: Option<TokenSecret>,
	/// Token type (`Bearer`, `pop`).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_type: Option<String>,
	/// Refresh token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
	/// OpenID Connect id token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<TokenSecret>,
	/// Access token lifetime in seconds.
	#[serde(default, deserialize_with = "lenient_i64", skip_serializing_if = "Option::is_none")]
	pub expires_in: Option<i64>,
	/// Extended access token lifetime in seconds.
	#[serde(default, deserialize_with = "lenient_i64", skip_serializing_if = "Option::is_none")]
	pub ext_expires_in: Option<i64>,
	/// Seconds after which a proactive refresh is advised.
	#[serde(default, deserialize_with = "lenient_i64", skip_serializing_if = "Option::is_none")]
	pub refresh_in: Option<i64>,
	/// Refresh token lifetime in seconds.
	#[serde(default, deserialize_with = "lenient_i64", skip_serializing_if = "Option::is_none")]
	pub refresh_token_expires_in: Option<i64>,
	/// Granted scopes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scope: Option<String>,
	/// Echoed state.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub state: Option<String>,
	/// Base64url `{uid, utid}` profile blob.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_info: Option<String>,
	/// Family of client ids the refresh token belongs to.
	#[serde(default, rename = "foci", skip_serializing_if = "Option::is_none")]
	pub family_id: Option<String>,
	/// Cloud host the account lives in.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cloud_instance_host_name: Option<String>,
	/// Encrypted session key.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_key_jwe: Option<String>,
	/// Token endpoint that issued this response.
	#[serde(skip)]
	pub authority: Option<Url>,
	/// Local time the response arrived.
	#[serde(skip)]
	pub response_received_time: Option<OffsetDateTime>,
	/// Service ring from `x-ms-clitelem`.
	#[serde(skip)]
	pub spe_ring: Option<String>,
	/// Refresh token age from `x-ms-clitelem`.
	#[serde(skip)]
	pub refresh_token_age: Option<String>,
	/// Server error code from `x-ms-clitelem`.
	#[serde(skip)]
	pub cli_telem_error_code: Option<String>,
	/// Server sub-error code from `x-ms-clitelem`.
	#[serde(skip)]
	pub cli_telem_sub_error_code: Option<String>,
	/// Unmodeled fields.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
impl TokenResponse {
	/// Copies CliTelem diagnostics onto the response.
	pub fn apply_cli_telem(&mut self, info: &CliTelemInfo) {
		self.spe_ring = Some(info.spe_ring.clone());
		self.refresh_token_age = Some(info.refresh_token_age.clone());
		self.cli_telem_error_code = Some(info.server_error_code.clone());
		self.cli_telem_sub_error_code = Some(info.server_sub_error_code.clone());
	}

	/// Access token expiry computed from `expires_in` and the receive time.
	///
	/// Lifetimes that overflow the representable date range yield `None`.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.response_received_time?.checked_add(Duration::seconds(self.expires_in?))
	}
}

/// Error payload returned by the token endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenErrorResponse {
	/// OAuth error code.
	#[serde(default)]
	pub error: String,
	/// Human-readable description.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_description: Option<String>,
	/// Documentation link.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_uri: Option<String>,
	/// Microsoft sub-error.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub suberror: Option<String>,
	/// Numeric service error codes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_codes: Option<Vec<i64>>,
	/// Server timestamp.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timestamp: Option<String>,
	/// Server trace id.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub trace_id: Option<String>,
	/// Server correlation id.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub correlation_id: Option<String>,
	/// Claims challenge.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub claims: Option<String>,
	/// HTTP status code.
	#[serde(skip)]
	pub status_code: Option<u16>,
	/// Raw response body.
	#[serde(skip)]
	pub response_body: Option<String>,
	/// Response headers as a JSON object of string arrays.
	#[serde(skip)]
	pub response_headers_json: Option<String>,
	/// Unmodeled fields.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
impl TokenErrorResponse {
	/// Synthesized error for bodies that are not a JSON error object.
	pub fn fallback(status: u16) -> Self {
		Self {
			error: status.to_string(),
			error_description: Some(format!("Received {status} status code from Server ")),
			..Self::default()
		}
	}

	/// Attaches HTTP diagnostics.
	pub fn with_http_details(mut self, status: u16, body: String, headers_json: String) -> Self {
		self.status_code = Some(status);
		self.response_body = Some(body);
		self.response_headers_json = Some(headers_json);

		self
	}
}

/// Outcome slot of a [`TokenResult`].
#[derive(Clone, Debug, PartialEq)]
pub enum TokenOutcome {
	/// Successful payload.
	Success(TokenResponse),
	/// Error payload.
	Failure(TokenErrorResponse),
}

/// Result of a token request: exactly one of a success or an error payload, plus diagnostics.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenResult {
	outcome: TokenOutcome,
	cli_telem_info: Option<CliTelemInfo>,
}
impl TokenResult {
	/// Wraps a successful response.
	pub fn success(response: TokenResponse) -> Self {
		Self { outcome: TokenOutcome::Success(response), cli_telem_info: None }
	}

	/// Wraps an error response.
	pub fn failure(error: TokenErrorResponse) -> Self {
		Self { outcome: TokenOutcome::Failure(error), cli_telem_info: None }
	}

	/// Builds a result from optional slots; a success response always wins over an error.
	///
	/// Returns `None` when both slots are empty.
	pub fn new(response: Option<TokenResponse>, error: Option<TokenErrorResponse>) -> Option<Self> {
		match (response, error) {
			(Some(response), _) => Some(Self::success(response)),
			(None, Some(error)) => Some(Self::failure(error)),
			(None, None) => None,
		}
	}

	/// Returns `true` when a success response is present.
	pub fn is_success(&self) -> bool {
		matches!(self.outcome, TokenOutcome::Success(_))
	}

	/// Successful payload, when present.
	pub fn success_response(&self) -> Option<&TokenResponse> {
		match &self.outcome {
			TokenOutcome::Success(response) => Some(response),
			TokenOutcome::Failure(_) => None,
		}
	}

	/// Mutable successful payload, when present.
	pub fn success_response_mut(&mut self) -> Option<&mut TokenResponse> {
		match &mut self.outcome {
			TokenOutcome::Success(response) => Some(response),
			TokenOutcome::Failure(_) => None,
		}
	}

	/// Error payload, when present.
	pub fn error_response(&self) -> Option<&TokenErrorResponse> {
		match &self.outcome {
			TokenOutcome::Success(_) => None,
			TokenOutcome::Failure(error) => Some(error),
		}
	}

	/// Mutable error payload, when present.
	pub fn error_response_mut(&mut self) -> Option<&mut TokenErrorResponse> {
		match &mut self.outcome {
			TokenOutcome::Success(_) => None,
			TokenOutcome::Failure(error) => Some(error),
		}
	}

	/// Server diagnostics parsed from `x-ms-clitelem`.
	pub fn cli_telem_info(&self) -> Option<&CliTelemInfo> {
		self.cli_telem_info.as_ref()
	}

	/// Records server diagnostics.
	pub fn set_cli_telem_info(&mut self, info: Option<CliTelemInfo>) {
		self.cli_telem_info = info;
	}

	/// Consumes the result.
	pub fn into_outcome(self) -> TokenOutcome {
		self.outcome
	}
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
	D: Deserializer<'de>,
{
	use serde::de::Error as _;

	match Option::<Value>::deserialize(deserializer)? {
		None | Some(Value::Null) => Ok(None),
		Some(Value::Number(n)) =>
			n.as_i64().map(Some).ok_or_else(|| D::Error::custom("lifetime out of range")),
		Some(Value::String(s)) if s.is_empty() => Ok(None),
		Some(Value::String(s)) => s.trim().parse().map(Some).map_err(D::Error::custom),
		Some(other) => Err(D::Error::custom(format!("expected integer seconds, got {other}"))),
	}
}
