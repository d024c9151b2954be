//! Authorization request, redirect response, and typed authorization results.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
// self
use crate::{
	_prelude::*,
	config::{PlatformInfo, Slice},
	pkce::PkceChallenge,
	protocol::{AuthenticationScheme, QueryBuilder},
};

const STATE_ENTROPY_BYTES: usize = 32;

/// Redirect and request parameter names.
pub mod params {
	/// Authorization code.
	pub const CODE: &str = "code";
	/// Opaque state echoed by the server.
	pub const STATE: &str = "state";
	/// OAuth error code.
	pub const ERROR: &str = "error";
	/// Microsoft error sub-code.
	pub const ERROR_SUBCODE: &str = "error_subcode";
	/// OAuth error description.
	pub const ERROR_DESCRIPTION: &str = "error_description";
	/// Username hint returned when workplace join is required.
	pub const UPN_TO_WPJ: &str = "username";
	/// Cloud the account lives in, returned for multi-cloud requests.
	pub const CLOUD_INSTANCE_HOST_NAME: &str = "cloud_instance_host_name";
	/// Base64url `{uid, utid}` profile blob.
	pub const CLIENT_INFO: &str = "client_info";
	/// Asks the server to report the account's cloud.
	pub const INSTANCE_AWARE: &str = "instance_aware";
	/// Hides the account switcher when a login hint is present.
	pub const HIDE_SWITCH_USER: &str = "hsu";
	/// Correlation id header and query parameter.
	pub const CLIENT_REQUEST_ID: &str = "client-request-id";
}

/// Interactive authorization request.
///
/// `state` must come back unchanged in the redirect; the result factory rejects anything else.
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
	/// `response_type`, `code` unless overridden.
	pub response_type: String,
	/// Application (client) id.
	pub client_id: String,
	/// Redirect URI registered for the application.
	pub redirect_uri: String,
	/// Opaque anti-forgery value.
	pub state: String,
	/// Space-delimited scopes.
	pub scope: Option<String>,
	/// Claims request JSON.
	pub claims: Option<String>,
	/// PKCE pair; the challenge goes on the URL, the verifier waits for the token exchange.
	pub pkce: Option<PkceChallenge>,
	/// Correlation id sent as `client-request-id`.
	pub correlation_id: Option<String>,
	/// `login_hint`.
	pub login_hint: Option<String>,
	/// `prompt` (`select_account`, `login`, `consent`).
	pub prompt: Option<String>,
	/// Object id of the signed-in user (`login_req`).
	pub uid: Option<String>,
	/// Tenant id of the signed-in user (`domain_req`).
	pub utid: Option<String>,
	/// Whether `instance_aware=true` is sent.
	pub instance_aware: bool,
	/// Slice routing hints.
	pub slice: Option<Slice>,
	/// Flight parameters, appended after the extra query parameters.
	pub flight_parameters: Vec<(String, String)>,
	/// Caller-supplied extra query parameters.
	pub extra_query_parameters: Vec<(String, String)>,
	/// Headers the authorization surface should send with the first navigation.
	pub request_headers: Vec<(String, String)>,
	/// Token binding requested for the eventual access token.
	pub authentication_scheme: AuthenticationScheme,
}
impl AuthorizationRequest {
	/// Default `response_type`.
	pub const RESPONSE_TYPE_CODE: &'static str = "code";

	/// Creates a new builder for the provided client.
	pub fn builder(
		client_id: impl Into<String>,
		redirect_uri: impl Into<String>,
	) -> AuthorizationRequestBuilder {
		AuthorizationRequestBuilder::new(client_id, redirect_uri)
	}

	/// Builds the authorize URL on top of `endpoint`.
	///
	/// Parameters already present on `endpoint` are never duplicated.
	pub fn to_url(&self, endpoint: &Url, platform: Option<&PlatformInfo>) -> Url {
		let mut builder = QueryBuilder::new(endpoint.clone());

		builder.add_if_absent("response_type", &self.response_type);
		builder.add_if_absent("client_id", &self.client_id);
		builder.add_if_absent("redirect_uri", &self.redirect_uri);
		builder.add_if_absent(params::STATE, &self.state);

		if let Some(scope) = self.scope.as_deref() {
			builder.add_if_absent("scope", scope);
		}
		if let Some(claims) = self.claims.as_deref() {
			builder.add_if_absent("claims", claims);
		}
		if let Some(pkce) = self.pkce.as_ref() {
			builder.add_if_absent("code_challenge", pkce.code_challenge());
			builder.add_if_absent("code_challenge_method", pkce.code_challenge_method().as_str());
		}
		if let Some(login_hint) = self.login_hint.as_deref() {
			builder.add_if_absent("login_hint", login_hint);
		}
		if let Some(prompt) = self.prompt.as_deref() {
			builder.add_if_absent("prompt", prompt);
		}
		if let Some(uid) = self.uid.as_deref() {
			builder.add_if_absent("login_req", uid);
		}
		if let Some(utid) = self.utid.as_deref() {
			builder.add_if_absent("domain_req", utid);
		}
		if let Some(correlation_id) = self.correlation_id.as_deref() {
			builder.add_if_absent(params::CLIENT_REQUEST_ID, correlation_id);
		}
		if let Some(platform) = platform {
			for (name, value) in platform.client_parameters() {
				builder.add_if_absent(name, &value);
			}
		}
		if self.instance_aware {
			builder.add_if_absent(params::INSTANCE_AWARE, "true");
		}

		builder.add_all_if_absent(
			self.extra_query_parameters.iter().map(|(k, v)| (k.as_str(), v.as_str())),
		);
		builder.add_all_if_absent(
			self.flight_parameters.iter().map(|(k, v)| (k.as_str(), v.as_str())),
		);

		if let Some(slice) = self.slice.as_ref() {
			builder.add_all_if_absent(slice.parameters());
		}
		if self.login_hint.as_deref().is_some_and(|hint| !hint.is_empty()) {
			builder.add_if_absent(params::HIDE_SWITCH_USER, "1");
		}

		builder.build()
	}
}

/// Builder for [`AuthorizationRequest`] values.
#[derive(Debug)]
pub struct AuthorizationRequestBuilder {
	request: AuthorizationRequest,
	state: Option<String>,
}
impl AuthorizationRequestBuilder {
	/// Creates a builder with `response_type=code`, a fresh PKCE pair, and no scopes.
	pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
		Self {
			request: AuthorizationRequest {
				response_type: AuthorizationRequest::RESPONSE_TYPE_CODE.into(),
				client_id: client_id.into(),
				redirect_uri: redirect_uri.into(),
				state: String::new(),
				scope: None,
				claims: None,
				pkce: Some(PkceChallenge::new_challenge()),
				correlation_id: None,
				login_hint: None,
				prompt: None,
				uid: None,
				utid: None,
				instance_aware: false,
				slice: None,
				flight_parameters: Vec::new(),
				extra_query_parameters: Vec::new(),
				request_headers: Vec::new(),
				authentication_scheme: AuthenticationScheme::Bearer,
			},
			state: None,
		}
	}

	/// Overrides `response_type`.
	pub fn response_type(mut self, response_type: impl Into<String>) -> Self {
		self.request.response_type = response_type.into();

		self
	}

	/// Pins the state value instead of generating one.
	pub fn state(mut self, state: impl Into<String>) -> Self {
		self.state = Some(state.into());

		self
	}

	/// Sets the space-delimited scope string.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.request.scope = Some(scope.into());

		self
	}

	/// Sets the claims request JSON.
	pub fn claims(mut self, claims: impl Into<String>) -> Self {
		self.request.claims = Some(claims.into());

		self
	}

	/// Replaces the generated PKCE pair.
	pub fn pkce(mut self, pkce: PkceChallenge) -> Self {
		self.request.pkce = Some(pkce);

		self
	}

	/// Sets the correlation id.
	pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
		self.request.correlation_id = Some(correlation_id.into());

		self
	}

	/// Sets `login_hint`.
	pub fn login_hint(mut self, login_hint: impl Into<String>) -> Self {
		self.request.login_hint = Some(login_hint.into());

		self
	}

	/// Sets `prompt`.
	pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
		self.request.prompt = Some(prompt.into());

		self
	}

	/// Sets the signed-in user's object and tenant ids.
	pub fn user(mut self, uid: impl Into<String>, utid: impl Into<String>) -> Self {
		self.request.uid = Some(uid.into());
		self.request.utid = Some(utid.into());

		self
	}

	/// Toggles `instance_aware`.
	pub fn instance_aware(mut self, instance_aware: bool) -> Self {
		self.request.instance_aware = instance_aware;

		self
	}

	/// Sets slice routing hints.
	pub fn slice(mut self, slice: Slice) -> Self {
		self.request.slice = Some(slice);

		self
	}

	/// Appends a flight parameter.
	pub fn flight_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.request.flight_parameters.push((name.into(), value.into()));

		self
	}

	/// Appends an extra query parameter.
	pub fn extra_query_parameter(
		mut self,
		name: impl Into<String>,
		value: impl Into<String>,
	) -> Self {
		self.request.extra_query_parameters.push((name.into(), value.into()));

		self
	}

	/// Appends a request header for the authorization surface.
	pub fn request_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.request.request_headers.push((name.into(), value.into()));

		self
	}

	/// Sets the token binding for the eventual access token.
	pub fn authentication_scheme(mut self, scheme: AuthenticationScheme) -> Self {
		self.request.authentication_scheme = scheme;

		self
	}

	/// Finishes the request, generating a random state when none was pinned.
	pub fn build(self) -> AuthorizationRequest {
		let Self { mut request, state } = self;

		request.state = state.unwrap_or_else(generate_state);

		request
	}
}

/// Device authorization details returned by the device code endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCode {
	/// Code the client polls the token endpoint with.
	pub device_code: String,
	/// Code the user types on the verification page.
	pub user_code: String,
	/// Verification page.
	#[serde(alias = "verification_url")]
	pub verification_uri: String,
	/// Lifetime in seconds.
	pub expires_in: i64,
	/// Minimum polling interval in seconds.
	#[serde(default)]
	pub interval: Option<i64>,
	/// Human-readable instructions.
	#[serde(default)]
	pub message: Option<String>,
}

/// Successful authorization payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthorizationResponse {
	/// Authorization code.
	pub code: Option<String>,
	/// State echoed by the server.
	pub state: Option<String>,
	/// Cloud host the account lives in.
	pub cloud_instance_host_name: Option<String>,
	/// Base64url `{uid, utid}` profile blob.
	pub client_info: Option<String>,
	/// Device authorization details, for the device code flow.
	pub device_code: Option<DeviceCode>,
	/// Every redirect parameter as received.
	pub parameters: BTreeMap<String, String>,
}
impl AuthorizationResponse {
	/// Builds a response from redirect query parameters.
	pub fn from_parameters(parameters: BTreeMap<String, String>) -> Self {
		Self {
			code: parameters.get(params::CODE).cloned(),
			state: parameters.get(params::STATE).cloned(),
			cloud_instance_host_name: parameters.get(params::CLOUD_INSTANCE_HOST_NAME).cloned(),
			client_info: parameters.get(params::CLIENT_INFO).cloned(),
			device_code: None,
			parameters,
		}
	}

	/// Wraps device authorization details.
	pub fn from_device_code(device_code: DeviceCode) -> Self {
		Self { device_code: Some(device_code), ..Self::default() }
	}
}

/// Typed authorization failure.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationErrorResponse {
	/// Stable error code.
	pub error: String,
	/// Human-readable description.
	#[serde(default)]
	pub error_description: Option<String>,
	/// Microsoft error sub-code.
	#[serde(default)]
	pub error_subcode: Option<String>,
	/// Username to use for workplace join, when the server asks for it.
	#[serde(default)]
	pub upn_to_wpj: Option<String>,
}
impl AuthorizationErrorResponse {
	/// State was missing or did not match.
	pub const STATE_MISMATCH: &'static str = "state_mismatch";
	/// Description used when the redirect carries no state.
	pub const STATE_NOT_RETURNED: &'static str = "State is not returned";
	/// Description used when the redirect state differs from the request state.
	pub const STATE_NOT_THE_SAME: &'static str = "State is not the same";
	/// The redirect could not be interpreted.
	pub const AUTHORIZATION_FAILED: &'static str = "authorization_failed";
	/// Description used for unusable redirects.
	pub const INVALID_SERVER_RESPONSE: &'static str =
		"The authorization server returned an invalid response";
	/// The user dismissed the authorization surface.
	pub const USER_CANCELLED: &'static str = "user_cancelled";
	/// Description used for user cancellation.
	pub const USER_CANCELLED_FLOW: &'static str = "User cancelled the flow";
	/// The SDK abandoned the authorization surface.
	pub const SDK_CANCELLED: &'static str = "auth_cancelled_by_sdk";
	/// Description used for SDK cancellation.
	pub const SDK_CANCELLED_FLOW: &'static str = "SDK cancelled the authorization flow";
	/// A broker app must be installed first.
	pub const BROKER_NEEDS_TO_BE_INSTALLED: &'static str = "broker_needs_to_be_installed";
	/// The device must be registered first.
	pub const DEVICE_REGISTRATION_NEEDED: &'static str = "device_registration_needed";
	/// The device must be managed first.
	pub const DEVICE_NEEDS_TO_BE_MANAGED: &'static str = "device_needs_to_be_managed";
	/// Description used when a broker installation was started.
	pub const BROKER_NEEDS_TO_BE_INSTALLED_DESCRIPTION: &'static str =
		"Device needs to have broker installed";
	/// Description used when device registration is required.
	pub const DEVICE_REGISTRATION_NEEDED_DESCRIPTION: &'static str =
		"Device needs to be registered to access the resource";
	/// Description used when device management is required.
	pub const DEVICE_NEEDS_TO_BE_MANAGED_DESCRIPTION: &'static str =
		"Device needs to be managed to access the resource";
	/// The completion code was not recognized.
	pub const UNKNOWN_ERROR: &'static str = "unknown_error";
	/// Description prefix for unrecognized completion codes.
	pub const UNKNOWN_RESULT_CODE: &'static str = "Unknown result code returned ";

	/// Creates an error with a description.
	pub fn new(error: impl Into<String>, error_description: Option<String>) -> Self {
		Self { error: error.into(), error_description, ..Self::default() }
	}

	/// Sets the error sub-code.
	pub fn with_subcode(mut self, error_subcode: Option<String>) -> Self {
		self.error_subcode = error_subcode;

		self
	}

	/// Sets the workplace-join username hint.
	pub fn with_upn_to_wpj(mut self, upn: Option<String>) -> Self {
		self.upn_to_wpj = upn;

		self
	}
}

/// Status tag of an [`AuthorizationResult`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthorizationStatus {
	/// An authorization code (or device code) was obtained.
	Success,
	/// The server or the client reported an error.
	Fail,
	/// The user cancelled.
	UserCancel,
	/// The SDK cancelled.
	SdkCancel,
	/// A broker installation was started.
	BrokerInstallationTriggered,
	/// Device registration is required.
	DeviceRegistrationRequired,
	/// Device management (MDM) is required.
	MdmFlow,
}
impl AuthorizationStatus {
	/// Returns a stable label.
	pub const fn as_str(self) -> &'static str {
		match self {
			AuthorizationStatus::Success => "success",
			AuthorizationStatus::Fail => "fail",
			AuthorizationStatus::UserCancel => "user_cancel",
			AuthorizationStatus::SdkCancel => "sdk_cancel",
			AuthorizationStatus::BrokerInstallationTriggered => "broker_installation_triggered",
			AuthorizationStatus::DeviceRegistrationRequired => "device_registration_required",
			AuthorizationStatus::MdmFlow => "mdm_flow",
		}
	}
}
impl Display for AuthorizationStatus {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum AuthorizationPayload {
	Response(AuthorizationResponse),
	Error(AuthorizationErrorResponse),
}

/// Outcome of an authorization attempt: a status tag plus exactly one payload.
///
/// A [`AuthorizationStatus::Success`] result always carries a response; every other status
/// carries an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationResult {
	status: AuthorizationStatus,
	payload: AuthorizationPayload,
}
impl AuthorizationResult {
	/// Wraps a successful response.
	pub fn success(response: AuthorizationResponse) -> Self {
		let payload = AuthorizationPayload::Response(response);

		Self { status: AuthorizationStatus::Success, payload }
	}

	/// Wraps an error under `status`; a `Success` tag is downgraded to `Fail`.
	pub fn error(status: AuthorizationStatus, error: AuthorizationErrorResponse) -> Self {
		let status = match status {
			AuthorizationStatus::Success => AuthorizationStatus::Fail,
			other => other,
		};

		Self { status, payload: AuthorizationPayload::Error(error) }
	}

	/// Status tag.
	pub fn status(&self) -> AuthorizationStatus {
		self.status
	}

	/// Returns `true` for successful results.
	pub fn is_success(&self) -> bool {
		self.status == AuthorizationStatus::Success
	}

	/// Successful payload, when present.
	pub fn response(&self) -> Option<&AuthorizationResponse> {
		match &self.payload {
			AuthorizationPayload::Response(response) => Some(response),
			AuthorizationPayload::Error(_) => None,
		}
	}

	/// Error payload, when present.
	pub fn error_response(&self) -> Option<&AuthorizationErrorResponse> {
		match &self.payload {
			AuthorizationPayload::Response(_) => None,
			AuthorizationPayload::Error(error) => Some(error),
		}
	}

	/// Splits the result into its payload.
	pub fn into_response(self) -> Result<AuthorizationResponse, AuthorizationErrorResponse> {
		match self.payload {
			AuthorizationPayload::Response(response) => Ok(response),
			AuthorizationPayload::Error(error) => Err(error),
		}
	}
}

fn generate_state() -> String {
	let mut entropy = [0_u8; STATE_ENTROPY_BYTES];

	rand::rng().fill(&mut entropy);

	URL_SAFE_NO_PAD.encode(entropy)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn endpoint() -> Url {
		Url::parse("https://login.microsoftonline.com/common/oAuth2/v2.0/authorize")
			.expect("Authorize endpoint fixture should parse.")
	}

	#[test]
	fn builder_defaults_to_code_and_random_state() {
		let first = AuthorizationRequest::builder("client", "https://app/cb").build();
		let second = AuthorizationRequest::builder("client", "https://app/cb").build();

		assert_eq!(first.response_type, "code");
		assert!(!first.state.is_empty());
		assert_ne!(first.state, second.state);
		assert!(first.pkce.is_some());
	}

	#[test]
	fn authorize_url_carries_protocol_and_provider_parameters() {
		let request = AuthorizationRequest::builder("client", "https://app/cb")
			.state("S1")
			.scope("openid profile")
			.login_hint("user@contoso.com")
			.prompt("select_account")
			.user("uid-1", "utid-1")
			.instance_aware(true)
			.correlation_id("corr-1")
			.slice(Slice { slice: Some("testslice".into()), dc: Some("ESTS-PUB".into()) })
			.flight_parameter("dc", "ignored")
			.extra_query_parameter("domain_hint", "contoso.com")
			.build();
		let url = request.to_url(&endpoint(), Some(&PlatformInfo::default()));
		let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
		let get = |name: &str| pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str());

		assert_eq!(get("response_type"), Some("code"));
		assert_eq!(get("state"), Some("S1"));
		assert_eq!(get("scope"), Some("openid profile"));
		assert_eq!(get("code_challenge_method"), Some("S256"));
		assert_eq!(get("login_req"), Some("uid-1"));
		assert_eq!(get("domain_req"), Some("utid-1"));
		assert_eq!(get("client-request-id"), Some("corr-1"));
		assert_eq!(get("instance_aware"), Some("true"));
		assert_eq!(get("domain_hint"), Some("contoso.com"));
		assert_eq!(get("slice"), Some("testslice"));
		assert_eq!(get("dc"), Some("ignored"));
		assert_eq!(get("hsu"), Some("1"));
		assert_eq!(pairs.iter().filter(|(k, _)| k == "dc").count(), 1);
		assert!(get("x-client-SKU").is_some());
	}

	#[test]
	fn result_keeps_exactly_one_payload() {
		let ok = AuthorizationResult::success(AuthorizationResponse::default());

		assert!(ok.is_success());
		assert!(ok.response().is_some());
		assert!(ok.error_response().is_none());

		let err = AuthorizationResult::error(
			AuthorizationStatus::Success,
			AuthorizationErrorResponse::new("x", None),
		);

		assert_eq!(err.status(), AuthorizationStatus::Fail);
		assert!(err.response().is_none());
		assert_eq!(err.error_response().map(|e| e.error.as_str()), Some("x"));
	}
}
