//! Provider-agnostic orchestration of authorization, token, and device-code requests.
//!
//! [`OAuth2Strategy`] owns every network call and all shared state. The identity-service dialect
//! is injected as an [`OAuth2Provider`]; see [`crate::sts`] for the Microsoft STS providers.

pub mod params;
pub mod provider;

pub use params::*;
pub use provider::*;

// crates.io
use oauth2::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	account::Account,
	authorize::AuthorizationStrategy,
	cache::CacheRecord,
	config::{Slice, StsConfiguration},
	discovery::{OpenIdProviderConfiguration, OpenIdProviderConfigurationClient},
	error::ClientError,
	http::{self, HttpResponse},
	obs::{self, FlowKind, FlowOutcome, FlowSpan, TelemetryEvent},
	protocol::{
		AuthenticationScheme, AuthorizationErrorResponse, AuthorizationRequest,
		AuthorizationResponse, AuthorizationResult, AuthorizationStatus, DeviceCode,
		QueryBuilder, TokenRequest, TokenResult, params as query_params,
	},
	sts::{PKEYAUTH_HEADER, PKEYAUTH_VERSION, PKeyAuthChallenge},
};

/// Orchestrates OAuth 2.0 requests against one authority.
///
/// The token endpoint is resolved once at construction and may later move to another cloud (see
/// [`OAuth2Strategy::create_token_request`]); concurrent moves are last-writer-wins.
pub struct OAuth2Strategy {
	config: StsConfiguration,
	provider: Arc<dyn OAuth2Provider>,
	params: StrategyParameters,
	token_endpoint: RwLock<Url>,
	discovery: Option<Arc<OpenIdProviderConfiguration>>,
}
impl OAuth2Strategy {
	/// Builds a strategy, loading the discovery document first when the configuration asks for it.
	///
	/// A discovery failure is logged and the static `{authority}/oAuth2/v2.0/token` endpoint is
	/// used instead.
	pub async fn new(
		config: StsConfiguration,
		provider: Arc<dyn OAuth2Provider>,
		params: StrategyParameters,
	) -> Result<Self> {
		let discovery =
			if config.use_openid_discovery { discover(&config, &params).await } else { None };
		let token_endpoint = match discovery.as_ref().and_then(|d| d.token_endpoint_url()) {
			Some(url) => url,
			None => {
				if config.use_openid_discovery {
					FlowSpan::new(FlowKind::Discovery, "token_endpoint")
						.warn("discovery has no token endpoint, using the static one");
				}

				config.token_endpoint()?
			},
		};
		let strategy = Self {
			token_endpoint: RwLock::new(token_endpoint.clone()),
			config,
			provider,
			params,
			discovery,
		};

		strategy.set_token_endpoint(token_endpoint);

		Ok(strategy)
	}

	/// Configuration the strategy was built with.
	pub fn config(&self) -> &StsConfiguration {
		&self.config
	}

	/// Injected collaborators.
	pub fn params(&self) -> &StrategyParameters {
		&self.params
	}

	/// Discovery document, when one was loaded.
	pub fn discovery(&self) -> Option<&OpenIdProviderConfiguration> {
		self.discovery.as_deref()
	}

	/// Token endpoint currently in effect, including slice parameters.
	pub fn token_endpoint(&self) -> Url {
		self.token_endpoint.read().clone()
	}

	/// Replaces the token endpoint, appending the configured slice parameters it lacks.
	pub fn set_token_endpoint(&self, endpoint: Url) {
		let mut builder = QueryBuilder::new(endpoint);

		if let Some(slice) = self.config.slice.as_ref() {
			builder.add_all_if_absent(slice.parameters());
		}

		*self.token_endpoint.write() = builder.build();
	}

	/// Runs interactive authorization through `surface`.
	pub async fn request_authorization(
		&self,
		request: &AuthorizationRequest,
		surface: &dyn AuthorizationStrategy,
	) -> Result<AuthorizationResult> {
		const KIND: FlowKind = FlowKind::Authorization;

		let span = FlowSpan::new(KIND, "request_authorization");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				self.provider.validate_authorization_request(request)?;

				let endpoint = match self.discovery.as_ref().and_then(|d| d.authorization_endpoint_url())
				{
					Some(url) => url,
					None => self.config.authorization_endpoint()?,
				};
				let url = request.to_url(&endpoint, Some(&self.config.platform));

				self.params
					.telemetry
					.emit(TelemetryEvent::UiShown { correlation_id: request.correlation_id.clone() });

				let raw = surface.request_authorization(url, request).await?;

				Ok(self.provider.result_factory().create_authorization_result(&raw, request))
			})
			.await;

		obs::record_result(KIND, result)
	}

	/// Builds the token request redeeming `response`.
	///
	/// With multiple-cloud support on, a `cloud_instance_host_name` in the response first moves the
	/// token endpoint to that host.
	pub fn create_token_request(
		&self,
		request: &AuthorizationRequest,
		response: &AuthorizationResponse,
	) -> Result<TokenRequest> {
		let cloud_host = response
			.cloud_instance_host_name
			.as_deref()
			.filter(|h| self.config.multiple_cloud_support && !h.is_empty());

		if let Some(host) = cloud_host {
			let mut endpoint = self.token_endpoint();

			if endpoint.host_str() != Some(host) {
				endpoint.set_host(Some(host))?;

				FlowSpan::new(FlowKind::Token, "cloud_redirect")
					.note(format_args!("token endpoint moved to cloud host {host}"));

				self.set_token_endpoint(endpoint);
			}
		}

		let endpoint = self.token_endpoint();

		self.provider.create_token_request(self.context(&endpoint), request, response)
	}

	/// Builds a refresh-token or ROPC token request.
	pub fn create_grant_request(
		&self,
		client_id: &str,
		grant: TokenGrant,
		scope: Option<String>,
		scheme: &AuthenticationScheme,
	) -> Result<TokenRequest> {
		let endpoint = self.token_endpoint();

		self.provider.create_grant_request(self.context(&endpoint), client_id, grant, scope, scheme)
	}

	/// POSTs `request` to the token endpoint and validates the answer.
	///
	/// The clock skew is recorded from every response `Date` header. A `401` PKeyAuth challenge
	/// is answered exactly once. Error statuses come back as a failed [`TokenResult`]; only
	/// transport and validation failures are `Err`.
	pub async fn request_token(&self, request: &TokenRequest) -> Result<TokenResult> {
		const KIND: FlowKind = FlowKind::Token;

		let span = FlowSpan::new(KIND, "request_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				self.provider.validate_token_request(request)?;

				let endpoint = self.token_endpoint();
				let ctx = self.context(&endpoint);
				let correlation_id =
					request.correlation_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

				span.correlation_id(&correlation_id);

				let form = self.provider.encode_token_request(ctx, request)?;
				let mut headers = self.request_headers(&correlation_id);

				if request.pkey_auth_header_allowed {
					set_header(&mut headers, PKEYAUTH_HEADER, PKEYAUTH_VERSION);
				}

				let mut response =
					self.post_token(&endpoint, &headers, &form, &correlation_id, request).await?;

				let answer = match pkeyauth_challenge(&response) {
					Some(challenge) => self.provider.challenge_response_header(ctx, challenge)?,
					None => None,
				};

				if let Some(answer) = answer {
					span.note("answering PKeyAuth challenge");
					self.params
						.telemetry
						.emit(TelemetryEvent::PKeyAuthChallenge { correlation_id: correlation_id.clone() });
					set_header(&mut headers, AUTHORIZATION.as_str(), &answer);
					set_header(&mut headers, PKEYAUTH_HEADER, PKEYAUTH_VERSION);

					response =
						self.post_token(&endpoint, &headers, &form, &correlation_id, request).await?;
				}

				let received_at = OffsetDateTime::now_utc();
				let mut result = self.provider.token_result_from_http_response(ctx, &response)?;

				if let Some(success) = result.success_response_mut() {
					success.authority = Some(endpoint.clone());
					success.response_received_time = Some(received_at);
				}
				if result.is_success() {
					self.provider.validate_token_response(request, &result)?;
				}

				Ok(result)
			})
			.await;

		obs::record_result(KIND, result)
	}

	/// Requests a device code for `request`'s client and scopes.
	///
	/// Any status below `300` is a success; everything else becomes a failed result carrying the
	/// server error.
	pub async fn request_device_code(
		&self,
		request: &AuthorizationRequest,
	) -> Result<AuthorizationResult> {
		const KIND: FlowKind = FlowKind::DeviceCode;

		let span = FlowSpan::new(KIND, "request_device_code");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let endpoint = match self
					.discovery
					.as_ref()
					.and_then(|d| d.device_authorization_endpoint_url())
				{
					Some(url) => url,
					None => self.config.device_authorization_endpoint()?,
				};
				let mut form = vec![(String::from("client_id"), request.client_id.clone())];

				if let Some(scope) = request.scope.as_ref() {
					form.push(("scope".into(), scope.clone()));
				}
				if let Some(claims) = request.claims.as_ref() {
					form.push(("claims".into(), claims.clone()));
				}

				let correlation_id =
					request.correlation_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

				span.correlation_id(&correlation_id);

				let mut headers = self.request_headers(&correlation_id);

				for (name, value) in &request.request_headers {
					set_header(&mut headers, name, value);
				}

				let http_request = http::form_post(&endpoint, &headers, &form)?;
				let response = self.params.http_client.execute(http_request).await?;

				device_code_result(&response)
			})
			.await;

		obs::record_result(KIND, result)
	}

	/// Returns `true` when `record` may be served for `scheme`.
	pub fn validate_cached_result(
		&self,
		scheme: &AuthenticationScheme,
		record: &CacheRecord,
	) -> bool {
		let endpoint = self.token_endpoint();

		self.provider.validate_cached_result(self.context(&endpoint), scheme, record)
	}

	/// Builds the account owning the tokens of a successful `result`.
	pub fn create_account(&self, result: &TokenResult) -> Result<Option<Account>> {
		let Some(response) = result.success_response() else {
			return Ok(None);
		};
		let endpoint = response.authority.clone().unwrap_or_else(|| self.token_endpoint());

		self.provider.create_account(self.context(&endpoint), response).map(Some)
	}

	/// Captures a successful `result` as a cache record keyed by its account.
	///
	/// For `pop` schemes the record remembers the key id the access token is bound to.
	pub fn cache_record(
		&self,
		client_id: &str,
		scheme: &AuthenticationScheme,
		result: &TokenResult,
	) -> Result<Option<CacheRecord>> {
		let (Some(account), Some(response)) = (self.create_account(result)?, result.success_response())
		else {
			return Ok(None);
		};
		let kid = match scheme {
			AuthenticationScheme::Bearer => None,
			AuthenticationScheme::Pop =>
				self.params.pop_manager.as_ref().and_then(|manager| manager.thumbprint()),
			AuthenticationScheme::PopWithClientKey { kid, .. } => Some(kid.clone()),
		};

		Ok(Some(CacheRecord::from_token_response(account, client_id, response, kid)))
	}

	fn context<'a>(&'a self, token_endpoint: &'a Url) -> ProviderContext<'a> {
		ProviderContext {
			config: &self.config,
			token_endpoint,
			clock: &self.params.clock,
			pop_manager: self.params.pop_manager.as_deref(),
			certificate_provider: self.params.certificate_provider.as_deref(),
		}
	}

	fn request_headers(&self, correlation_id: &str) -> Vec<(String, String)> {
		let mut headers = vec![(query_params::CLIENT_REQUEST_ID.to_owned(), correlation_id.to_owned())];

		headers.extend(self.config.platform.headers().into_iter().map(|(k, v)| (k.to_owned(), v)));
		headers.extend(self.params.telemetry_headers.telemetry_headers());

		headers
	}

	async fn post_token(
		&self,
		endpoint: &Url,
		headers: &[(String, String)],
		form: &[(String, String)],
		correlation_id: &str,
		request: &TokenRequest,
	) -> Result<HttpResponse> {
		let http_request = http::form_post(endpoint, headers, form)?;

		self.params.telemetry.emit(TelemetryEvent::TokenRequestSent {
			correlation_id: correlation_id.to_owned(),
			grant_type: request.grant_type.as_str().to_owned(),
		});

		let response = self.params.http_client.execute(http_request).await?;

		self.params.telemetry.emit(TelemetryEvent::TokenResponseReceived {
			correlation_id: correlation_id.to_owned(),
			status: response.status().as_u16(),
		});

		if let Some(server_time) = http::server_date(&response) {
			self.params.clock.on_timestamp_received(server_time);

			FlowSpan::new(FlowKind::Token, "clock_skew")
				.note(format_args!("clock skew is {} ms", self.params.clock.skew_millis()));
		}

		Ok(response)
	}
}
impl Debug for OAuth2Strategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuth2Strategy")
			.field("authority", &self.config.authority.as_str())
			.field("token_endpoint", &self.token_endpoint.read().as_str())
			.field("discovery", &self.discovery.is_some())
			.finish()
	}
}

async fn discover(
	config: &StsConfiguration,
	params: &StrategyParameters,
) -> Option<Arc<OpenIdProviderConfiguration>> {
	let client = OpenIdProviderConfigurationClient::new(
		params.http_client.clone(),
		params.discovery_cache.clone(),
	);
	let dc = config.slice.as_ref().and_then(|s| s.dc.as_deref()).filter(|dc| !dc.is_empty());
	let extra: Vec<(&str, &str)> = dc.map(|dc| (Slice::DC_PARAMETER, dc)).into_iter().collect();

	match client
		.load_from_authority_with_extra_params(&config.authority, config.authority_type, &extra)
		.await
	{
		Ok(document) => Some(document),
		Err(e) => {
			FlowSpan::new(FlowKind::Discovery, "fallback")
				.warn(format_args!("discovery failed, using static endpoints: {e}"));

			None
		},
	}
}

fn pkeyauth_challenge(response: &HttpResponse) -> Option<&str> {
	if response.status().as_u16() != 401 {
		return None;
	}

	http::header_value(response, WWW_AUTHENTICATE.as_str()).filter(|h| PKeyAuthChallenge::is_challenge(h))
}

fn device_code_result(response: &HttpResponse) -> Result<AuthorizationResult> {
	let status = response.status().as_u16();

	if status < 300 {
		let mut deserializer = serde_json::Deserializer::from_slice(response.body());
		let device_code: DeviceCode =
			serde_path_to_error::deserialize(&mut deserializer).map_err(ClientError::from)?;

		return Ok(AuthorizationResult::success(AuthorizationResponse::from_device_code(device_code)));
	}

	let error = serde_json::from_slice::<AuthorizationErrorResponse>(response.body())
		.ok()
		.filter(|e| !e.error.is_empty())
		.unwrap_or_else(|| {
			AuthorizationErrorResponse::new(
				status.to_string(),
				Some(format!("Received {status} status code from Server ")),
			)
		});

	Ok(AuthorizationResult::error(AuthorizationStatus::Fail, error))
}

fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
	match headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
		Some(slot) => slot.1 = value.to_owned(),
		None => headers.push((name.to_owned(), value.to_owned())),
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::StatusCode;
	// self
	use super::*;

	fn response(status: u16, body: &str) -> HttpResponse {
		let mut response = HttpResponse::new(body.as_bytes().to_vec());

		*response.status_mut() = StatusCode::from_u16(status).expect("Status fixture should be valid.");

		response
	}

	#[test]
	fn device_code_success_and_failure() {
		let ok = device_code_result(&response(
			200,
			r#"{"device_code":"dc","user_code":"UC","verification_uri":"https://microsoft.com/devicelogin","expires_in":900,"interval":5,"message":"Go"}"#,
		))
		.expect("Device code should parse.");
		let device_code = ok
			.response()
			.and_then(|r| r.device_code.as_ref())
			.expect("Success should carry the device code.");

		assert_eq!(device_code.user_code, "UC");
		assert_eq!(device_code.interval, Some(5));

		let failed = device_code_result(&response(
			400,
			r#"{"error":"invalid_scope","error_description":"bad scope"}"#,
		))
		.expect("Error body should become a result.");

		assert_eq!(failed.status(), AuthorizationStatus::Fail);
		assert_eq!(failed.error_response().map(|e| e.error.as_str()), Some("invalid_scope"));

		let garbage =
			device_code_result(&response(503, "<html/>")).expect("Garbage should become a result.");

		assert_eq!(garbage.error_response().map(|e| e.error.as_str()), Some("503"));
	}

	#[test]
	fn set_header_replaces_case_insensitively() {
		let mut headers = vec![("X-Ms-PKeyAuth".to_owned(), "0.9".to_owned())];

		set_header(&mut headers, PKEYAUTH_HEADER, PKEYAUTH_VERSION);
		set_header(&mut headers, "authorization", "PKeyAuth Context=\"c\",Version=\"1.0\"");

		assert_eq!(headers.len(), 2);
		assert_eq!(headers[0].1, "1.0");
	}

	#[test]
	fn only_unauthorized_pkeyauth_answers_are_challenges() {
		let mut challenged = response(401, "");

		challenged.headers_mut().insert(
			WWW_AUTHENTICATE,
			"PKeyAuth nonce=\"n\", Version=\"1.0\", Context=\"c\"".parse().expect("Header should parse."),
		);

		assert!(pkeyauth_challenge(&challenged).is_some());

		let mut bearer = response(401, "");

		bearer.headers_mut().insert(WWW_AUTHENTICATE, "Bearer realm=\"x\"".parse().expect("Header should parse."));

		assert!(pkeyauth_challenge(&bearer).is_none());
		assert!(pkeyauth_challenge(&response(400, "")).is_none());
	}
}
