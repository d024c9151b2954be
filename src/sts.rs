//! Microsoft STS (Entra ID) providers.
//!
//! [`MicrosoftStsProvider`] speaks the plain v2.0 token endpoint dialect: PKCE code redemption,
//! device code, refresh, ROPC, proof-of-possession binding, PKeyAuth answers, CliTelem and CCS
//! diagnostics. [`MicrosoftStsJweProvider`] wraps it with a signed request envelope and encrypted
//! responses keyed by a session key.

pub mod jwe;
pub mod pkeyauth;
pub mod pop;

pub use jwe::*;
pub use pkeyauth::*;
pub use pop::*;

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	account::Account,
	cache::CacheRecord,
	config::StsConfiguration,
	error::{ClientError, ClientErrorKind},
	http::{self, HttpResponse},
	protocol::{
		AuthenticationScheme, AuthorizationRequest, AuthorizationResponse, CliTelemInfo, GrantType,
		TokenErrorResponse, TokenRequest, TokenResponse, TokenResult, TokenSecret, X_MS_CLITELEM,
	},
	strategy::{OAuth2Provider, OAuth2Strategy, ProviderContext, StrategyParameters, TokenGrant},
};

/// Scope of the PRT claims-update resource, which is answered without an access token.
pub const PRT_UPDATE_SCOPE: &str = "urn:aad:tb:update:prt/.default";
/// Header carrying the CCS request id.
pub const XMS_CCS_REQUEST_ID: &str = "xms-ccs-request-id";
/// Header carrying the CCS request sequence.
pub const XMS_CCS_REQUEST_SEQUENCE: &str = "xms-ccs-request-sequence";

/// Microsoft STS v2.0 dialect.
#[derive(Clone, Copy, Debug, Default)]
pub struct MicrosoftStsProvider;
impl OAuth2Provider for MicrosoftStsProvider {
	fn create_token_request(
		&self,
		ctx: ProviderContext<'_>,
		request: &AuthorizationRequest,
		response: &AuthorizationResponse,
	) -> Result<TokenRequest> {
		let mut token = TokenRequest::new(GrantType::AuthorizationCode, &request.client_id);

		token.redirect_uri = Some(request.redirect_uri.clone());
		token.scope = request.scope.clone();
		token.claims = request.claims.clone();
		token.correlation_id = request.correlation_id.clone();
		token.client_info = true;
		token.pkey_auth_header_allowed = ctx.certificate_provider.is_some();

		match response.device_code.as_ref() {
			Some(device_code) => {
				token.grant_type = GrantType::DeviceCode;
				token.device_code = Some(TokenSecret::new(device_code.device_code.clone()));
			},
			None => {
				token.code = response.code.clone().map(TokenSecret::new);
				token.code_verifier =
					request.pkce.as_ref().map(|pkce| TokenSecret::new(pkce.code_verifier()));
			},
		}

		bind_scheme(ctx, &mut token, &request.authentication_scheme)?;

		Ok(token)
	}

	fn create_grant_request(
		&self,
		ctx: ProviderContext<'_>,
		client_id: &str,
		grant: TokenGrant,
		scope: Option<String>,
		scheme: &AuthenticationScheme,
	) -> Result<TokenRequest> {
		let mut token = match grant {
			TokenGrant::RefreshToken(refresh_token) => {
				let mut token = TokenRequest::new(GrantType::RefreshToken, client_id);

				token.refresh_token = Some(refresh_token);

				token
			},
			TokenGrant::Password { username, password } => {
				if scheme.is_pop() {
					return Err(ClientError::new(
						ClientErrorKind::UnsupportedPopRequest,
						"proof-of-possession is not supported for username/password requests",
					)
					.into());
				}

				let mut token = TokenRequest::new(GrantType::Password, client_id);

				token.username = Some(username);
				token.password = Some(password);

				token
			},
		};

		token.scope = scope;
		token.client_info = true;
		token.pkey_auth_header_allowed = ctx.certificate_provider.is_some();

		bind_scheme(ctx, &mut token, scheme)?;

		Ok(token)
	}

	fn token_result_from_http_response(
		&self,
		ctx: ProviderContext<'_>,
		response: &HttpResponse,
	) -> Result<TokenResult> {
		token_result(ctx, response, &|body: &[u8]| self.decode_success_body(body))
	}

	fn validate_token_response(&self, request: &TokenRequest, result: &TokenResult) -> Result<()> {
		let Some(response) = result.success_response() else {
			return Ok(());
		};

		if let Some(expected) = request.token_type.as_deref() {
			let actual = response.token_type.as_deref().unwrap_or_default();

			if !expected.eq_ignore_ascii_case(actual) {
				return Err(ClientError::new(
					ClientErrorKind::AuthSchemeMismatch,
					format!("Expected: [{expected}]\nActual: [{actual}]"),
				)
				.into());
			}
		}

		let absent = |token: &Option<TokenSecret>| token.as_ref().is_none_or(TokenSecret::is_empty);
		let mut missing = Vec::new();

		if !request.scope.as_deref().unwrap_or_default().contains(PRT_UPDATE_SCOPE)
			&& absent(&response.access_token)
		{
			missing.push("access_token");
		}
		if request.grant_type != GrantType::ClientCredentials {
			if absent(&response.id_token) {
				missing.push("id_token");
			}
			if absent(&response.refresh_token) {
				missing.push("refresh_token");
			}
		}
		if !missing.is_empty() {
			return Err(ClientError::new(
				ClientErrorKind::TokensMissing,
				format!("Missing required tokens of type: {}", missing.join(", ")),
			)
			.into());
		}

		Ok(())
	}

	fn validate_cached_result(
		&self,
		ctx: ProviderContext<'_>,
		scheme: &AuthenticationScheme,
		record: &CacheRecord,
	) -> bool {
		match scheme {
			AuthenticationScheme::Bearer => true,
			AuthenticationScheme::Pop => ctx
				.pop_manager
				.and_then(|manager| manager.thumbprint())
				.filter(|thumbprint| !thumbprint.is_empty())
				.is_some_and(|thumbprint| record.kid.as_deref() == Some(thumbprint.as_str())),
			AuthenticationScheme::PopWithClientKey { kid, .. } =>
				record.kid.as_deref().is_some_and(|cached| cached.eq_ignore_ascii_case(kid)),
		}
	}

	fn create_account(&self, ctx: ProviderContext<'_>, response: &TokenResponse) -> Result<Account> {
		Account::from_token_parts(
			ctx.token_endpoint.host_str().unwrap_or_default(),
			response.id_token.as_ref().map(TokenSecret::expose),
			response.client_info.as_deref(),
		)
	}

	fn challenge_response_header(
		&self,
		ctx: ProviderContext<'_>,
		challenge: &str,
	) -> Result<Option<String>> {
		let challenge = PKeyAuthChallenge::parse(challenge, ctx.token_endpoint)?;
		let header =
			challenge.response_header(ctx.certificate_provider, ctx.clock.adjusted_reference_time())?;

		Ok(Some(header))
	}
}

impl OAuth2Strategy {
	/// Builds a strategy speaking the Microsoft STS v2.0 dialect.
	pub async fn microsoft_sts(config: StsConfiguration, params: StrategyParameters) -> Result<Self> {
		Self::new(config, Arc::new(MicrosoftStsProvider), params).await
	}

	/// Builds a strategy that signs requests and decrypts responses with `session_key`.
	pub async fn microsoft_sts_jwe(
		config: StsConfiguration,
		params: StrategyParameters,
		session_key: SessionKey,
	) -> Result<Self> {
		Self::new(config, Arc::new(MicrosoftStsJweProvider::new(session_key)), params).await
	}
}

fn bind_scheme(
	ctx: ProviderContext<'_>,
	token: &mut TokenRequest,
	scheme: &AuthenticationScheme,
) -> Result<()> {
	match scheme {
		AuthenticationScheme::Bearer => {},
		AuthenticationScheme::Pop => {
			let manager = ctx
				.pop_manager
				.ok_or_else(|| key_manager_error("proof-of-possession requires a device key manager"))?;

			manager.get_or_create_key()?;

			token.token_type = Some(AuthenticationScheme::POP.into());
			token.req_cnf = Some(manager.request_confirmation()?);
		},
		AuthenticationScheme::PopWithClientKey { req_cnf, .. } => {
			token.token_type = Some(AuthenticationScheme::POP.into());
			token.req_cnf = Some(req_cnf.clone());
		},
	}

	Ok(())
}

/// Maps a token endpoint answer to a [`TokenResult`].
///
/// Error statuses never fail: an unreadable error body becomes a synthesized error carrying the
/// status. Success bodies go through `decode` before parsing.
pub(crate) fn token_result(
	ctx: ProviderContext<'_>,
	response: &HttpResponse,
	decode: &dyn Fn(&[u8]) -> Result<Vec<u8>>,
) -> Result<TokenResult> {
	let status = response.status().as_u16();
	let cli_telem = http::header_value(response, X_MS_CLITELEM).and_then(CliTelemInfo::from_header);
	let mut result = if status >= 400 {
		let body = String::from_utf8_lossy(response.body()).into_owned();
		let json = if body.trim().is_empty() { "{}" } else { body.as_str() };
		let mut deserializer = serde_json::Deserializer::from_str(json);
		let error = serde_path_to_error::deserialize::<_, TokenErrorResponse>(&mut deserializer)
			.ok()
			.filter(|e| !e.error.is_empty())
			.unwrap_or_else(|| TokenErrorResponse::fallback(status));

		TokenResult::failure(error.with_http_details(status, body, http::headers_json(response)))
	} else {
		let body = decode(response.body())?;
		let mut deserializer = serde_json::Deserializer::from_slice(&body);
		let mut success: TokenResponse =
			serde_path_to_error::deserialize(&mut deserializer).map_err(ClientError::from)?;

		if let Some(info) = cli_telem.as_ref() {
			success.apply_cli_telem(info);
		}

		copy_ccs_header(ctx, response, &mut success);

		TokenResult::success(success)
	};

	result.set_cli_telem_info(cli_telem);

	Ok(result)
}

fn copy_ccs_header(ctx: ProviderContext<'_>, response: &HttpResponse, success: &mut TokenResponse) {
	for (enabled, name) in [
		(ctx.config.expose_ccs_request_id, XMS_CCS_REQUEST_ID),
		(ctx.config.expose_ccs_request_sequence, XMS_CCS_REQUEST_SEQUENCE),
	] {
		if let Some(value) = http::header_value(response, name).filter(|_| enabled) {
			success.extra.insert(name.into(), Value::String(value.into()));
		}
	}
}
