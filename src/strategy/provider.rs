//! Provider capability seam consumed by [`OAuth2Strategy`](crate::strategy::OAuth2Strategy).
//!
//! A provider maps between the crate's typed records and one identity service's wire dialect.
//! Hooks are synchronous; every network call stays in the orchestrator.

// self
use crate::{
	_prelude::*,
	account::Account,
	authorize::AuthorizationResultFactory,
	cache::CacheRecord,
	clock::ClockSkewManager,
	config::StsConfiguration,
	error::{ClientError, ClientErrorKind},
	http::HttpResponse,
	protocol::{
		AuthenticationScheme, AuthorizationRequest, AuthorizationResponse, GrantType, TokenRequest,
		TokenResponse, TokenResult, TokenSecret,
	},
	sts::{DeviceCertificateProvider, DevicePopManager},
};

/// Read-only view of the strategy state handed to provider hooks.
#[derive(Clone, Copy)]
pub struct ProviderContext<'a> {
	/// Strategy configuration.
	pub config: &'a StsConfiguration,
	/// Token endpoint currently in effect.
	pub token_endpoint: &'a Url,
	/// Clock skew tracker.
	pub clock: &'a ClockSkewManager,
	/// Device key manager, when `pop` tokens are enabled.
	pub pop_manager: Option<&'a dyn DevicePopManager>,
	/// Device certificate, when PKeyAuth answers are enabled.
	pub certificate_provider: Option<&'a dyn DeviceCertificateProvider>,
}
impl Debug for ProviderContext<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ProviderContext")
			.field("authority", &self.config.authority.as_str())
			.field("token_endpoint", &self.token_endpoint.as_str())
			.finish()
	}
}

/// Credentials of a refresh or ROPC token request.
#[derive(Clone, Debug)]
pub enum TokenGrant {
	/// Redeem a refresh token.
	RefreshToken(TokenSecret),
	/// Resource owner password credentials.
	Password {
		/// User name.
		username: String,
		/// Password.
		password: TokenSecret,
	},
}

/// Identity-service dialect plugged into the orchestrator.
pub trait OAuth2Provider
where
	Self: Send + Sync,
{
	/// Rejects authorization requests the service would refuse.
	fn validate_authorization_request(&self, request: &AuthorizationRequest) -> Result<()> {
		if request.client_id.is_empty() {
			return Err(invalid_request("authorization request requires a client_id"));
		}
		if request.redirect_uri.is_empty() {
			return Err(invalid_request("authorization request requires a redirect_uri"));
		}

		Ok(())
	}

	/// Rejects token requests missing the credential their grant needs.
	fn validate_token_request(&self, request: &TokenRequest) -> Result<()> {
		if request.client_id.is_empty() {
			return Err(invalid_request("token request requires a client_id"));
		}

		let missing = match request.grant_type {
			GrantType::AuthorizationCode => request.code.is_none().then_some("code"),
			GrantType::RefreshToken => request.refresh_token.is_none().then_some("refresh_token"),
			GrantType::Password => (request.username.is_none() || request.password.is_none())
				.then_some("username and password"),
			GrantType::DeviceCode => request.device_code.is_none().then_some("device_code"),
			GrantType::ClientCredentials | GrantType::JwtBearer => None,
		};

		match missing {
			Some(field) => Err(invalid_request(format!(
				"{} token request requires {field}",
				request.grant_type
			))),
			None => Ok(()),
		}
	}

	/// Builds the token request redeeming an authorization response.
	fn create_token_request(
		&self,
		ctx: ProviderContext<'_>,
		request: &AuthorizationRequest,
		response: &AuthorizationResponse,
	) -> Result<TokenRequest>;

	/// Builds a refresh-token or ROPC token request.
	fn create_grant_request(
		&self,
		ctx: ProviderContext<'_>,
		client_id: &str,
		grant: TokenGrant,
		scope: Option<String>,
		scheme: &AuthenticationScheme,
	) -> Result<TokenRequest>;

	/// Flattens `request` into the form POSTed to the token endpoint.
	fn encode_token_request(
		&self,
		ctx: ProviderContext<'_>,
		request: &TokenRequest,
	) -> Result<Vec<(String, String)>> {
		let _ = ctx;

		Ok(request.form_pairs())
	}

	/// Unwraps a successful response body before it is parsed as JSON.
	fn decode_success_body(&self, body: &[u8]) -> Result<Vec<u8>> {
		Ok(body.to_vec())
	}

	/// Maps the raw token endpoint answer to a result; error statuses become error payloads.
	fn token_result_from_http_response(
		&self,
		ctx: ProviderContext<'_>,
		response: &HttpResponse,
	) -> Result<TokenResult>;

	/// Checks a successful result against the request that produced it.
	fn validate_token_response(&self, request: &TokenRequest, result: &TokenResult) -> Result<()>;

	/// Returns `true` when `record` may be served for `scheme`.
	fn validate_cached_result(
		&self,
		ctx: ProviderContext<'_>,
		scheme: &AuthenticationScheme,
		record: &CacheRecord,
	) -> bool;

	/// Builds the account the tokens in `response` belong to.
	fn create_account(&self, ctx: ProviderContext<'_>, response: &TokenResponse) -> Result<Account>;

	/// Answers a `WWW-Authenticate` challenge with an `Authorization` header value.
	///
	/// `None` means the challenge is not handled and the original response stands.
	fn challenge_response_header(
		&self,
		ctx: ProviderContext<'_>,
		challenge: &str,
	) -> Result<Option<String>> {
		let _ = (ctx, challenge);

		Ok(None)
	}

	/// Factory turning raw authorization signals into results.
	fn result_factory(&self) -> AuthorizationResultFactory {
		AuthorizationResultFactory
	}
}

fn invalid_request(message: impl Into<String>) -> Error {
	ClientError::new(ClientErrorKind::InvalidRequest, message).into()
}
