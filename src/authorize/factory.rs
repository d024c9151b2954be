//! Flat dispatch from a raw completion signal to a typed authorization result.

// self
use crate::{
	_prelude::*,
	authorize::{RawAuthorizationResult, ResultCode},
	obs::{FlowKind, FlowSpan},
	protocol::{
		AuthorizationErrorResponse as E, AuthorizationRequest, AuthorizationResponse,
		AuthorizationResult, AuthorizationStatus, params, query_parameters,
	},
};

/// Maps [`RawAuthorizationResult`]s to [`AuthorizationResult`]s.
///
/// Every branch ends in exactly one result; nothing is retried or deferred.
#[derive(Clone, Copy, Debug, Default)]
pub struct AuthorizationResultFactory;
impl AuthorizationResultFactory {
	/// Creates the typed result for `raw`, validating the returned state against `request`.
	pub fn create_authorization_result(
		&self,
		raw: &RawAuthorizationResult,
		request: &AuthorizationRequest,
	) -> AuthorizationResult {
		let span = FlowSpan::new(FlowKind::Authorization, "create_authorization_result");
		let url = raw.redirect_uri.as_ref();

		match &raw.code {
			ResultCode::Cancelled => {
				span.note("authorization was cancelled by the user");

				error(AuthorizationStatus::UserCancel, E::USER_CANCELLED, E::USER_CANCELLED_FLOW)
			},
			ResultCode::SdkCancelled => {
				span.note("authorization was cancelled by the sdk");

				error(AuthorizationStatus::SdkCancel, E::SDK_CANCELLED, E::SDK_CANCELLED_FLOW)
			},
			ResultCode::Completed => match url {
				Some(url) => self.parse_redirect_uri(url, &request.state),
				None => {
					span.warn("authorization completed without a redirect URI");

					invalid_response()
				},
			},
			ResultCode::NonOAuthError => match raw.exception.as_ref() {
				Some(e) => AuthorizationResult::error(
					AuthorizationStatus::Fail,
					E::new(&e.error_code, Some(e.message.clone())),
				),
				// No details: handled like a broker installation redirect.
				None => broker_installation(url),
			},
			ResultCode::BrokerInstallationTriggered => broker_installation(url),
			ResultCode::DeviceRegistrationRequired => special_flow(
				E::DEVICE_REGISTRATION_NEEDED,
				E::DEVICE_REGISTRATION_NEEDED_DESCRIPTION,
				url,
			),
			ResultCode::MdmFlow => error(
				AuthorizationStatus::Fail,
				E::DEVICE_NEEDS_TO_BE_MANAGED,
				E::DEVICE_NEEDS_TO_BE_MANAGED_DESCRIPTION,
			),
			ResultCode::Unknown(_) => unknown(&raw.code),
		}
	}

	/// Interprets the redirect URI query.
	///
	/// A `code` wins over an `error`; any other shape is an invalid server response.
	pub fn parse_redirect_uri(&self, redirect_uri: &Url, request_state: &str) -> AuthorizationResult {
		let parameters = query_parameters(redirect_uri);

		if parameters.is_empty() {
			return invalid_response();
		}
		if parameters.contains_key(params::CODE) {
			return validate_and_create(parameters, request_state);
		}
		if let Some(error) = parameters.get(params::ERROR) {
			let response = E::new(error, parameters.get(params::ERROR_DESCRIPTION).cloned())
				.with_subcode(parameters.get(params::ERROR_SUBCODE).cloned());

			return AuthorizationResult::error(AuthorizationStatus::Fail, response);
		}

		invalid_response()
	}
}

fn validate_and_create(parameters: BTreeMap<String, String>, request_state: &str) -> AuthorizationResult {
	let span = FlowSpan::new(FlowKind::Authorization, "validate_state");
	let returned = parameters.get(params::STATE).map(String::as_str).unwrap_or_default();

	if returned.is_empty() {
		span.warn("state was not returned in the redirect");

		return error(AuthorizationStatus::Fail, E::STATE_MISMATCH, E::STATE_NOT_RETURNED);
	}
	if request_state.is_empty() || request_state != returned {
		span.warn("state returned in the redirect differs from the request");

		return error(AuthorizationStatus::Fail, E::STATE_MISMATCH, E::STATE_NOT_THE_SAME);
	}

	AuthorizationResult::success(AuthorizationResponse::from_parameters(parameters))
}

fn broker_installation(url: Option<&Url>) -> AuthorizationResult {
	special_flow(E::BROKER_NEEDS_TO_BE_INSTALLED, E::BROKER_NEEDS_TO_BE_INSTALLED_DESCRIPTION, url)
}

fn special_flow(code: &str, description: &str, url: Option<&Url>) -> AuthorizationResult {
	let upn = url.and_then(|url| query_parameters(url).remove(params::UPN_TO_WPJ));

	AuthorizationResult::error(
		AuthorizationStatus::Fail,
		E::new(code, Some(description.into())).with_upn_to_wpj(upn),
	)
}

fn unknown(code: &ResultCode) -> AuthorizationResult {
	let description = format!("{}[{code}]", E::UNKNOWN_RESULT_CODE);

	AuthorizationResult::error(AuthorizationStatus::Fail, E::new(E::UNKNOWN_ERROR, Some(description)))
}

fn invalid_response() -> AuthorizationResult {
	error(AuthorizationStatus::Fail, E::AUTHORIZATION_FAILED, E::INVALID_SERVER_RESPONSE)
}

fn error(status: AuthorizationStatus, code: &str, description: &str) -> AuthorizationResult {
	AuthorizationResult::error(status, E::new(code, Some(description.into())))
}
