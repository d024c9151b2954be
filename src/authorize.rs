//! Interactive authorization: the external UI seam and the raw completion signal it reports.
//!
//! The crate never renders UI. An [`AuthorizationStrategy`] receives the fully built authorize
//! URL, runs whatever surface the host application owns, and resolves to a
//! [`RawAuthorizationResult`]. The [`AuthorizationResultFactory`] then turns that signal into a
//! typed [`AuthorizationResult`](crate::protocol::AuthorizationResult).

pub mod factory;

pub use factory::*;

// self
use crate::{
	_prelude::*,
	error::{ClientError, ClientErrorKind},
	protocol::{AuthorizationRequest, query_parameters},
};

/// Boxed future returned by [`AuthorizationStrategy::request_authorization`].
pub type AuthorizationFuture<'a> =
	Pin<Box<dyn Future<Output = Result<RawAuthorizationResult>> + 'a + Send>>;

/// Host-owned authorization surface (browser, embedded web view, test double).
pub trait AuthorizationStrategy
where
	Self: Send + Sync,
{
	/// Presents `url` and resolves once the surface reports a completion signal.
	fn request_authorization<'a>(
		&'a self,
		url: Url,
		request: &'a AuthorizationRequest,
	) -> AuthorizationFuture<'a>;
}

/// Completion signal reported by an authorization surface.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResultCode {
	/// The user cancelled, or the session was abandoned to continue elsewhere.
	Cancelled,
	/// The SDK cancelled because a newer interactive request started.
	SdkCancelled,
	/// The surface reached the redirect URI, which may still carry a server error.
	Completed,
	/// A client-side failure unrelated to the OAuth exchange.
	NonOAuthError,
	/// A broker app installation was started.
	BrokerInstallationTriggered,
	/// Workplace join is required before authorization can continue.
	DeviceRegistrationRequired,
	/// Device management enrollment was started.
	MdmFlow,
	/// A code this crate does not know.
	Unknown(String),
}
impl ResultCode {
	/// Maps the numeric completion codes used by platform surfaces.
	pub fn from_code(code: i32) -> Self {
		match code {
			2001 => ResultCode::Cancelled,
			2002 => ResultCode::NonOAuthError,
			2003 => ResultCode::Completed,
			2006 => ResultCode::BrokerInstallationTriggered,
			2007 => ResultCode::DeviceRegistrationRequired,
			2008 => ResultCode::SdkCancelled,
			2009 => ResultCode::MdmFlow,
			other => ResultCode::Unknown(other.to_string()),
		}
	}
}
impl Display for ResultCode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			ResultCode::Cancelled => f.write_str("CANCELLED"),
			ResultCode::SdkCancelled => f.write_str("SDK_CANCELLED"),
			ResultCode::Completed => f.write_str("COMPLETED"),
			ResultCode::NonOAuthError => f.write_str("NON_OAUTH_ERROR"),
			ResultCode::BrokerInstallationTriggered => f.write_str("BROKER_INSTALLATION_TRIGGERED"),
			ResultCode::DeviceRegistrationRequired => f.write_str("DEVICE_REGISTRATION_REQUIRED"),
			ResultCode::MdmFlow => f.write_str("MDM_FLOW"),
			ResultCode::Unknown(code) => f.write_str(code),
		}
	}
}

/// Client-side failure reported alongside [`ResultCode::NonOAuthError`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NonOAuthError {
	/// Stable error code.
	pub error_code: String,
	/// Human-readable message.
	pub message: String,
}
impl From<&ClientError> for NonOAuthError {
	fn from(e: &ClientError) -> Self {
		Self { error_code: e.code().into(), message: e.message.clone() }
	}
}

/// Raw output of an authorization surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawAuthorizationResult {
	/// Completion signal.
	pub code: ResultCode,
	/// Final URI the surface landed on.
	pub redirect_uri: Option<Url>,
	/// Client-side failure, for [`ResultCode::NonOAuthError`].
	pub exception: Option<NonOAuthError>,
}
impl RawAuthorizationResult {
	/// Scheme used by broker and device-registration redirects.
	pub const BROKER_REDIRECT_SCHEME: &'static str = "msauth";
	/// Host of the device-registration redirect.
	pub const DEVICE_REGISTRATION_HOST: &'static str = "wpj";
	/// Query parameter carrying the broker store link.
	pub const APP_LINK: &'static str = "app_link";
	/// Error sub-code sent when the user pressed cancel on the server page.
	pub const SUB_ERROR_UI_CANCEL: &'static str = "cancel";

	/// A signal without a URI or failure.
	pub fn from_result_code(code: ResultCode) -> Self {
		Self { code, redirect_uri: None, exception: None }
	}

	/// A client-side failure.
	pub fn from_error(error: NonOAuthError) -> Self {
		Self { code: ResultCode::NonOAuthError, redirect_uri: None, exception: Some(error) }
	}

	/// Classifies the final URI the surface landed on.
	///
	/// Broker-install and device-registration redirects are recognized by their `msauth` shape,
	/// a server-side cancel by `error_subcode=cancel`; everything else is
	/// [`ResultCode::Completed`]. An unparsable URI becomes a `malformed_url` failure.
	pub fn from_redirect_uri(redirect_uri: &str) -> Self {
		let url = match Url::parse(redirect_uri) {
			Ok(url) => url,
			Err(e) => {
				let error = ClientError::with_source(
					ClientErrorKind::MalformedUrl,
					"failed to parse redirect URL",
					e,
				);

				return Self::from_error(NonOAuthError::from(&error));
			},
		};
		let code = classify_redirect(&url);

		Self { code, redirect_uri: Some(url), exception: None }
	}
}

fn classify_redirect(url: &Url) -> ResultCode {
	let parameters = query_parameters(url);

	if url.scheme().eq_ignore_ascii_case(RawAuthorizationResult::BROKER_REDIRECT_SCHEME) {
		if parameters.contains_key(RawAuthorizationResult::APP_LINK) {
			return ResultCode::BrokerInstallationTriggered;
		}
		if url
			.host_str()
			.is_some_and(|h| h.eq_ignore_ascii_case(RawAuthorizationResult::DEVICE_REGISTRATION_HOST))
		{
			return ResultCode::DeviceRegistrationRequired;
		}
	}
	if parameters
		.get(crate::protocol::params::ERROR_SUBCODE)
		.is_some_and(|v| v.eq_ignore_ascii_case(RawAuthorizationResult::SUB_ERROR_UI_CANCEL))
	{
		return ResultCode::Cancelled;
	}

	ResultCode::Completed
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn numeric_codes_map_to_signals() {
		assert_eq!(ResultCode::from_code(2001), ResultCode::Cancelled);
		assert_eq!(ResultCode::from_code(2008), ResultCode::SdkCancelled);
		assert_eq!(ResultCode::from_code(2009), ResultCode::MdmFlow);
		assert_eq!(ResultCode::from_code(42), ResultCode::Unknown("42".into()));
	}

	#[test]
	fn redirect_classification_recognizes_special_flows() {
		let install = RawAuthorizationResult::from_redirect_uri(
			"msauth://com.example.app/hash?username=a%40b.com&app_link=https%3A%2F%2Fstore",
		);
		let wpj = RawAuthorizationResult::from_redirect_uri("msauth://wpj/?username=a%40b.com");
		let cancel =
			RawAuthorizationResult::from_redirect_uri("https://x/cb?error=access_denied&error_subcode=cancel");
		let done = RawAuthorizationResult::from_redirect_uri("https://x/cb?code=ABC123&state=S1");

		assert_eq!(install.code, ResultCode::BrokerInstallationTriggered);
		assert_eq!(wpj.code, ResultCode::DeviceRegistrationRequired);
		assert_eq!(cancel.code, ResultCode::Cancelled);
		assert_eq!(done.code, ResultCode::Completed);
		assert!(done.redirect_uri.is_some());
	}

	#[test]
	fn unparsable_redirect_becomes_client_failure() {
		let raw = RawAuthorizationResult::from_redirect_uri("not a uri");

		assert_eq!(raw.code, ResultCode::NonOAuthError);
		assert_eq!(raw.exception.map(|e| e.error_code), Some("malformed_url".into()));
	}
}
