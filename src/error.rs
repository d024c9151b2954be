//! Client-level error types shared across strategies, discovery, and transports.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Client-side structural failure (bad URL, bad payload, failed validation).
	#[error(transparent)]
	Client(#[from] ClientError),
	/// Identity service answered with something unusable.
	#[error(transparent)]
	Service(#[from] ServiceError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Local configuration problem.
	#[error(transparent)]
	Configuration(#[from] crate::config::ConfigurationError),
	/// Token cache backend failure.
	#[error(transparent)]
	Cache(#[from] crate::cache::CacheError),
}
impl Error {
	/// Returns the discriminating client error kind, if this is a client failure.
	pub fn client_kind(&self) -> Option<ClientErrorKind> {
		match self {
			Error::Client(e) => Some(e.kind),
			_ => None,
		}
	}
}
impl From<url::ParseError> for Error {
	fn from(e: url::ParseError) -> Self {
		ClientError::from(e).into()
	}
}
impl From<oauth2::http::Error> for Error {
	fn from(e: oauth2::http::Error) -> Self {
		ClientError::from(e).into()
	}
}

/// Cause categories carried by [`ClientError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClientErrorKind {
	/// A URL could not be parsed or rebuilt.
	MalformedUrl,
	/// A value could not be encoded for the wire.
	UnsupportedEncoding,
	/// Token type returned by the service differs from the requested scheme.
	AuthSchemeMismatch,
	/// Token response lacks tokens the request requires.
	TokensMissing,
	/// A JSON payload could not be parsed.
	JsonParseFailure,
	/// A device certificate could not be encoded into a challenge response.
	CertificateEncoding,
	/// A PKeyAuth challenge is missing required fields.
	DeviceCertificateRequestInvalid,
	/// A JWE envelope is malformed or declares an unsupported algorithm.
	InvalidJwe,
	/// Authenticated decryption of a JWE payload failed.
	JweDecryption,
	/// The device key manager failed.
	KeyManager,
	/// Proof-of-possession was requested for a grant that cannot carry it.
	UnsupportedPopRequest,
	/// The HTTP request could not be assembled.
	InvalidRequest,
}
impl ClientErrorKind {
	/// Returns the stable error code for this kind.
	pub const fn code(self) -> &'static str {
		match self {
			ClientErrorKind::MalformedUrl => "malformed_url",
			ClientErrorKind::UnsupportedEncoding => "unsupported_encoding",
			ClientErrorKind::AuthSchemeMismatch => "auth_scheme_mismatch",
			ClientErrorKind::TokensMissing => "tokens_missing_from_response",
			ClientErrorKind::JsonParseFailure => "json_parse_failure",
			ClientErrorKind::CertificateEncoding => "certificate_encoding_error",
			ClientErrorKind::DeviceCertificateRequestInvalid =>
				"device_certificate_request_invalid",
			ClientErrorKind::InvalidJwe => "invalid_jwe",
			ClientErrorKind::JweDecryption => "jwe_decryption_failed",
			ClientErrorKind::KeyManager => "key_manager_failure",
			ClientErrorKind::UnsupportedPopRequest => "unsupported_pop_request",
			ClientErrorKind::InvalidRequest => "invalid_request",
		}
	}
}
impl Display for ClientErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.code())
	}
}

/// Structured client-side failure carrying a discriminating kind, a message, and the cause.
#[derive(Debug, ThisError)]
#[error("Client failure `{kind}`: {message}.")]
pub struct ClientError {
	/// Cause category.
	pub kind: ClientErrorKind,
	/// Human-readable description.
	pub message: String,
	/// Wrapped lower-level failure, when one exists.
	#[source]
	pub source: Option<BoxError>,
}
impl ClientError {
	/// Creates a client error without an underlying cause.
	pub fn new(kind: ClientErrorKind, message: impl Into<String>) -> Self {
		Self { kind, message: message.into(), source: None }
	}

	/// Creates a client error wrapping `src`.
	pub fn with_source(
		kind: ClientErrorKind,
		message: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self { kind, message: message.into(), source: Some(Box::new(src)) }
	}

	/// Returns the stable error code.
	pub fn code(&self) -> &'static str {
		self.kind.code()
	}
}
impl From<url::ParseError> for ClientError {
	fn from(e: url::ParseError) -> Self {
		let message = e.to_string();

		Self::with_source(ClientErrorKind::MalformedUrl, message, e)
	}
}
impl From<serde_path_to_error::Error<serde_json::Error>> for ClientError {
	fn from(e: serde_path_to_error::Error<serde_json::Error>) -> Self {
		let message = format!("unable to parse JSON at `{}`", e.path());

		Self::with_source(ClientErrorKind::JsonParseFailure, message, e)
	}
}
impl From<serde_json::Error> for ClientError {
	fn from(e: serde_json::Error) -> Self {
		let message = e.to_string();

		Self::with_source(ClientErrorKind::JsonParseFailure, message, e)
	}
}
impl From<oauth2::http::Error> for ClientError {
	fn from(e: oauth2::http::Error) -> Self {
		let message = e.to_string();

		Self::with_source(ClientErrorKind::InvalidRequest, message, e)
	}
}

/// Failures reported by the identity service itself.
#[derive(Debug, ThisError)]
pub enum ServiceError {
	/// OpenID discovery document could not be loaded.
	#[error("OpenID provider configuration failed to load from {url}: {reason}.")]
	OpenIdConfigurationLoad {
		/// Resolved well-known URL.
		url: String,
		/// HTTP status code, when a response arrived.
		status: Option<u16>,
		/// Short failure summary.
		reason: String,
		/// Parse failure, when the body was not a discovery document.
		#[source]
		source: Option<BoxError>,
	},
}
impl ServiceError {
	/// Stable error code for discovery load failures.
	pub const OPENID_CONFIGURATION_LOAD_FAILED: &'static str =
		"openid_provider_configuration_failed_to_load";

	/// Returns the stable error code.
	pub fn code(&self) -> &'static str {
		match self {
			ServiceError::OpenIdConfigurationLoad { .. } => Self::OPENID_CONFIGURATION_LOAD_FAILED,
		}
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the identity service.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the identity service.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn client_error_keeps_kind_and_source() {
		let parse = Url::parse("not a url").expect_err("Fixture should fail to parse.");
		let err: Error = parse.into();

		assert_eq!(err.client_kind(), Some(ClientErrorKind::MalformedUrl));

		let source = StdError::source(&err).expect("Client error should expose the URL parse failure as its source.");

		assert_eq!(source.to_string(), parse.to_string());
	}

	#[test]
	fn client_error_display_names_code() {
		let err = ClientError::new(ClientErrorKind::TokensMissing, "missing id_token");

		assert_eq!(err.code(), "tokens_missing_from_response");
		assert_eq!(err.to_string(), "Client failure `tokens_missing_from_response`: missing id_token.");
	}
}
