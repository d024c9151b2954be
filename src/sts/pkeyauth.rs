//! PKeyAuth device-certificate challenge handling.
//!
//! The token endpoint answers `401` with `WWW-Authenticate: PKeyAuth ...` when it wants proof that
//! the request comes from a registered device. The client answers once with an `Authorization`
//! header carrying a JWT signed by the device certificate, or with an empty response when no
//! matching certificate exists.

// crates.io
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	error::{ClientError, ClientErrorKind},
};

/// Scheme prefix of the challenge and response headers.
pub const PKEYAUTH: &str = "PKeyAuth";
/// Header advertising PKeyAuth support on token requests.
pub const PKEYAUTH_HEADER: &str = "x-ms-PKeyAuth";
/// Protocol version sent in [`PKEYAUTH_HEADER`].
pub const PKEYAUTH_VERSION: &str = "1.0";

/// Device certificate able to answer PKeyAuth challenges.
pub trait DeviceCertificateProvider
where
	Self: Send + Sync,
{
	/// Thumbprint of the device certificate.
	fn thumbprint(&self) -> String;

	/// Returns `true` when the certificate was issued by one of `authorities`.
	fn is_valid_issuer(&self, authorities: &[String]) -> bool;

	/// Signs the challenge response JWT.
	fn sign_challenge(&self, claims: &PKeyAuthClaims) -> Result<String>;
}

/// Claims of the challenge response JWT.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PKeyAuthClaims {
	/// Submit URL of the challenge.
	pub aud: String,
	/// Server nonce.
	pub nonce: String,
	/// Issue time in seconds since the epoch.
	pub iat: i64,
}

/// Parsed PKeyAuth challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PKeyAuthChallenge {
	/// Server nonce.
	pub nonce: String,
	/// Opaque server context echoed in the response.
	pub context: String,
	/// Protocol version echoed in the response.
	pub version: String,
	/// Accepted certificate issuers.
	pub cert_authorities: Vec<String>,
	/// Required certificate thumbprint.
	pub thumbprint: Option<String>,
	/// URL the response is submitted to.
	pub submit_url: String,
}
impl PKeyAuthChallenge {
	/// Returns `true` when `header` is a PKeyAuth challenge.
	pub fn is_challenge(header: &str) -> bool {
		header.trim_start().starts_with(PKEYAUTH)
	}

	/// Parses a `WWW-Authenticate` challenge received from `submit_url`.
	pub fn parse(header: &str, submit_url: &Url) -> Result<Self> {
		let body = header.trim_start().strip_prefix(PKEYAUTH).ok_or_else(|| {
			invalid(format!("challenge header does not start with {PKEYAUTH}"))
		})?;
		let mut fields = HashMap::new();

		for pair in split_with_quotes(body, ',') {
			let parts = split_with_quotes(&pair, '=');
			let (key, value) = match parts.as_slice() {
				[key] => (key.as_str(), ""),
				[key, value] => (key.as_str(), value.as_str()),
				_ => return Err(invalid(format!("challenge pair is malformed: {pair}"))),
			};

			fields.insert(clean(key), clean(value));
		}

		let nonce = fields.get("nonce").or_else(|| fields.get("Nonce")).cloned();
		let version = fields.get("Version").cloned();
		let context = fields.get("Context").cloned();
		let (nonce, version, context) = match (nonce, version, context) {
			(Some(nonce), Some(version), Some(context)) => (nonce, version, context),
			_ => return Err(invalid("challenge lacks nonce, Version, or Context")),
		};
		let cert_authorities: Vec<String> = fields
			.get("CertAuthorities")
			.map(|raw| raw.split(';').filter(|s| !s.is_empty()).map(str::to_owned).collect())
			.unwrap_or_default();
		let thumbprint = fields.get("CertThumbprint").filter(|t| !t.is_empty()).cloned();

		if thumbprint.is_none() && cert_authorities.is_empty() {
			return Err(invalid("challenge lacks CertAuthorities or CertThumbprint"));
		}

		Ok(Self {
			nonce,
			context,
			version,
			cert_authorities,
			thumbprint,
			submit_url: submit_url.to_string(),
		})
	}

	/// Builds the `Authorization` header answering this challenge.
	///
	/// Without a matching certificate the header still echoes the context, which lets the server
	/// continue without device authentication.
	pub fn response_header(
		&self,
		certificate: Option<&dyn DeviceCertificateProvider>,
		issued_at: OffsetDateTime,
	) -> Result<String> {
		let certificate = certificate.filter(|c| self.matches(*c));
		let Some(certificate) = certificate else {
			return Ok(format!(
				"{PKEYAUTH} Context=\"{}\",Version=\"{}\"",
				self.context, self.version
			));
		};
		let claims = PKeyAuthClaims {
			aud: self.submit_url.clone(),
			nonce: self.nonce.clone(),
			iat: issued_at.unix_timestamp(),
		};
		let token = certificate.sign_challenge(&claims).map_err(|e| {
			ClientError::with_source(
				ClientErrorKind::CertificateEncoding,
				"device certificate failed to sign the challenge",
				e,
			)
		})?;

		Ok(format!(
			"{PKEYAUTH} AuthToken=\"{token}\",Context=\"{}\",Version=\"{}\"",
			self.context, self.version
		))
	}

	fn matches(&self, certificate: &dyn DeviceCertificateProvider) -> bool {
		match &self.thumbprint {
			Some(thumbprint) => certificate.thumbprint().eq_ignore_ascii_case(thumbprint),
			None => certificate.is_valid_issuer(&self.cert_authorities),
		}
	}
}

fn split_with_quotes(input: &str, delimiter: char) -> Vec<String> {
	let mut parts = Vec::new();
	let mut current = String::new();
	let mut quoted = false;

	for c in input.chars() {
		match c {
			'"' => {
				quoted = !quoted;

				current.push(c);
			},
			c if c == delimiter && !quoted => parts.push(std::mem::take(&mut current)),
			c => current.push(c),
		}
	}

	parts.push(current);
	parts.retain(|p| !p.trim().is_empty());

	parts
}

fn clean(raw: &str) -> String {
	let escaped = raw.replace('&', "%26");
	let decoded = form_urlencoded::parse(format!("_={escaped}").as_bytes())
		.next()
		.map(|(_, v)| v.into_owned())
		.unwrap_or_default();
	let trimmed = decoded.trim();

	trimmed
		.strip_prefix('"')
		.and_then(|v| v.strip_suffix('"'))
		.unwrap_or(trimmed)
		.trim()
		.to_owned()
}

fn invalid(message: impl Into<String>) -> Error {
	ClientError::new(ClientErrorKind::DeviceCertificateRequestInvalid, message).into()
}
