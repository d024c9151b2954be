//! Transport primitives for token, device-code, and discovery calls.
//!
//! The module exposes [`HttpClient`], the only dependency the strategies have on an HTTP stack.
//! Requests and responses are the `http` crate types re-exported by `oauth2`, so custom
//! transports never need to depend on reqwest.

pub use oauth2::{HttpRequest, HttpResponse};

// std
use std::ops::Deref;
// crates.io
use oauth2::http::{
	HeaderValue, Method, Request,
	header::{CONTENT_TYPE, DATE},
};
use time::format_description::well_known::Rfc2822;
use url::form_urlencoded::Serializer;
// self
use crate::{_prelude::*, error::TransportError};

/// MIME type of every token and device-code POST.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Boxed future returned by [`HttpClient::execute`].
pub type HttpFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports.
///
/// Implementations must return every response they receive, including 4xx and 5xx answers;
/// only failures that prevent a response from arriving are reported as [`TransportError`].
pub trait HttpClient
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and resolves to the raw response.
	fn execute(&self, request: HttpRequest) -> HttpFuture<'_>;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpClient for ReqwestHttpClient {
	fn execute(&self, request: HttpRequest) -> HttpFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let response = client.execute(request.try_into()?).await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut response_new = HttpResponse::new(response.bytes().await?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

/// Builds a form-encoded POST request.
///
/// `pairs` are written in order, which keeps extension parameters in insertion order on the
/// wire.
pub fn form_post(
	url: &Url,
	headers: &[(String, String)],
	pairs: &[(String, String)],
) -> Result<HttpRequest> {
	let mut builder = Request::builder().method(Method::POST).uri(url.as_str());

	for (name, value) in headers {
		builder = builder.header(name.as_str(), value.as_str());
	}

	let request = builder.header(CONTENT_TYPE, FORM_CONTENT_TYPE).body(encode_form(pairs))?;

	Ok(request)
}

/// Builds a bodiless GET request.
pub fn get(url: &Url) -> Result<HttpRequest> {
	let request = Request::builder().method(Method::GET).uri(url.as_str()).body(Vec::new())?;

	Ok(request)
}

/// Encodes `pairs` as `application/x-www-form-urlencoded`.
pub fn encode_form(pairs: &[(String, String)]) -> Vec<u8> {
	let mut serializer = Serializer::new(String::new());

	for (name, value) in pairs {
		serializer.append_pair(name, value);
	}

	serializer.finish().into_bytes()
}

/// Returns the first value of header `name`, when it is valid visible ASCII.
pub fn header_value<'a>(response: &'a HttpResponse, name: &str) -> Option<&'a str> {
	response.headers().get(name).and_then(|v| HeaderValue::to_str(v).ok())
}

/// Parses the server `Date` header.
pub fn server_date(response: &HttpResponse) -> Option<OffsetDateTime> {
	let raw = header_value(response, DATE.as_str())?.trim();

	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		return Some(moment);
	}

	// IMF-fixdate ends in `GMT`; rewrite it as a numeric offset for strict parsers.
	let numeric = raw.strip_suffix("GMT").map(|head| format!("{head}+0000"))?;

	OffsetDateTime::parse(&numeric, &Rfc2822).ok()
}

/// Serializes all response headers as a JSON object of string arrays.
pub fn headers_json(response: &HttpResponse) -> String {
	let mut map = BTreeMap::<String, Vec<String>>::new();

	for (name, value) in response.headers() {
		if let Ok(value) = value.to_str() {
			map.entry(name.as_str().to_owned()).or_default().push(value.to_owned());
		}
	}

	serde_json::to_string(&map).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::StatusCode;
	use time::macros::datetime;
	// self
	use super::*;

	fn response_with(name: &'static str, value: &'static str) -> HttpResponse {
		let mut response = HttpResponse::new(Vec::new());

		*response.status_mut() = StatusCode::OK;
		response.headers_mut().insert(name, HeaderValue::from_static(value));

		response
	}

	#[test]
	fn server_date_reads_imf_fixdate() {
		let response = response_with("date", "Sun, 06 Nov 1994 08:49:37 GMT");

		assert_eq!(server_date(&response), Some(datetime!(1994-11-06 08:49:37 UTC)));
	}

	#[test]
	fn server_date_ignores_garbage() {
		let response = response_with("date", "yesterday");

		assert_eq!(server_date(&response), None);
	}

	#[test]
	fn form_post_preserves_pair_order() {
		let url = Url::parse("https://login.example.com/token").expect("Fixture URL should parse.");
		let pairs = vec![
			("grant_type".to_owned(), "authorization_code".to_owned()),
			("zeta".to_owned(), "1".to_owned()),
			("alpha".to_owned(), "a b".to_owned()),
		];
		let request = form_post(&url, &[("client-request-id".into(), "abc".into())], &pairs)
			.expect("Form request should build.");

		assert_eq!(request.method(), Method::POST);
		assert_eq!(
			request.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
			Some(FORM_CONTENT_TYPE)
		);
		assert_eq!(request.body().as_slice(), b"grant_type=authorization_code&zeta=1&alpha=a+b");
	}
}
