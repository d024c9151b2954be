//! `x-ms-clitelem` diagnostics reported by the token endpoint.

// self
use crate::_prelude::*;

/// Response header carrying server-side diagnostics.
pub const X_MS_CLITELEM: &str = "x-ms-clitelem";

/// Parsed `x-ms-clitelem` header: `version,errorCode,subErrorCode,rtAge,speRing`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliTelemInfo {
	/// Header format version; only `1` is understood.
	pub version: String,
	/// Server error code.
	pub server_error_code: String,
	/// Server sub-error code.
	pub server_sub_error_code: String,
	/// Age of the refresh token the server saw.
	pub refresh_token_age: String,
	/// Service ring that handled the request.
	pub spe_ring: String,
}
impl CliTelemInfo {
	const SUPPORTED_VERSION: &'static str = "1";

	/// Parses the header value; unknown versions and malformed values yield `None`.
	pub fn from_header(value: &str) -> Option<Self> {
		let fields: Vec<&str> = value.trim().split(',').map(str::trim).collect();

		match fields.as_slice() {
			[version, error, sub_error, rt_age, spe_ring]
				if *version == Self::SUPPORTED_VERSION =>
				Some(Self {
					version: (*version).into(),
					server_error_code: (*error).into(),
					server_sub_error_code: (*sub_error).into(),
					refresh_token_age: (*rt_age).into(),
					spe_ring: (*spe_ring).into(),
				}),
			_ => None,
		}
	}
}
