//! Strategy configuration: authority, endpoints, slice routing, and platform identity.
//!
//! Values are serde-friendly so hosts can load them from their own configuration files, and are
//! validated once by [`StsConfigurationBuilder::build`].

/// Builder API for assembling configurations.
pub mod builder;

pub use builder::*;

// self
use crate::_prelude::*;

const TOKEN_ENDPOINT_SUFFIX: &str = "oAuth2/v2.0/token";
const AUTHORIZATION_ENDPOINT_SUFFIX: &str = "oAuth2/v2.0/authorize";
const DEVICE_CODE_ENDPOINT_SUFFIX: &str = "oAuth2/v2.0/devicecode";

/// Errors raised while constructing or validating configurations.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ConfigurationError {
	/// Authority URL is required.
	#[error("Missing authority URL.")]
	MissingAuthority,
	/// Endpoints must use HTTPS.
	#[error("The {endpoint} URL must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Authority URL cannot carry path segments or lacks a host.
	#[error("Authority URL is not a hierarchical HTTPS URL: {url}.")]
	InvalidAuthority {
		/// Authority URL that failed validation.
		url: String,
	},
	/// Slice values must not be blank when present.
	#[error("Slice parameter `{parameter}` must not be blank.")]
	BlankSlice {
		/// Offending parameter name.
		parameter: &'static str,
	},
}

/// Tenant flavor of the authority, which decides the discovery document path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityType {
	#[default]
	/// Microsoft Entra ID (work, school, and personal accounts).
	Aad,
	/// Customer identity (CIAM) tenants.
	Ciam,
	/// Any other OpenID provider.
	Generic,
}

/// Test slice and data-center routing hints appended to token and authorize URLs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Slice {
	/// `slice` query parameter.
	pub slice: Option<String>,
	/// `dc` query parameter.
	pub dc: Option<String>,
}
impl Slice {
	/// Query parameter name for the slice.
	pub const SLICE_PARAMETER: &'static str = "slice";
	/// Query parameter name for the data center.
	pub const DC_PARAMETER: &'static str = "dc";

	/// Returns the non-empty `(name, value)` pairs in wire order.
	pub fn parameters(&self) -> Vec<(&str, &str)> {
		let mut params = Vec::new();

		if let Some(slice) = self.slice.as_deref().filter(|v| !v.is_empty()) {
			params.push((Self::SLICE_PARAMETER, slice));
		}
		if let Some(dc) = self.dc.as_deref().filter(|v| !v.is_empty()) {
			params.push((Self::DC_PARAMETER, dc));
		}

		params
	}
}

/// Client identity advertised through `x-client-*` and `x-app-*` headers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformInfo {
	/// Library SKU (`x-client-SKU`).
	pub sku: String,
	/// Library version (`x-client-Ver`).
	pub version: String,
	/// Operating system (`x-client-OS`).
	pub os: Option<String>,
	/// CPU architecture (`x-client-CPU`).
	pub cpu: Option<String>,
	/// Device model (`x-client-DM`).
	pub device_model: Option<String>,
	/// Calling application name (`x-app-name`).
	pub app_name: Option<String>,
	/// Calling application version (`x-app-ver`).
	pub app_version: Option<String>,
}
impl PlatformInfo {
	/// Returns the `x-client-*` parameters, used both as headers and authorize query params.
	pub fn client_parameters(&self) -> Vec<(&'static str, String)> {
		let mut params = vec![("x-client-SKU", self.sku.clone()), ("x-client-Ver", self.version.clone())];

		push_opt(&mut params, "x-client-OS", self.os.as_ref());
		push_opt(&mut params, "x-client-CPU", self.cpu.as_ref());
		push_opt(&mut params, "x-client-DM", self.device_model.as_ref());

		params
	}

	/// Returns every platform header, including the application headers.
	pub fn headers(&self) -> Vec<(&'static str, String)> {
		let mut headers = self.client_parameters();

		push_opt(&mut headers, "x-app-name", self.app_name.as_ref());
		push_opt(&mut headers, "x-app-ver", self.app_version.as_ref());

		headers
	}
}
impl Default for PlatformInfo {
	fn default() -> Self {
		Self {
			sku: env!("CARGO_PKG_NAME").into(),
			version: env!("CARGO_PKG_VERSION").into(),
			os: Some(std::env::consts::OS.into()),
			cpu: Some(std::env::consts::ARCH.into()),
			device_model: None,
			app_name: None,
			app_version: None,
		}
	}
}

/// Immutable configuration consumed by the strategies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StsConfiguration {
	/// Authority URL, e.g. `https://login.microsoftonline.com/common`.
	pub authority: Url,
	/// Tenant flavor of the authority.
	#[serde(default)]
	pub authority_type: AuthorityType,
	/// Explicit token endpoint; derived from the authority when absent.
	#[serde(default)]
	pub token_endpoint: Option<Url>,
	/// Optional slice routing.
	#[serde(default)]
	pub slice: Option<Slice>,
	/// Whether the token endpoint may move to the cloud named by the authorization response.
	#[serde(default)]
	pub multiple_cloud_support: bool,
	/// Whether endpoints come from the OpenID discovery document.
	#[serde(default)]
	pub use_openid_discovery: bool,
	/// Whether `xms-ccs-request-id` is copied into token responses.
	#[serde(default)]
	pub expose_ccs_request_id: bool,
	/// Whether `xms-ccs-request-sequence` is copied into token responses.
	#[serde(default)]
	pub expose_ccs_request_sequence: bool,
	/// Platform identity headers.
	#[serde(default)]
	pub platform: PlatformInfo,
}
impl StsConfiguration {
	/// Creates a new builder for the provided authority.
	pub fn builder(authority: Url) -> StsConfigurationBuilder {
		StsConfigurationBuilder::new(authority)
	}

	/// Token endpoint: the explicit one, else `{authority}/oAuth2/v2.0/token`.
	pub fn token_endpoint(&self) -> Result<Url> {
		match &self.token_endpoint {
			Some(url) => Ok(url.clone()),
			None => self.authority_endpoint(TOKEN_ENDPOINT_SUFFIX),
		}
	}

	/// Static authorization endpoint `{authority}/oAuth2/v2.0/authorize`.
	pub fn authorization_endpoint(&self) -> Result<Url> {
		self.authority_endpoint(AUTHORIZATION_ENDPOINT_SUFFIX)
	}

	/// Static device authorization endpoint `{authority}/oAuth2/v2.0/devicecode`.
	pub fn device_authorization_endpoint(&self) -> Result<Url> {
		self.authority_endpoint(DEVICE_CODE_ENDPOINT_SUFFIX)
	}

	/// Host of the authority, used as the account environment.
	pub fn authority_host(&self) -> Option<&str> {
		self.authority.host_str()
	}

	fn authority_endpoint(&self, suffix: &str) -> Result<Url> {
		let base = self.authority.as_str().trim_end_matches('/');

		Ok(Url::parse(&format!("{base}/{suffix}"))?)
	}
}

fn push_opt(params: &mut Vec<(&'static str, String)>, name: &'static str, value: Option<&String>) {
	if let Some(value) = value.filter(|v| !v.is_empty()) {
		params.push((name, value.clone()));
	}
}
