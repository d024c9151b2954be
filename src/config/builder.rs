// self
use crate::{
	_prelude::*,
	config::{AuthorityType, ConfigurationError, PlatformInfo, Slice, StsConfiguration},
};

/// Builder for [`StsConfiguration`] values.
#[derive(Debug)]
pub struct StsConfigurationBuilder {
	/// Authority URL for the configuration being constructed.
	pub authority: Url,
	/// Tenant flavor of the authority.
	pub authority_type: AuthorityType,
	/// Optional explicit token endpoint.
	pub token_endpoint: Option<Url>,
	/// Optional slice routing.
	pub slice: Option<Slice>,
	/// Multi-cloud token endpoint rewrite toggle.
	pub multiple_cloud_support: bool,
	/// OpenID discovery toggle.
	pub use_openid_discovery: bool,
	/// CCS request id exposure toggle.
	pub expose_ccs_request_id: bool,
	/// CCS request sequence exposure toggle.
	pub expose_ccs_request_sequence: bool,
	/// Platform identity headers.
	pub platform: PlatformInfo,
}
impl StsConfigurationBuilder {
	/// Creates a new builder seeded with the provided authority.
	pub fn new(authority: Url) -> Self {
		Self {
			authority,
			authority_type: AuthorityType::default(),
			token_endpoint: None,
			slice: None,
			multiple_cloud_support: false,
			use_openid_discovery: false,
			expose_ccs_request_id: false,
			expose_ccs_request_sequence: false,
			platform: PlatformInfo::default(),
		}
	}

	/// Sets the authority type.
	pub fn authority_type(mut self, authority_type: AuthorityType) -> Self {
		self.authority_type = authority_type;

		self
	}

	/// Pins the token endpoint instead of deriving it from the authority.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the slice routing hints.
	pub fn slice(mut self, slice: Slice) -> Self {
		self.slice = Some(slice);

		self
	}

	/// Enables the multi-cloud token endpoint rewrite.
	pub fn multiple_cloud_support(mut self, enabled: bool) -> Self {
		self.multiple_cloud_support = enabled;

		self
	}

	/// Enables endpoint resolution through OpenID discovery.
	pub fn use_openid_discovery(mut self, enabled: bool) -> Self {
		self.use_openid_discovery = enabled;

		self
	}

	/// Copies `xms-ccs-request-id` and `xms-ccs-request-sequence` into token responses.
	pub fn expose_ccs_headers(mut self, request_id: bool, request_sequence: bool) -> Self {
		self.expose_ccs_request_id = request_id;
		self.expose_ccs_request_sequence = request_sequence;

		self
	}

	/// Overrides the platform identity.
	pub fn platform(mut self, platform: PlatformInfo) -> Self {
		self.platform = platform;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<StsConfiguration, ConfigurationError> {
		let config = StsConfiguration {
			authority: self.authority,
			authority_type: self.authority_type,
			token_endpoint: self.token_endpoint,
			slice: self.slice,
			multiple_cloud_support: self.multiple_cloud_support,
			use_openid_discovery: self.use_openid_discovery,
			expose_ccs_request_id: self.expose_ccs_request_id,
			expose_ccs_request_sequence: self.expose_ccs_request_sequence,
			platform: self.platform,
		};

		config.validate()?;

		Ok(config)
	}
}

impl StsConfiguration {
	/// Validates invariants for the configuration.
	pub fn validate(&self) -> Result<(), ConfigurationError> {
		if self.authority.cannot_be_a_base() || self.authority.host_str().is_none() {
			return Err(ConfigurationError::InvalidAuthority { url: self.authority.to_string() });
		}

		validate_endpoint("authority", &self.authority)?;

		if let Some(token) = self.token_endpoint.as_ref() {
			validate_endpoint("token", token)?;
		}
		if let Some(slice) = self.slice.as_ref() {
			validate_slice_value(Slice::SLICE_PARAMETER, slice.slice.as_deref())?;
			validate_slice_value(Slice::DC_PARAMETER, slice.dc.as_deref())?;
		}

		Ok(())
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ConfigurationError> {
	if url.scheme() != "https" {
		Err(ConfigurationError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	} else {
		Ok(())
	}
}

fn validate_slice_value(
	parameter: &'static str,
	value: Option<&str>,
) -> Result<(), ConfigurationError> {
	match value {
		Some(v) if !v.is_empty() && v.trim().is_empty() =>
			Err(ConfigurationError::BlankSlice { parameter }),
		_ => Ok(()),
	}
}
