//! OpenID provider discovery: document model, well-known URL resolution, and cached loading.

pub mod cache;

pub use cache::DiscoveryCache;

// self
use crate::{
	_prelude::*,
	config::AuthorityType,
	error::{ServiceError, TransportError},
	http::{self, HttpClient},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	protocol::QueryBuilder,
};

const WELL_KNOWN_CONFIG: &str = ".well-known/openid-configuration";
const VERSION_SEGMENT: &str = "v2.0";

/// OpenID provider metadata, including the Microsoft cloud extensions.
///
/// Fields the crate does not model are kept in [`OpenIdProviderConfiguration::extra`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenIdProviderConfiguration {
	/// `issuer`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub issuer: Option<String>,
	/// `authorization_endpoint`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub authorization_endpoint: Option<String>,
	/// `token_endpoint`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub token_endpoint: Option<String>,
	/// `device_authorization_endpoint`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub device_authorization_endpoint: Option<String>,
	/// `end_session_endpoint`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub end_session_endpoint: Option<String>,
	/// `userinfo_endpoint`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub userinfo_endpoint: Option<String>,
	/// `jwks_uri`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub jwks_uri: Option<String>,
	/// `response_types_supported`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub response_types_supported: Option<Vec<String>>,
	/// `response_modes_supported`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub response_modes_supported: Option<Vec<String>>,
	/// `scopes_supported`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub scopes_supported: Option<Vec<String>>,
	/// `grant_types_supported`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub grant_types_supported: Option<Vec<String>>,
	/// `token_endpoint_auth_methods_supported`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub token_endpoint_auth_methods_supported: Option<Vec<String>>,
	/// `claims_supported`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub claims_supported: Option<Vec<String>>,
	/// `cloud_instance_name`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cloud_instance_name: Option<String>,
	/// `cloud_graph_host_name`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cloud_graph_host_name: Option<String>,
	/// `msgraph_host`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub msgraph_host: Option<String>,
	/// `tenant_region_scope`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tenant_region_scope: Option<String>,
	/// `tenant_region_sub_scope`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tenant_region_sub_scope: Option<String>,
	/// `rbac_url`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub rbac_url: Option<String>,
	/// Unmodeled metadata.
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}
impl OpenIdProviderConfiguration {
	/// Parsed `token_endpoint`.
	pub fn token_endpoint_url(&self) -> Option<Url> {
		parse_endpoint(self.token_endpoint.as_deref())
	}

	/// Parsed `authorization_endpoint`.
	pub fn authorization_endpoint_url(&self) -> Option<Url> {
		parse_endpoint(self.authorization_endpoint.as_deref())
	}

	/// Parsed `device_authorization_endpoint`.
	pub fn device_authorization_endpoint_url(&self) -> Option<Url> {
		parse_endpoint(self.device_authorization_endpoint.as_deref())
	}
}

/// Loads discovery documents through an [`HttpClient`], memoized in a [`DiscoveryCache`].
#[derive(Clone)]
pub struct OpenIdProviderConfigurationClient {
	http_client: Arc<dyn HttpClient>,
	cache: Arc<DiscoveryCache>,
}
impl OpenIdProviderConfigurationClient {
	/// Creates a client on top of shared transport and cache instances.
	pub fn new(http_client: Arc<dyn HttpClient>, cache: Arc<DiscoveryCache>) -> Self {
		Self { http_client, cache }
	}

	/// Cache backing this client.
	pub fn cache(&self) -> &Arc<DiscoveryCache> {
		&self.cache
	}

	/// Resolves the well-known URL for `authority`.
	///
	/// CIAM authorities get the tenant-versioned `/v2.0/.well-known/openid-configuration` path
	/// unless they already end in `/v2.0`; every other authority uses the unversioned path.
	/// `extra_params` are appended as query parameters and become part of the cache key.
	pub fn well_known_url(
		authority: &Url,
		authority_type: AuthorityType,
		extra_params: &[(&str, &str)],
	) -> Result<Url> {
		let base = authority.as_str().split(['?', '#']).next().unwrap_or_default();
		let base = base.trim_end_matches('/');
		let versioned = authority_type == AuthorityType::Ciam
			&& !base.to_ascii_lowercase().ends_with(&format!("/{VERSION_SEGMENT}"));
		let path = if versioned {
			format!("{base}/{VERSION_SEGMENT}/{WELL_KNOWN_CONFIG}")
		} else {
			format!("{base}/{WELL_KNOWN_CONFIG}")
		};
		let mut builder = QueryBuilder::new(Url::parse(&path)?);

		builder.add_all_if_absent(extra_params.iter().copied());

		Ok(builder.build())
	}

	/// Loads the document for `authority`.
	pub async fn load_from_authority(
		&self,
		authority: &Url,
		authority_type: AuthorityType,
	) -> Result<Arc<OpenIdProviderConfiguration>> {
		self.load_from_authority_with_extra_params(authority, authority_type, &[]).await
	}

	/// Loads the document for `authority`, with extra query parameters on the well-known URL.
	pub async fn load_from_authority_with_extra_params(
		&self,
		authority: &Url,
		authority_type: AuthorityType,
		extra_params: &[(&str, &str)],
	) -> Result<Arc<OpenIdProviderConfiguration>> {
		let url = Self::well_known_url(authority, authority_type, extra_params)?;

		self.load(url).await
	}

	/// Loads the document at an already resolved well-known URL, consulting the cache first.
	pub async fn load(&self, url: Url) -> Result<Arc<OpenIdProviderConfiguration>> {
		const KIND: FlowKind = FlowKind::Discovery;

		if let Some(cached) = self.cache.get(&url) {
			FlowSpan::new(KIND, "cache_hit").note(format_args!("using cached metadata for {url}"));

			return Ok(cached);
		}

		let span = FlowSpan::new(KIND, "load");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let guard = self.cache.guard(&url);
				let _singleflight = guard.lock().await;

				if let Some(cached) = self.cache.get(&url) {
					return Ok(cached);
				}

				let document = Arc::new(self.fetch(&url).await?);

				self.cache.insert(url.clone(), document.clone());

				Ok::<_, Error>(document)
			})
			.await;

		obs::record_result(KIND, result)
	}

	async fn fetch(&self, url: &Url) -> Result<OpenIdProviderConfiguration> {
		let request = http::get(url)?;
		let response = self.http_client.execute(request).await.map_err(|e| load_error(url, e))?;
		let status = response.status().as_u16();

		if status != 200 || response.body().is_empty() {
			return Err(ServiceError::OpenIdConfigurationLoad {
				url: url.to_string(),
				status: Some(status),
				reason: format!("metadata failed to load with status: {status}"),
				source: None,
			}
			.into());
		}

		let mut deserializer = serde_json::Deserializer::from_slice(response.body());

		serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
			ServiceError::OpenIdConfigurationLoad {
				url: url.to_string(),
				status: Some(status),
				reason: format!("metadata is not a discovery document at `{}`", e.path()),
				source: Some(Box::new(e)),
			}
			.into()
		})
	}
}
impl Debug for OpenIdProviderConfigurationClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OpenIdProviderConfigurationClient").field("cache", &self.cache).finish()
	}
}

fn load_error(url: &Url, e: TransportError) -> Error {
	ServiceError::OpenIdConfigurationLoad {
		url: url.to_string(),
		status: None,
		reason: "transport failure while requesting metadata".into(),
		source: Some(Box::new(e)),
	}
	.into()
}

fn parse_endpoint(raw: Option<&str>) -> Option<Url> {
	raw.and_then(|raw| Url::parse(raw).ok())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn authority(raw: &str) -> Url {
		Url::parse(raw).expect("Authority fixture should parse.")
	}

	fn well_known(raw: &str, authority_type: AuthorityType) -> String {
		OpenIdProviderConfigurationClient::well_known_url(&authority(raw), authority_type, &[])
			.expect("Well-known URL should resolve.")
			.to_string()
	}

	#[test]
	fn only_ciam_authorities_get_the_versioned_path() {
		assert_eq!(
			well_known("https://login.microsoftonline.com/common/", AuthorityType::Aad),
			"https://login.microsoftonline.com/common/.well-known/openid-configuration"
		);
		assert_eq!(
			well_known("https://login.microsoftonline.com/common/v2.0", AuthorityType::Aad),
			"https://login.microsoftonline.com/common/v2.0/.well-known/openid-configuration"
		);
		assert_eq!(
			well_known("https://contoso.ciamlogin.com/contoso.onmicrosoft.com", AuthorityType::Ciam),
			"https://contoso.ciamlogin.com/contoso.onmicrosoft.com/v2.0/.well-known/openid-configuration"
		);
		assert_eq!(
			well_known("https://contoso.ciamlogin.com/contoso.onmicrosoft.com/v2.0", AuthorityType::Ciam),
			"https://contoso.ciamlogin.com/contoso.onmicrosoft.com/v2.0/.well-known/openid-configuration"
		);
	}

	#[test]
	fn generic_providers_keep_extra_params() {
		let generic = OpenIdProviderConfigurationClient::well_known_url(
			&authority("https://accounts.example.com"),
			AuthorityType::Generic,
			&[("dc", "ESTS-PUB")],
		)
		.expect("Well-known URL should resolve.");

		assert_eq!(
			generic.as_str(),
			"https://accounts.example.com/.well-known/openid-configuration?dc=ESTS-PUB"
		);
	}

	#[test]
	fn document_keeps_unknown_metadata() {
		let document: OpenIdProviderConfiguration = serde_json::from_str(
			r#"{"token_endpoint":"https://login.example.com/t/oauth2/v2.0/token","kerberos_endpoint":"https://k"}"#,
		)
		.expect("Discovery document should parse.");

		assert_eq!(
			document.token_endpoint_url().map(|u| u.to_string()),
			Some("https://login.example.com/t/oauth2/v2.0/token".into())
		);
		assert_eq!(document.extra["kerberos_endpoint"], "https://k");
	}
}
