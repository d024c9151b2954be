//! Process-level collaborators injected into a strategy.

// self
use crate::{
	_prelude::*,
	clock::ClockSkewManager,
	discovery::DiscoveryCache,
	http::HttpClient,
	obs::{NoTelemetryHeaders, NoopTelemetry, TelemetryHeaderProvider, TelemetrySink},
	sts::{DeviceCertificateProvider, DevicePopManager},
};

/// Shared state and seams a strategy is built with.
///
/// Everything here outlives a single request; share one value across strategies to share the
/// discovery cache and the clock skew.
#[derive(Clone)]
pub struct StrategyParameters {
	/// Transport used for token, device-code, and discovery calls.
	pub http_client: Arc<dyn HttpClient>,
	/// Clock skew tracker updated from token endpoint `Date` headers.
	pub clock: ClockSkewManager,
	/// Discovery document cache.
	pub discovery_cache: Arc<DiscoveryCache>,
	/// Device key manager for `pop` tokens.
	pub pop_manager: Option<Arc<dyn DevicePopManager>>,
	/// Device certificate for PKeyAuth challenges.
	pub certificate_provider: Option<Arc<dyn DeviceCertificateProvider>>,
	/// Telemetry event receiver.
	pub telemetry: Arc<dyn TelemetrySink>,
	/// Extra telemetry headers for token requests.
	pub telemetry_headers: Arc<dyn TelemetryHeaderProvider>,
}
impl StrategyParameters {
	/// Creates parameters with fresh in-memory state and no device seams.
	pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
		Self {
			http_client,
			clock: ClockSkewManager::default(),
			discovery_cache: Default::default(),
			pop_manager: None,
			certificate_provider: None,
			telemetry: Arc::new(NoopTelemetry),
			telemetry_headers: Arc::new(NoTelemetryHeaders),
		}
	}

	/// Uses an existing clock skew tracker.
	pub fn clock(mut self, clock: ClockSkewManager) -> Self {
		self.clock = clock;

		self
	}

	/// Uses an existing discovery cache.
	pub fn discovery_cache(mut self, cache: Arc<DiscoveryCache>) -> Self {
		self.discovery_cache = cache;

		self
	}

	/// Enables `pop` tokens bound to `manager`'s device key.
	pub fn pop_manager(mut self, manager: Arc<dyn DevicePopManager>) -> Self {
		self.pop_manager = Some(manager);

		self
	}

	/// Enables PKeyAuth answers signed by `provider`.
	pub fn certificate_provider(mut self, provider: Arc<dyn DeviceCertificateProvider>) -> Self {
		self.certificate_provider = Some(provider);

		self
	}

	/// Routes telemetry events to `sink`.
	pub fn telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
		self.telemetry = sink;

		self
	}

	/// Adds headers from `provider` to every token request.
	pub fn telemetry_headers(mut self, provider: Arc<dyn TelemetryHeaderProvider>) -> Self {
		self.telemetry_headers = provider;

		self
	}
}
#[cfg(feature = "reqwest")]
impl Default for StrategyParameters {
	fn default() -> Self {
		Self::new(Arc::new(crate::http::ReqwestHttpClient::default()))
	}
}
impl Debug for StrategyParameters {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StrategyParameters")
			.field("clock", &self.clock)
			.field("discovery_cache", &self.discovery_cache)
			.field("pop_manager", &self.pop_manager.is_some())
			.field("certificate_provider", &self.certificate_provider.is_some())
			.finish()
	}
}
