// self
use crate::_prelude::*;

/// Telemetry events handed to the host application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TelemetryEvent {
	/// The authorization UI surface was asked to show the authorize URL.
	UiShown {
		/// Correlation id of the authorization request, when one was set.
		correlation_id: Option<String>,
	},
	/// A token request left the client.
	TokenRequestSent {
		/// Value of the `client-request-id` header.
		correlation_id: String,
		/// Grant type on the wire.
		grant_type: String,
	},
	/// The token endpoint answered.
	TokenResponseReceived {
		/// Value of the `client-request-id` header.
		correlation_id: String,
		/// HTTP status code.
		status: u16,
	},
	/// The token endpoint challenged the client for a device certificate.
	PKeyAuthChallenge {
		/// Value of the `client-request-id` header.
		correlation_id: String,
	},
}

/// Receiver of [`TelemetryEvent`]s.
pub trait TelemetrySink
where
	Self: Send + Sync,
{
	/// Records a single event. Must not block.
	fn emit(&self, event: TelemetryEvent);
}

/// Sink that drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTelemetry;
impl TelemetrySink for NoopTelemetry {
	fn emit(&self, _: TelemetryEvent) {}
}

/// Sink that keeps events in memory, mostly for tests and diagnostics.
#[derive(Debug, Default)]
pub struct MemoryTelemetry(Mutex<Vec<TelemetryEvent>>);
impl MemoryTelemetry {
	/// Returns a snapshot of the recorded events in emission order.
	pub fn events(&self) -> Vec<TelemetryEvent> {
		self.0.lock().clone()
	}
}
impl TelemetrySink for MemoryTelemetry {
	fn emit(&self, event: TelemetryEvent) {
		self.0.lock().push(event);
	}
}

/// Source of extra telemetry headers attached to every token request.
pub trait TelemetryHeaderProvider
where
	Self: Send + Sync,
{
	/// Returns `(name, value)` pairs; an empty list adds nothing.
	fn telemetry_headers(&self) -> Vec<(String, String)>;
}

/// Provider that contributes no headers.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTelemetryHeaders;
impl TelemetryHeaderProvider for NoTelemetryHeaders {
	fn telemetry_headers(&self) -> Vec<(String, String)> {
		Vec::new()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn memory_telemetry_keeps_order() {
		let sink = MemoryTelemetry::default();

		sink.emit(TelemetryEvent::UiShown { correlation_id: None });
		sink.emit(TelemetryEvent::PKeyAuthChallenge { correlation_id: "c".into() });

		assert_eq!(sink.events(), vec![
			TelemetryEvent::UiShown { correlation_id: None },
			TelemetryEvent::PKeyAuthChallenge { correlation_id: "c".into() },
		]);
	}
}
