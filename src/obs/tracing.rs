// self
use crate::{_prelude::*, obs::FlowKind};

/// Resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// Span wrapping one strategy operation, or one notable stage of it.
///
/// Spans carry the operation, the call-site stage, and, once known, the `client-request-id`
/// correlating the client logs with the identity service logs.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a span tagged with `kind` and `stage`.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"oauth2_sts_client.flow",
				flow = kind.as_str(),
				stage,
				correlation_id = tracing::field::Empty,
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Records the correlation id sent as `client-request-id`.
	pub fn correlation_id(&self, correlation_id: &str) {
		#[cfg(feature = "tracing")]
		{
			self.span.record("correlation_id", correlation_id);
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = correlation_id;
		}
	}

	/// Runs `fut` inside this span; no guard is held across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}

	/// Emits an informational event inside this span.
	pub fn note(&self, message: impl Display) {
		#[cfg(feature = "tracing")]
		{
			tracing::info!(parent: &self.span, "{message}");
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = message;
		}
	}

	/// Emits a warning event inside this span.
	pub fn warn(&self, message: impl Display) {
		#[cfg(feature = "tracing")]
		{
			tracing::warn!(parent: &self.span, "{message}");
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = message;
		}
	}
}
