//! Observability: GenAI-convention spans, token-usage/latency metrics, and
//! structured logging setup. Nothing here touches the request-routing or
//! translation logic — `aigw-extproc` calls into this crate at the points
//! the streaming protocol dictates.

pub mod logging;
pub mod metrics;
pub mod semconv;
pub mod span;

pub use metrics::GatewayMetrics;
pub use semconv::GenAiOperation;
pub use span::{RequestSpan, Tracer, init_otlp_tracer};

/// Registers every process-wide collector (GenAI metrics plus the Tokio
/// runtime collector) against one `Registry` and returns the metrics
/// handle the request path records against.
pub fn init_metrics(
	registry: &mut prometheus_client::registry::Registry,
	runtime: &tokio::runtime::Handle,
) -> GatewayMetrics {
	aigw_core::tokio_metrics::TokioCollector::register(registry, runtime);
	GatewayMetrics::new(registry)
}
