use opentelemetry::KeyValue;
use opentelemetry::trace::{Span as OtelSpan, Status, Tracer as OtelTracer};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};

use crate::semconv::{self, GenAiOperation};

/// Builds the OTLP/gRPC tracer provider from `OTEL_EXPORTER_OTLP_ENDPOINT`
/// (read by `opentelemetry-otlp` itself) and the given service name. Called
/// once at process startup.
pub fn init_otlp_tracer(service_name: &str) -> anyhow::Result<Tracer> {
	let resource = Resource::builder().with_service_name(service_name.to_string()).build();
	let exporter = opentelemetry_otlp::SpanExporter::builder().with_tonic().build()?;
	let provider = SdkTracerProvider::builder()
		.with_resource(resource)
		.with_batch_exporter(exporter)
		.build();
	Ok(Tracer::new(provider, "ai-gateway"))
}

/// Wraps the process-wide `SdkTracerProvider`. One instance lives for the
/// lifetime of the gateway; `start` is called once per request.
pub struct Tracer {
	tracer: SdkTracer,
	provider: SdkTracerProvider,
}

impl Tracer {
	pub fn new(provider: SdkTracerProvider, instrumentation_name: &'static str) -> Self {
		let tracer = provider.tracer(instrumentation_name);
		Self { tracer, provider }
	}

	/// Opens the definitive request span. Called from `RequestBody`, once
	/// the schema and model are known — not from `RequestHeaders`, which
	/// only has a placeholder's worth of information.
	pub fn start(&self, operation: GenAiOperation, system: &str, request_model: &str) -> RequestSpan {
		let mut span = self.tracer.start(format!("{operation} {request_model}"));
		span.set_attribute(KeyValue::new(semconv::OPERATION_NAME.clone(), operation.name()));
		span.set_attribute(KeyValue::new(semconv::SYSTEM.clone(), system.to_string()));
		span.set_attribute(KeyValue::new(semconv::REQUEST_MODEL.clone(), request_model.to_string()));
		RequestSpan { span }
	}

	pub fn shutdown(&self) {
		if let Err(error) = self.provider.shutdown() {
			tracing::warn!(%error, "tracer provider shutdown failed");
		}
	}
}

/// The span for one request/stream. Ended exactly once, by whichever of
/// `end_ok`, `end_error`, or `end_cancelled` fires first.
pub struct RequestSpan {
	span: opentelemetry_sdk::trace::Span,
}

impl RequestSpan {
	pub fn set_response_model(&mut self, model: &str) {
		self.span.set_attribute(KeyValue::new(semconv::RESPONSE_MODEL.clone(), model.to_string()));
	}

	pub fn record_usage(&mut self, usage: &aigw_schema::TokenUsage) {
		self
			.span
			.set_attribute(KeyValue::new(semconv::USAGE_INPUT_TOKENS.clone(), i64::from(usage.input)));
		self
			.span
			.set_attribute(KeyValue::new(semconv::USAGE_OUTPUT_TOKENS.clone(), i64::from(usage.output)));
	}

	pub fn end_ok(mut self) {
		self.span.set_status(Status::Ok);
		self.span.end();
	}

	pub fn end_error(mut self, message: impl Into<std::borrow::Cow<'static, str>>) {
		self.span.set_status(Status::error(message));
		self.span.end();
	}

	/// Envoy dropped the gRPC stream mid-request. Not a translator or
	/// upstream error — there is no error message to attach.
	pub fn end_cancelled(mut self) {
		self.span.set_status(Status::error("cancelled"));
		self.span.end();
	}
}
