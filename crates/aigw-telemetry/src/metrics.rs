use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

use crate::semconv::GenAiOperation;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EncodeLabelValue)]
pub enum TokenKind {
	Input,
	Output,
	Total,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, EncodeLabelSet)]
pub struct OperationLabel {
	pub operation: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, EncodeLabelSet)]
pub struct TokenUsageLabel {
	pub operation: String,
	pub token_type: TokenKind,
}

/// The instruments the extproc stream handler records against once per
/// request: token-usage histograms, latency histograms, and the
/// `usage_missing_total` counter for responses that carried no usage
/// object at all.
#[derive(Debug)]
pub struct GatewayMetrics {
	pub token_usage: Family<TokenUsageLabel, Histogram>,
	pub usage_missing_total: Family<OperationLabel, Counter>,
	pub first_token_latency_seconds: Family<OperationLabel, Histogram>,
	pub inter_token_latency_seconds: Family<OperationLabel, Histogram>,
}

impl GatewayMetrics {
	pub fn new(registry: &mut Registry) -> Self {
		let token_usage = Family::new_with_constructor(|| {
			Histogram::new(exponential_buckets(1.0, 2.0, 16))
		});
		registry.register(
			"gen_ai_client_token_usage",
			"Number of tokens used per request, by input/output/total",
			token_usage.clone(),
		);

		let usage_missing_total = Family::default();
		registry.register(
			"usage_missing_total",
			"Responses whose upstream body never carried a usage object",
			usage_missing_total.clone(),
		);

		let first_token_latency_seconds = Family::new_with_constructor(|| {
			Histogram::new(exponential_buckets(0.01, 2.0, 12))
		});
		registry.register(
			"gen_ai_first_token_latency_seconds",
			"Time from request start to the first streamed response token",
			first_token_latency_seconds.clone(),
		);

		let inter_token_latency_seconds = Family::new_with_constructor(|| {
			Histogram::new(exponential_buckets(0.001, 2.0, 12))
		});
		registry.register(
			"gen_ai_inter_token_latency_seconds",
			"Average time between tokens in a streamed response",
			inter_token_latency_seconds.clone(),
		);

		Self {
			token_usage,
			usage_missing_total,
			first_token_latency_seconds,
			inter_token_latency_seconds,
		}
	}

	/// Records a finished request's token usage. `total` is recorded even
	/// when it was derived rather than supplied by the upstream.
	pub fn record_usage(&self, operation: GenAiOperation, usage: &aigw_schema::TokenUsage) {
		let op = operation.name().to_string();
		self
			.token_usage
			.get_or_create(&TokenUsageLabel {
				operation: op.clone(),
				token_type: TokenKind::Input,
			})
			.observe(f64::from(usage.input));
		self
			.token_usage
			.get_or_create(&TokenUsageLabel {
				operation: op.clone(),
				token_type: TokenKind::Output,
			})
			.observe(f64::from(usage.output));
		self
			.token_usage
			.get_or_create(&TokenUsageLabel {
				operation: op,
				token_type: TokenKind::Total,
			})
			.observe(f64::from(usage.total));
	}

	pub fn record_usage_missing(&self, operation: GenAiOperation) {
		self
			.usage_missing_total
			.get_or_create(&OperationLabel {
				operation: operation.name().to_string(),
			})
			.inc();
	}

	pub fn record_first_token_latency(&self, operation: GenAiOperation, latency: std::time::Duration) {
		self
			.first_token_latency_seconds
			.get_or_create(&OperationLabel {
				operation: operation.name().to_string(),
			})
			.observe(latency.as_secs_f64());
	}

	pub fn record_inter_token_latency(&self, operation: GenAiOperation, latency: std::time::Duration) {
		self
			.inter_token_latency_seconds
			.get_or_create(&OperationLabel {
				operation: operation.name().to_string(),
			})
			.observe(latency.as_secs_f64());
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn records_split_by_token_type() {
		let mut registry = Registry::default();
		let metrics = GatewayMetrics::new(&mut registry);
		metrics.record_usage(
			GenAiOperation::ChatCompletion,
			&aigw_schema::TokenUsage {
				input: 3,
				output: 2,
				total: 5,
			},
		);
		let mut buf = String::new();
		prometheus_client::encoding::text::encode(&mut buf, &registry).unwrap();
		assert!(buf.contains("gen_ai_client_token_usage"));
	}

	#[test]
	fn missing_usage_increments_counter() {
		let mut registry = Registry::default();
		let metrics = GatewayMetrics::new(&mut registry);
		metrics.record_usage_missing(GenAiOperation::Embeddings);
		let value = metrics
			.usage_missing_total
			.get_or_create(&OperationLabel {
				operation: "embeddings".to_string(),
			})
			.get();
		assert_eq!(value, 1);
	}
}
