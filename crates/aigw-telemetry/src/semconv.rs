//! GenAI semantic convention attribute keys
//! (<https://opentelemetry.io/docs/specs/semconv/gen-ai/>), scoped to the
//! handful this gateway actually populates.

use opentelemetry::Key;

pub static OPERATION_NAME: Key = Key::from_static_str("gen_ai.operation.name");
pub static SYSTEM: Key = Key::from_static_str("gen_ai.system");
pub static REQUEST_MODEL: Key = Key::from_static_str("gen_ai.request.model");
pub static RESPONSE_MODEL: Key = Key::from_static_str("gen_ai.response.model");
pub static USAGE_INPUT_TOKENS: Key = Key::from_static_str("gen_ai.usage.input_tokens");
pub static USAGE_OUTPUT_TOKENS: Key = Key::from_static_str("gen_ai.usage.output_tokens");

/// The tagged variant a [`crate::span::RequestSpan`] is opened for, mirroring
/// the shape of requests this gateway forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenAiOperation {
	ChatCompletion,
	Embeddings,
	Completion,
	ImageGeneration,
	Rerank,
	Messages,
}

impl GenAiOperation {
	/// The `gen_ai.operation.name` value for this variant.
	pub fn name(self) -> &'static str {
		match self {
			GenAiOperation::ChatCompletion | GenAiOperation::Messages => "chat",
			GenAiOperation::Embeddings => "embeddings",
			GenAiOperation::Completion => "text_completion",
			GenAiOperation::ImageGeneration => "image_generation",
			GenAiOperation::Rerank => "rerank",
		}
	}
}

impl std::fmt::Display for GenAiOperation {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}
