use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Header add/remove instructions a [`crate::Translator`] asks the caller
/// (`aigw-extproc`) to apply. Kept independent of the Envoy ext_proc wire
/// format so this crate has no gRPC/proto dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderMutation {
	Set(String, String),
	Remove(String),
}

/// The result of [`crate::Translator::request_body`].
#[derive(Debug, Default)]
pub struct RequestTranslation {
	pub headers: Vec<HeaderMutation>,
	/// `None` means the body is unchanged from the input.
	pub body: Option<Bytes>,
	/// Set when the translator determined the response should be handled
	/// in a different Envoy body mode than the default (e.g. a provider
	/// whose streaming responses cannot be incrementally parsed).
	pub mode_override: Option<ModeOverride>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeOverride {
	Buffered,
	Streamed,
}

/// The result of [`crate::Translator::response_body`] for one chunk.
#[derive(Debug, Default)]
pub struct ResponseBodyTranslation {
	pub headers: Vec<HeaderMutation>,
	/// `None` means: do not replace the body Envoy already has buffered for
	/// this frame (e.g. still accumulating a gzip header, or passthrough).
	pub body: Option<Bytes>,
	pub usage: Option<TokenUsage>,
}

/// `{input, output, total}` token counts. Provider `int64` counts are
/// clamped to `u32::MAX` rather than panicking on overflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
	pub input: u32,
	pub output: u32,
	pub total: u32,
}

impl TokenUsage {
	pub fn from_i64_saturating(input: i64, output: i64, total: i64) -> Self {
		Self {
			input: saturate(input),
			output: saturate(output),
			total: saturate(total),
		}
	}

	/// `total` defaults to `input + output` (saturating) when the upstream
	/// didn't report it directly.
	pub fn with_derived_total(input: i64, output: i64) -> Self {
		let input = saturate(input);
		let output = saturate(output);
		Self {
			input,
			output,
			total: input.saturating_add(output),
		}
	}
}

fn saturate(v: i64) -> u32 {
	v.clamp(0, u32::MAX as i64) as u32
}

#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
	#[error("invalid request body: {0}")]
	InvalidBody(#[source] serde_json::Error),
	#[error("unsupported field: {0}")]
	UnsupportedField(String),
	#[error("model not representable in target schema: {0}")]
	ModelNotRepresentable(String),
	#[error("response body could not be parsed: {0}")]
	InvalidResponse(#[source] serde_json::Error),
}

impl TranslationError {
	/// The OpenAI-shaped HTTP status this error surfaces as.
	pub fn status_code(&self) -> u16 {
		match self {
			TranslationError::InvalidBody(_)
			| TranslationError::UnsupportedField(_)
			| TranslationError::ModelNotRepresentable(_) => 400,
			TranslationError::InvalidResponse(_) => 502,
		}
	}
}
