use async_trait::async_trait;
use bytes::Bytes;

use super::{apply_model_override, content_length_mutation, encode, parse_json};
use crate::translator::{StreamingCommon, Translator, TranslatorState};
use crate::types::{HeaderMutation, RequestTranslation, ResponseBodyTranslation, TranslationError};

/// OpenAI ↔ GCP Vertex AI's OpenAI-compatible `rawPredict`/`streamRawPredict`
/// endpoints. The body is OpenAI-shaped already; only the path changes,
/// keyed off the project/location the backend was configured with.
pub struct VertexTranslator {
	project: String,
	location: String,
	common: StreamingCommon,
}

impl VertexTranslator {
	pub fn new(project: impl Into<String>, location: impl Into<String>) -> Self {
		Self {
			project: project.into(),
			location: location.into(),
			common: StreamingCommon::new(),
		}
	}
}

#[async_trait]
impl Translator for VertexTranslator {
	fn request_body(
		&mut self,
		raw: &[u8],
		model_override: Option<&str>,
	) -> Result<RequestTranslation, TranslationError> {
		let mut input = parse_json(raw)?;
		let model = model_override
			.map(str::to_string)
			.or_else(|| input.get("model").and_then(|v| v.as_str()).map(str::to_string))
			.ok_or_else(|| TranslationError::ModelNotRepresentable("missing model".to_string()))?;
		apply_model_override(&mut input, model_override);
		let stream = input.get("stream").and_then(|v| v.as_bool()).unwrap_or(false);
		let verb = if stream { "streamRawPredict" } else { "rawPredict" };
		let path = format!(
			"/v1/projects/{}/locations/{}/publishers/google/models/{model}:{verb}",
			self.project, self.location
		);
		let encoded = encode(&input)?;
		Ok(RequestTranslation {
			headers: vec![
				HeaderMutation::Set(":path".to_string(), path),
				content_length_mutation(&encoded),
			],
			body: Some(encoded),
			mode_override: None,
		})
	}

	fn response_headers(&mut self, headers: &http::HeaderMap) -> Vec<HeaderMutation> {
		self.common.observe_headers(headers)
	}

	async fn response_body(
		&mut self,
		chunk: &[u8],
		end_of_stream: bool,
	) -> Result<ResponseBodyTranslation, TranslationError> {
		let Some(decoded) = self.common.buffer_and_decode(chunk, end_of_stream).await else {
			return Ok(ResponseBodyTranslation::default());
		};
		self.common.state = TranslatorState::Drained;
		let usage = super::extract_openai_usage(&decoded);
		if !self.common.content_encoding_gzip {
			// Vertex's rawPredict response is already OpenAI-shaped; no rewrite
			// needed beyond pulling usage out of it.
			return Ok(ResponseBodyTranslation { headers: Vec::new(), body: None, usage });
		}
		Ok(ResponseBodyTranslation {
			headers: vec![StreamingCommon::drop_content_encoding(), content_length_mutation(&decoded)],
			body: Some(decoded),
			usage,
		})
	}

	fn response_error(&mut self, status: u16, body: &[u8]) -> Bytes {
		super::openai_error_translation(status, body)
	}

	fn state(&self) -> TranslatorState {
		self.common.state
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn builds_raw_predict_path() {
		let mut t = VertexTranslator::new("my-proj", "us-central1");
		let body = br#"{"model":"gemini-1.5-pro","messages":[]}"#;
		let out = t.request_body(body, None).unwrap();
		assert!(out.headers.iter().any(|h| matches!(h, HeaderMutation::Set(k, v)
			if k == ":path" && v == "/v1/projects/my-proj/locations/us-central1/publishers/google/models/gemini-1.5-pro:rawPredict")));
	}

	#[test]
	fn switches_to_stream_raw_predict_when_streaming() {
		let mut t = VertexTranslator::new("my-proj", "us-central1");
		let body = br#"{"model":"gemini-1.5-pro","stream":true,"messages":[]}"#;
		let out = t.request_body(body, None).unwrap();
		assert!(out
			.headers
			.iter()
			.any(|h| matches!(h, HeaderMutation::Set(k, v) if k == ":path" && v.ends_with(":streamRawPredict"))));
	}

	#[tokio::test]
	async fn extracts_usage_from_openai_shaped_response_without_rewriting_body() {
		let mut t = VertexTranslator::new("my-proj", "us-central1");
		let body = br#"{"choices":[],"usage":{"prompt_tokens":7,"completion_tokens":3,"total_tokens":10}}"#;
		let out = t.response_body(body, true).await.unwrap();
		assert!(out.body.is_none());
		assert_eq!(
			out.usage,
			Some(crate::types::TokenUsage {
				input: 7,
				output: 3,
				total: 10
			})
		);
	}
}
