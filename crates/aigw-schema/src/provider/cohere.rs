use async_trait::async_trait;
use bytes::Bytes;

use super::{apply_model_override, content_length_mutation, encode, parse_json};
use crate::translator::{StreamingCommon, Translator, TranslatorState};
use crate::types::{HeaderMutation, RequestTranslation, ResponseBodyTranslation, TranslationError};

/// Rerank requests routed to Cohere's v2 Rerank endpoint. There is no
/// streaming variant and no OpenAI-standard rerank shape to translate
/// into, so this translator's job is narrower than the chat-completions
/// ones: path rewrite and model override on the way in, passthrough on the
/// way back.
pub struct CohereRerankTranslator {
	common: StreamingCommon,
}

impl CohereRerankTranslator {
	pub fn new() -> Self {
		Self {
			common: StreamingCommon::new(),
		}
	}
}

impl Default for CohereRerankTranslator {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Translator for CohereRerankTranslator {
	fn request_body(
		&mut self,
		raw: &[u8],
		model_override: Option<&str>,
	) -> Result<RequestTranslation, TranslationError> {
		let mut input = parse_json(raw)?;
		if input.get("documents").is_none() {
			return Err(TranslationError::UnsupportedField(
				"rerank request missing documents".to_string(),
			));
		}
		apply_model_override(&mut input, model_override);
		let encoded = encode(&input)?;
		Ok(RequestTranslation {
			headers: vec![
				HeaderMutation::Set(":path".to_string(), "/v2/rerank".to_string()),
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
		_chunk: &[u8],
		end_of_stream: bool,
	) -> Result<ResponseBodyTranslation, TranslationError> {
		if end_of_stream {
			self.common.state = TranslatorState::Drained;
		}
		Ok(ResponseBodyTranslation::default())
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
	fn rewrites_path_for_rerank() {
		let mut t = CohereRerankTranslator::new();
		let body = br#"{"model":"rerank-english-v3.0","query":"q","documents":["a","b"]}"#;
		let out = t.request_body(body, None).unwrap();
		assert!(out
			.headers
			.iter()
			.any(|h| matches!(h, HeaderMutation::Set(k, v) if k == ":path" && v == "/v2/rerank")));
	}

	#[test]
	fn rejects_missing_documents() {
		let mut t = CohereRerankTranslator::new();
		let body = br#"{"model":"rerank-english-v3.0","query":"q"}"#;
		assert!(t.request_body(body, None).is_err());
	}
}
