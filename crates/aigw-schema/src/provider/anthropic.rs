use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};

use super::{content_length_mutation, encode, openai_completion_envelope, parse_json};
use crate::translator::{StreamingCommon, Translator, TranslatorState};
use crate::types::{
	HeaderMutation, RequestTranslation, ResponseBodyTranslation, TokenUsage, TranslationError,
};

const DEFAULT_MAX_TOKENS: i64 = 4096;

/// OpenAI chat-completions ↔ Anthropic Messages. Anthropic pulls the
/// system prompt out of `messages` into a top-level `system` field and
/// requires `max_tokens`, which OpenAI makes optional.
pub struct AnthropicTranslator {
	common: StreamingCommon,
	model: String,
}

impl AnthropicTranslator {
	pub fn new() -> Self {
		Self {
			common: StreamingCommon::new(),
			model: String::new(),
		}
	}
}

impl Default for AnthropicTranslator {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Translator for AnthropicTranslator {
	fn request_body(
		&mut self,
		raw: &[u8],
		model_override: Option<&str>,
	) -> Result<RequestTranslation, TranslationError> {
		let input = parse_json(raw)?;
		let model = model_override
			.map(str::to_string)
			.or_else(|| input.get("model").and_then(Value::as_str).map(str::to_string))
			.ok_or_else(|| TranslationError::ModelNotRepresentable("missing model".to_string()))?;
		self.model = model.clone();

		let mut system = None;
		let mut messages = Vec::new();
		for message in input
			.get("messages")
			.and_then(Value::as_array)
			.into_iter()
			.flatten()
		{
			if message.get("role").and_then(Value::as_str) == Some("system") {
				system = message.get("content").and_then(Value::as_str).map(str::to_string);
			} else {
				messages.push(message.clone());
			}
		}

		let max_tokens = input
			.get("max_tokens")
			.and_then(Value::as_i64)
			.unwrap_or(DEFAULT_MAX_TOKENS);
		let mut body = json!({
			"model": model,
			"messages": messages,
			"max_tokens": max_tokens,
		});
		if let Some(system) = system {
			body["system"] = json!(system);
		}
		if let Some(stream) = input.get("stream") {
			body["stream"] = stream.clone();
		}
		let encoded = encode(&body)?;

		Ok(RequestTranslation {
			headers: vec![
				HeaderMutation::Set(":path".to_string(), "/v1/messages".to_string()),
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
		if decoded.is_empty() {
			return Ok(ResponseBodyTranslation::default());
		}
		let upstream: Value =
			serde_json::from_slice(&decoded).map_err(TranslationError::InvalidResponse)?;
		let text = upstream
			.get("content")
			.and_then(Value::as_array)
			.and_then(|blocks| blocks.iter().find(|b| b.get("type").and_then(Value::as_str) == Some("text")))
			.and_then(|b| b.get("text"))
			.and_then(Value::as_str)
			.unwrap_or_default();
		let finish_reason = match upstream.get("stop_reason").and_then(Value::as_str) {
			Some("max_tokens") => "length",
			_ => "stop",
		};
		let usage = upstream.get("usage").and_then(|u| {
			let input = u.get("input_tokens")?.as_i64()?;
			let output = u.get("output_tokens")?.as_i64()?;
			Some(TokenUsage::with_derived_total(input, output))
		});
		let envelope = openai_completion_envelope(&self.model, text, finish_reason, usage);
		let encoded = encode(&envelope)?;
		let mut headers = vec![content_length_mutation(&encoded)];
		if self.common.content_encoding_gzip {
			headers.push(StreamingCommon::drop_content_encoding());
		}
		Ok(ResponseBodyTranslation {
			headers,
			body: Some(encoded),
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
	fn extracts_system_prompt_and_defaults_max_tokens() {
		let mut t = AnthropicTranslator::new();
		let body = br#"{"messages":[{"role":"system","content":"be terse"},{"role":"user","content":"hi"}]}"#;
		let out = t.request_body(body, Some("claude-3-5-sonnet")).unwrap();
		let parsed: Value = serde_json::from_slice(&out.body.unwrap()).unwrap();
		assert_eq!(parsed["system"], "be terse");
		assert_eq!(parsed["messages"].as_array().unwrap().len(), 1);
		assert_eq!(parsed["max_tokens"], DEFAULT_MAX_TOKENS);
	}

	#[tokio::test]
	async fn translates_messages_response_to_openai_shape() {
		let mut t = AnthropicTranslator::new();
		t.model = "claude".to_string();
		let upstream =
			br#"{"content":[{"type":"text","text":"hi there"}],"usage":{"input_tokens":5,"output_tokens":3},"stop_reason":"end_turn"}"#;
		let out = t.response_body(upstream, true).await.unwrap();
		let parsed: Value = serde_json::from_slice(&out.body.unwrap()).unwrap();
		assert_eq!(parsed["choices"][0]["message"]["content"], "hi there");
		assert_eq!(parsed["choices"][0]["finish_reason"], "stop");
	}
}
