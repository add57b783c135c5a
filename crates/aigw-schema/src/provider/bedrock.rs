use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};

use super::{content_length_mutation, encode, openai_completion_envelope, parse_json};
use crate::translator::{StreamingCommon, Translator, TranslatorState};
use crate::types::{
	HeaderMutation, RequestTranslation, ResponseBodyTranslation, TokenUsage, TranslationError,
};

/// OpenAI chat-completions ↔ AWS Bedrock Converse.
pub struct BedrockConverseTranslator {
	common: StreamingCommon,
	model: String,
}

impl BedrockConverseTranslator {
	pub fn new() -> Self {
		Self {
			common: StreamingCommon::new(),
			model: String::new(),
		}
	}
}

impl Default for BedrockConverseTranslator {
	fn default() -> Self {
		Self::new()
	}
}

fn openai_message_to_converse(message: &Value) -> Value {
	let role = message.get("role").cloned().unwrap_or(json!("user"));
	let content = match message.get("content") {
		Some(Value::String(s)) => json!([{ "text": s }]),
		Some(Value::Array(items)) => Value::Array(
			items
				.iter()
				.map(|item| {
					if let Some(text) = item.get("text").and_then(Value::as_str) {
						json!({ "text": text })
					} else {
						item.clone()
					}
				})
				.collect(),
		),
		_ => json!([]),
	};
	json!({ "role": role, "content": content })
}

#[async_trait]
impl Translator for BedrockConverseTranslator {
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

		let messages = input
			.get("messages")
			.and_then(Value::as_array)
			.map(|ms| ms.iter().map(openai_message_to_converse).collect::<Vec<_>>())
			.unwrap_or_default();

		let mut inference_config = serde_json::Map::new();
		if let Some(max_tokens) = input.get("max_tokens").and_then(Value::as_i64) {
			if max_tokens == 0 {
				return Err(TranslationError::UnsupportedField(
					"max_tokens=0 is not representable in Bedrock Converse".to_string(),
				));
			}
			inference_config.insert("maxTokens".to_string(), json!(max_tokens));
		}
		if let Some(stop) = input.get("stop") {
			inference_config.insert("stopSequences".to_string(), stop.clone());
		}
		if let Some(temperature) = input.get("temperature") {
			inference_config.insert("temperature".to_string(), temperature.clone());
		}

		let mut body = json!({ "messages": messages });
		if !inference_config.is_empty() {
			body["inferenceConfig"] = Value::Object(inference_config);
		}
		let encoded = encode(&body)?;
		let stream = input.get("stream").and_then(Value::as_bool).unwrap_or(false);
		let path = if stream {
			format!("/model/{model}/converse-stream")
		} else {
			format!("/model/{model}/converse")
		};

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
		if decoded.is_empty() {
			return Ok(ResponseBodyTranslation::default());
		}
		let upstream: Value =
			serde_json::from_slice(&decoded).map_err(TranslationError::InvalidResponse)?;
		let text = upstream
			.pointer("/output/message/content/0/text")
			.and_then(Value::as_str)
			.unwrap_or_default();
		let finish_reason = match upstream.get("stopReason").and_then(Value::as_str) {
			Some("max_tokens") => "length",
			_ => "stop",
		};
		let usage = upstream.get("usage").and_then(|u| {
			let input = u.get("inputTokens")?.as_i64()?;
			let output = u.get("outputTokens")?.as_i64()?;
			let total = u.get("totalTokens").and_then(Value::as_i64);
			Some(match total {
				Some(total) => TokenUsage::from_i64_saturating(input, output, total),
				None => TokenUsage::with_derived_total(input, output),
			})
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
