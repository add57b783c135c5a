pub mod anthropic;
pub mod azureopenai;
pub mod bedrock;
pub mod cohere;
pub mod openai;
pub mod vertex;

use bytes::Bytes;
use serde_json::Value;

use crate::types::{HeaderMutation, TokenUsage, TranslationError};

pub(crate) fn parse_json(raw: &[u8]) -> Result<Value, TranslationError> {
	serde_json::from_slice(raw).map_err(TranslationError::InvalidBody)
}

pub(crate) fn apply_model_override(body: &mut Value, model_override: Option<&str>) {
	if let Some(model) = model_override {
		if let Some(obj) = body.as_object_mut() {
			obj.insert("model".to_string(), Value::String(model.to_string()));
		}
	}
}

pub(crate) fn content_length_mutation(body: &[u8]) -> HeaderMutation {
	HeaderMutation::Set("content-length".to_string(), body.len().to_string())
}

pub(crate) fn encode(body: &Value) -> Result<Bytes, TranslationError> {
	serde_json::to_vec(body)
		.map(Bytes::from)
		.map_err(TranslationError::InvalidBody)
}

/// OpenAI `choices[0].message.content == text` shape shared by every
/// non-streaming translator that terminates in OpenAI's response schema.
pub(crate) fn openai_completion_envelope(
	model: &str,
	content: &str,
	finish_reason: &str,
	usage: Option<crate::types::TokenUsage>,
) -> Value {
	let mut envelope = serde_json::json!({
		"id": "chatcmpl-translated",
		"object": "chat.completion",
		"model": model,
		"choices": [{
			"index": 0,
			"message": { "role": "assistant", "content": content },
			"finish_reason": finish_reason,
		}],
	});
	if let Some(usage) = usage {
		envelope["usage"] = serde_json::json!({
			"prompt_tokens": usage.input,
			"completion_tokens": usage.output,
			"total_tokens": usage.total,
		});
	}
	envelope
}

fn usage_from_value(value: &Value) -> Option<TokenUsage> {
	let input = value.get("prompt_tokens")?.as_i64()?;
	let output = value.get("completion_tokens")?.as_i64()?;
	let total = value.get("total_tokens").and_then(Value::as_i64);
	Some(match total {
		Some(total) => TokenUsage::from_i64_saturating(input, output, total),
		None => TokenUsage::with_derived_total(input, output),
	})
}

/// Pulls `usage.{prompt_tokens,completion_tokens,total_tokens}` out of an
/// OpenAI-shaped JSON body. Shared by every translator whose response body
/// is already OpenAI-shaped (OpenAI passthrough, Azure, Vertex).
pub(crate) fn extract_openai_usage(body: &[u8]) -> Option<TokenUsage> {
	let value: Value = serde_json::from_slice(body).ok()?;
	usage_from_value(value.get("usage")?)
}

pub(crate) fn openai_error_translation(status: u16, body: &[u8]) -> Bytes {
	if status < 300 {
		return Bytes::copy_from_slice(body);
	}
	if serde_json::from_slice::<Value>(body).is_ok() {
		return Bytes::copy_from_slice(body);
	}
	let message = String::from_utf8_lossy(body);
	crate::error::openai_error_body(&message, "upstream_error", Some(&status.to_string()))
}
