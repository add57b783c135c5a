use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use super::{content_length_mutation, encode, parse_json};
use crate::translator::{StreamingCommon, Translator, TranslatorState};
use crate::types::{HeaderMutation, RequestTranslation, ResponseBodyTranslation, TranslationError};

#[derive(Clone, Copy)]
pub enum AzureEndpointKind {
	ChatCompletions,
	Embeddings,
}

impl AzureEndpointKind {
	fn segment(self) -> &'static str {
		match self {
			AzureEndpointKind::ChatCompletions => "chat/completions",
			AzureEndpointKind::Embeddings => "embeddings",
		}
	}
}

/// OpenAI ↔ Azure OpenAI. Azure keeps OpenAI's request/response body shape
/// but moves the model selection into the URL path (`deployments/{name}`)
/// and requires an `api-version` query parameter; the body's `model` field
/// is dropped since it would be redundant with the deployment.
pub struct AzureOpenAiTranslator {
	kind: AzureEndpointKind,
	api_version: String,
	common: StreamingCommon,
}

impl AzureOpenAiTranslator {
	pub fn new(kind: AzureEndpointKind, api_version: impl Into<String>) -> Self {
		Self {
			kind,
			api_version: api_version.into(),
			common: StreamingCommon::new(),
		}
	}
}

#[async_trait]
impl Translator for AzureOpenAiTranslator {
	fn request_body(
		&mut self,
		raw: &[u8],
		model_override: Option<&str>,
	) -> Result<RequestTranslation, TranslationError> {
		let mut input = parse_json(raw)?;
		let deployment = model_override
			.map(str::to_string)
			.or_else(|| input.get("model").and_then(Value::as_str).map(str::to_string))
			.ok_or_else(|| TranslationError::ModelNotRepresentable("missing model".to_string()))?;
		if let Some(obj) = input.as_object_mut() {
			obj.remove("model");
		}
		let encoded = encode(&input)?;
		let path = format!(
			"/openai/deployments/{deployment}/{}?api-version={}",
			self.kind.segment(),
			self.api_version
		);
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
			// Azure's response body is already OpenAI-shaped; no rewrite needed
			// beyond pulling usage out of it.
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
