use async_trait::async_trait;
use bytes::Bytes;

use super::{apply_model_override, content_length_mutation, encode, extract_openai_usage, parse_json};
use crate::translator::{StreamingCommon, Translator, TranslatorState};
use crate::types::{
	HeaderMutation, RequestTranslation, ResponseBodyTranslation, TokenUsage, TranslationError,
};

/// Identity translator: OpenAI in, OpenAI out. The only transformation is
/// an optional `model` override; everything else passes through untouched.
pub struct OpenAiTranslator {
	path: &'static str,
	common: StreamingCommon,
}

impl OpenAiTranslator {
	pub fn chat_completions() -> Self {
		Self {
			path: "/v1/chat/completions",
			common: StreamingCommon::new(),
		}
	}

	pub fn embeddings() -> Self {
		Self {
			path: "/v1/embeddings",
			common: StreamingCommon::new(),
		}
	}

	pub fn images() -> Self {
		Self {
			path: "/v1/images/generations",
			common: StreamingCommon::new(),
		}
	}
}

#[async_trait]
impl Translator for OpenAiTranslator {
	fn request_body(
		&mut self,
		raw: &[u8],
		model_override: Option<&str>,
	) -> Result<RequestTranslation, TranslationError> {
		let mut headers = vec![HeaderMutation::Set(":path".to_string(), self.path.to_string())];
		if model_override.is_none() {
			return Ok(RequestTranslation {
				headers,
				body: None,
				mode_override: None,
			});
		}
		let mut body = parse_json(raw)?;
		apply_model_override(&mut body, model_override);
		let encoded = encode(&body)?;
		headers.push(content_length_mutation(&encoded));
		Ok(RequestTranslation {
			headers,
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
		if !self.common.content_encoding_gzip && self.common.is_sse {
			return scan_sse_chunk(&mut self.common, chunk, end_of_stream);
		}

		let Some(decoded) = self.common.buffer_and_decode(chunk, end_of_stream).await else {
			return Ok(ResponseBodyTranslation::default());
		};
		self.common.state = TranslatorState::Drained;
		let usage = if self.common.is_sse {
			self.common.sse.push(&decoded);
			let mut usage = None;
			for frame in self.common.sse.drain_frames() {
				if let crate::sse::SseFrame::Data(data) = frame {
					if let Some(u) = extract_usage_from_text(&data) {
						usage = Some(u);
						break;
					}
				}
			}
			usage
		} else {
			extract_openai_usage(&decoded)
		};

		if !self.common.content_encoding_gzip {
			// Body already matches what Envoy has buffered; only usage was
			// pulled out of it.
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

fn scan_sse_chunk(
	common: &mut StreamingCommon,
	chunk: &[u8],
	end_of_stream: bool,
) -> Result<ResponseBodyTranslation, TranslationError> {
	common.sse.push(chunk);
	let frames = common.sse.drain_frames();
	let mut usage = None;
	for frame in &frames {
		if let crate::sse::SseFrame::Data(data) = frame {
			if !common.usage_seen {
				if let Some(u) = extract_usage_from_text(data) {
					usage = Some(u);
					common.usage_seen = true;
				}
			}
		}
	}
	if end_of_stream {
		common.state = TranslatorState::Drained;
	}
	Ok(ResponseBodyTranslation {
		headers: Vec::new(),
		body: None,
		usage,
	})
}

fn extract_usage_from_text(data: &str) -> Option<TokenUsage> {
	extract_openai_usage(data.as_bytes())
}
