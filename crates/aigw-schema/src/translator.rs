use async_trait::async_trait;
use bytes::Bytes;

use crate::types::{RequestTranslation, ResponseBodyTranslation, TranslationError};

/// The per-request state machine a streaming translator walks through.
/// `Streaming` is only reachable once gzip detection (if any) has resolved
/// one way or the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslatorState {
	IdleHeaders,
	BufferingGzipHeader,
	Streaming,
	Drained,
}

/// A fresh instance is created per request by the [`crate::SchemaRegistry`];
/// translators are stateful across the four calls below and are never
/// reused across requests.
#[async_trait]
pub trait Translator: Send {
	/// Rewrite the outgoing request: canonical `:path`, `model` override,
	/// full schema translation, and `content-length` repair when the body
	/// changes.
	fn request_body(
		&mut self,
		raw: &[u8],
		model_override: Option<&str>,
	) -> Result<RequestTranslation, TranslationError>;

	/// Inspect response headers. Returns header mutations (e.g. removing
	/// `content-encoding` once decompression is scheduled) and arms
	/// internal streaming/gzip state for the `response_body` calls that
	/// follow.
	fn response_headers(&mut self, headers: &http::HeaderMap) -> Vec<crate::types::HeaderMutation>;

	/// Consume one chunk of the response body. For non-streaming bodies the
	/// implementation buffers until `end_of_stream`; for streaming bodies it
	/// incrementally decodes and re-emits frames, preserving order. Async
	/// because a gzip-encoded body can only be fully decoded once buffered,
	/// which goes through `tokio`'s async reader machinery.
	async fn response_body(
		&mut self,
		chunk: &[u8],
		end_of_stream: bool,
	) -> Result<ResponseBodyTranslation, TranslationError>;

	/// Rewrite a non-2xx upstream response into the OpenAI error shape when
	/// its content-type isn't already JSON.
	fn response_error(&mut self, status: u16, body: &[u8]) -> Bytes;

	fn state(&self) -> TranslatorState;
}

/// Shared bookkeeping every streaming [`Translator`] needs: gzip detection,
/// SSE framing, and the stop-on-first-usage scan. Provider translators
/// compose this rather than reimplementing it.
pub(crate) struct StreamingCommon {
	pub gzip: crate::gzip::GzipFrameBuffer,
	pub sse: crate::sse::SseDecoder,
	pub is_sse: bool,
	pub content_encoding_gzip: bool,
	pub usage_seen: bool,
	pub state: TranslatorState,
}

impl StreamingCommon {
	pub fn new() -> Self {
		Self {
			gzip: crate::gzip::GzipFrameBuffer::new(),
			sse: crate::sse::SseDecoder::new(),
			is_sse: false,
			content_encoding_gzip: false,
			usage_seen: false,
			state: TranslatorState::IdleHeaders,
		}
	}

	/// Inspect `content-type`/`content-encoding` and arm the corresponding
	/// state. Returns the header mutation set to hand back to the caller
	/// (empty unless gzip is detected, in which case `content-encoding` is
	/// provisionally scheduled for removal once decoding completes).
	pub fn observe_headers(&mut self, headers: &http::HeaderMap) -> Vec<crate::types::HeaderMutation> {
		self.is_sse = headers
			.get(http::header::CONTENT_TYPE)
			.and_then(|v| v.to_str().ok())
			.is_some_and(|v| v.starts_with("text/event-stream"));
		self.content_encoding_gzip = headers
			.get(http::header::CONTENT_ENCODING)
			.and_then(|v| v.to_str().ok())
			.is_some_and(|v| v.eq_ignore_ascii_case("gzip"));
		self.state = if self.content_encoding_gzip {
			TranslatorState::BufferingGzipHeader
		} else {
			TranslatorState::Streaming
		};
		Vec::new()
	}

	/// Accumulate one chunk and, once `end_of_stream` is reached, return the
	/// fully decoded body — transparently passing plain bytes through and
	/// gzip-decoding when `content-encoding: gzip` was observed. `None`
	/// while more chunks are still expected.
	pub async fn buffer_and_decode(&mut self, chunk: &[u8], end_of_stream: bool) -> Option<Bytes> {
		self.gzip.push(chunk);
		if !end_of_stream {
			return None;
		}
		let finished = std::mem::take(&mut self.gzip);
		Some(finished.finish().await)
	}

	/// Header mutation removing `content-encoding`, emitted once a gzip body
	/// has actually been decoded and replaced.
	pub fn drop_content_encoding() -> crate::types::HeaderMutation {
		crate::types::HeaderMutation::Remove("content-encoding".to_string())
	}
}
