use std::time::Instant;

use aigw_config::CredentialRef;
use aigw_schema::{TokenUsage, Translator};
use aigw_telemetry::{GenAiOperation, RequestSpan};
use bytes::BytesMut;

/// Everything carried across the phases of one `Process` stream. One
/// instance per gRPC call; never shared across streams.
pub struct RequestState {
	pub path: String,
	pub headers: http::HeaderMap,
	pub body_buf: BytesMut,
	pub body_buffer_limit: usize,
	pub request_model: Option<String>,
	pub translator: Option<Box<dyn Translator>>,
	pub credential_ref: Option<CredentialRef>,
	pub operation: Option<GenAiOperation>,
	pub span: Option<RequestSpan>,
	pub usage_recorded: bool,
	pub streaming: bool,
	pub started_at: Instant,
	pub first_chunk_at: Option<Instant>,
	pub last_chunk_at: Option<Instant>,
}

impl RequestState {
	pub fn new(body_buffer_limit: usize) -> Self {
		Self {
			path: String::new(),
			headers: http::HeaderMap::new(),
			body_buf: BytesMut::new(),
			body_buffer_limit,
			request_model: None,
			translator: None,
			credential_ref: None,
			operation: None,
			span: None,
			usage_recorded: false,
			streaming: false,
			started_at: Instant::now(),
			first_chunk_at: None,
			last_chunk_at: None,
		}
	}

	/// `true` once appending `chunk` would push the buffered request body
	/// past the configured limit.
	pub fn would_overflow(&self, chunk: &[u8]) -> bool {
		self.body_buf.len() + chunk.len() > self.body_buffer_limit
	}

	/// Records arrival of one response chunk and returns the latency to
	/// attribute it with: time-to-first-byte for the first chunk, the gap
	/// since the previous chunk for every one after.
	pub fn observe_response_chunk(&mut self) -> std::time::Duration {
		let now = Instant::now();
		let elapsed = match self.first_chunk_at {
			None => now.duration_since(self.started_at),
			Some(_) => now.duration_since(self.last_chunk_at.unwrap_or(self.started_at)),
		};
		self.first_chunk_at.get_or_insert(now);
		self.last_chunk_at = Some(now);
		elapsed
	}

	pub fn record_usage(&mut self, usage: &TokenUsage) {
		self.usage_recorded = true;
		if let Some(span) = &mut self.span {
			span.record_usage(usage);
		}
	}
}
