use std::io::Cursor;

use async_compression::tokio::bufread::GzipDecoder;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, BufReader};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Accumulates a response body that may be gzip-compressed, without
/// assuming the first chunk carries the whole 10-byte header. Once enough
/// bytes are buffered to confirm (or rule out) the gzip magic, the decision
/// sticks for the rest of the stream.
#[derive(Debug)]
pub struct GzipFrameBuffer {
	buf: BytesMut,
	verdict: Option<bool>,
}

impl Default for GzipFrameBuffer {
	fn default() -> Self {
		Self::new()
	}
}

impl GzipFrameBuffer {
	pub fn new() -> Self {
		Self {
			buf: BytesMut::new(),
			verdict: None,
		}
	}

	pub fn push(&mut self, chunk: &[u8]) {
		self.buf.extend_from_slice(chunk);
		if self.verdict.is_none() && self.buf.len() >= GZIP_MAGIC.len() {
			self.verdict = Some(self.buf[..GZIP_MAGIC.len()] == GZIP_MAGIC);
		}
	}

	/// `Some(true)` once detected as gzip, `Some(false)` once ruled out,
	/// `None` while still waiting on more header bytes.
	pub fn is_gzip(&self) -> Option<bool> {
		self.verdict
	}

	/// Decode the full buffered body. Called once `end_of_stream` is
	/// reached. If the body never turned out to be gzip, or decoding fails,
	/// the original bytes are returned unmodified — this buffer never drops
	/// a response on the floor over a detection mismatch.
	pub async fn finish(self) -> Bytes {
		if self.verdict != Some(true) {
			return self.buf.freeze();
		}
		let reader = BufReader::new(Cursor::new(self.buf.clone()));
		let mut decoder = GzipDecoder::new(reader);
		let mut out = Vec::new();
		match decoder.read_to_end(&mut out).await {
			Ok(_) => Bytes::from(out),
			Err(_) => self.buf.freeze(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.buf.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn passes_through_non_gzip_bodies() {
		let mut buf = GzipFrameBuffer::new();
		buf.push(b"{\"hello\":\"world\"}");
		assert_eq!(buf.is_gzip(), Some(false));
		assert_eq!(buf.finish().await.as_ref(), b"{\"hello\":\"world\"}");
	}

	#[tokio::test]
	async fn detects_header_split_across_pushes() {
		let mut buf = GzipFrameBuffer::new();
		buf.push(&GZIP_MAGIC[..1]);
		assert_eq!(buf.is_gzip(), None);
		buf.push(&GZIP_MAGIC[1..]);
		assert_eq!(buf.is_gzip(), Some(true));
	}

	#[tokio::test]
	async fn decodes_real_gzip_payload() {
		use async_compression::tokio::write::GzipEncoder;
		use tokio::io::AsyncWriteExt;

		let mut encoder = GzipEncoder::new(Vec::new());
		encoder.write_all(b"payload bytes").await.unwrap();
		encoder.shutdown().await.unwrap();
		let compressed = encoder.into_inner();

		let mut buf = GzipFrameBuffer::new();
		buf.push(&compressed);
		assert_eq!(buf.is_gzip(), Some(true));
		assert_eq!(buf.finish().await.as_ref(), b"payload bytes");
	}
}
