use bytes::{Buf, Bytes, BytesMut};

/// One decoded server-sent event. Comment lines (`:`) and unrecognized
/// fields are dropped; only `data:` is meaningful to every provider this
/// gateway translates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
	Data(String),
	/// The `data: [DONE]` sentinel OpenAI-style streams send as their final
	/// frame.
	Done,
}

/// Incremental SSE decoder working off a sliding buffer framed on `\n\n`.
/// Frames are returned in the order their framing boundary was observed;
/// a partial trailing frame is held back until more bytes arrive.
#[derive(Debug, Default)]
pub struct SseDecoder {
	buf: BytesMut,
}

impl SseDecoder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, chunk: &[u8]) {
		self.buf.extend_from_slice(chunk);
	}

	/// Drain every complete (`\n\n`-terminated) frame currently buffered.
	/// An incomplete trailing frame is left in the buffer for the next
	/// `push`.
	pub fn drain_frames(&mut self) -> Vec<SseFrame> {
		let mut out = Vec::new();
		loop {
			let Some(boundary) = find_double_newline(&self.buf) else {
				break;
			};
			let frame = self.buf.split_to(boundary.0);
			self.buf.advance(boundary.1 - boundary.0);
			if let Some(parsed) = parse_frame(&frame) {
				out.push(parsed);
			}
		}
		out
	}

	/// Flush whatever remains in the buffer as a final frame, used at
	/// `end_of_stream` for providers that don't terminate with a blank
	/// line.
	pub fn flush(&mut self) -> Option<SseFrame> {
		if self.buf.is_empty() {
			return None;
		}
		let frame = self.buf.split();
		parse_frame(&frame)
	}
}

/// Returns `(frame_end, boundary_end)`: bytes `[0, frame_end)` are the frame
/// body, `boundary_end` is where the next frame starts. Handles both `\n\n`
/// and `\r\n\r\n`.
fn find_double_newline(buf: &[u8]) -> Option<(usize, usize)> {
	for i in 0..buf.len() {
		if buf[i..].starts_with(b"\n\n") {
			return Some((i, i + 2));
		}
		if buf[i..].starts_with(b"\r\n\r\n") {
			return Some((i, i + 4));
		}
	}
	None
}

fn parse_frame(frame: &[u8]) -> Option<SseFrame> {
	let text = std::str::from_utf8(frame).ok()?;
	let mut data = String::new();
	for line in text.lines() {
		let Some(rest) = line.strip_prefix("data:") else {
			continue;
		};
		let rest = rest.strip_prefix(' ').unwrap_or(rest);
		if !data.is_empty() {
			data.push('\n');
		}
		data.push_str(rest);
	}
	if data.is_empty() {
		return None;
	}
	if data == "[DONE]" {
		Some(SseFrame::Done)
	} else {
		Some(SseFrame::Data(data))
	}
}

pub fn encode_data_frame(payload: &str) -> Bytes {
	Bytes::from(format!("data: {payload}\n\n"))
}

pub fn encode_done_frame() -> Bytes {
	Bytes::from_static(b"data: [DONE]\n\n")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_single_frame() {
		let mut dec = SseDecoder::new();
		dec.push(b"data: {\"a\":1}\n\n");
		assert_eq!(
			dec.drain_frames(),
			vec![SseFrame::Data("{\"a\":1}".to_string())]
		);
	}

	#[test]
	fn preserves_order_across_pushes() {
		let mut dec = SseDecoder::new();
		dec.push(b"data: one\n\ndata: tw");
		assert_eq!(dec.drain_frames(), vec![SseFrame::Data("one".into())]);
		dec.push(b"o\n\n");
		assert_eq!(dec.drain_frames(), vec![SseFrame::Data("two".into())]);
	}

	#[test]
	fn recognizes_done_sentinel() {
		let mut dec = SseDecoder::new();
		dec.push(b"data: [DONE]\n\n");
		assert_eq!(dec.drain_frames(), vec![SseFrame::Done]);
	}

	#[test]
	fn multi_line_data_is_joined() {
		let mut dec = SseDecoder::new();
		dec.push(b"data: line1\ndata: line2\n\n");
		assert_eq!(
			dec.drain_frames(),
			vec![SseFrame::Data("line1\nline2".to_string())]
		);
	}
}
