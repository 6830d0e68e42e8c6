//! DAP wire framing: `Content-Length` headers around JSON bodies.
//!
//! [`encode_message`] writes one frame. [`FrameDecoder`] is incremental:
//! bytes are pushed as they arrive and complete frames are pulled out with
//! [`FrameDecoder::next_frame`].

use regex::Regex;

use crate::error::DapError;
use crate::protocol::ProtocolMessage;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const JSONRPC_CONTENT_TYPE: &str = "application/vscode-jsonrpc";

/// Largest accepted frame body (64 MiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Longest header block accepted before `\r\n\r\n` must appear.
pub const MAX_HEADER_SIZE: usize = 8 * 1024;

/// Encode a message into a DAP frame.
///
/// Only `Content-Length` is written; it counts the UTF-8 bytes of the body.
pub fn encode_message(message: &ProtocolMessage) -> Result<Vec<u8>, DapError> {
    let body = serde_json::to_vec(message)?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut buf = Vec::with_capacity(header.len() + body.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Incremental frame decoder.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    param_regex: Regex,
}

impl FrameDecoder {
    /// Create a decoder with an empty buffer.
    pub fn new() -> Self {
        // `name=value` or `name="value"` pairs of a Content-Type header.
        let param_regex = Regex::new(r#"(\w+)\s*=\s*(?:(?:"([^"]*)")|([^;,\s]*))"#)
            .expect("content-type parameter regex is valid");
        Self {
            buffer: Vec::new(),
            param_regex,
        }
    }

    /// Append received bytes to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of bytes waiting for a complete frame.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Discard everything buffered.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Pull the next complete frame out of the buffer.
    ///
    /// Returns `Ok(None)` when more bytes are needed. A frame whose body is
    /// a JSON array yields all of its messages in order. On error the whole
    /// buffer is discarded, since the stream position can no longer be
    /// trusted.
    pub fn next_frame(&mut self) -> Result<Option<Vec<ProtocolMessage>>, DapError> {
        match self.try_next_frame() {
            Ok(frame) => Ok(frame),
            Err(e) => {
                tracing::warn!(error = %e, discarded = self.buffer.len(), "dropping receive buffer");
                self.buffer.clear();
                Err(e)
            }
        }
    }

    fn try_next_frame(&mut self) -> Result<Option<Vec<ProtocolMessage>>, DapError> {
        let Some(header_end) = find_subslice(&self.buffer, HEADER_TERMINATOR) else {
            if self.buffer.len() > MAX_HEADER_SIZE {
                return Err(DapError::InvalidHeader(format!(
                    "no header terminator within {MAX_HEADER_SIZE} bytes"
                )));
            }
            return Ok(None);
        };
        if header_end > MAX_HEADER_SIZE {
            return Err(DapError::InvalidHeader(format!(
                "header block exceeds {MAX_HEADER_SIZE} bytes"
            )));
        }

        let header = std::str::from_utf8(&self.buffer[..header_end])
            .map_err(|e| DapError::InvalidHeader(format!("header is not ASCII: {e}")))?;
        let content_length = self.parse_headers(header)?;

        let body_start = header_end + HEADER_TERMINATOR.len();
        let frame_end = body_start
            .checked_add(content_length)
            .ok_or_else(|| DapError::InvalidHeader(format!("Content-Length {content_length} overflows")))?;
        if self.buffer.len() < frame_end {
            return Ok(None);
        }

        let frame: Vec<u8> = self.buffer.drain(..frame_end).collect();
        let body = &frame[body_start..];
        tracing::trace!(bytes = body.len(), "decoded frame");
        decode_body(body).map(Some)
    }

    /// Validate the header block and return the body length.
    fn parse_headers(&self, header: &str) -> Result<usize, DapError> {
        let mut content_length = None;
        for line in header.split("\r\n") {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => {
                    let len = value.parse::<usize>().map_err(|e| {
                        DapError::InvalidHeader(format!(
                            "invalid Content-Length value '{value}': {e}"
                        ))
                    })?;
                    if len > MAX_FRAME_SIZE {
                        return Err(DapError::InvalidHeader(format!(
                            "Content-Length {len} exceeds the {MAX_FRAME_SIZE} byte limit"
                        )));
                    }
                    content_length = Some(len);
                }
                "content-type" => self.check_content_type(value)?,
                _ => {}
            }
        }
        content_length.ok_or_else(|| DapError::InvalidHeader("missing Content-Length header".into()))
    }

    fn check_content_type(&self, value: &str) -> Result<(), DapError> {
        let (media_type, params) = value.split_once(';').unwrap_or((value, ""));
        let media_type = media_type.trim().to_ascii_lowercase();
        if media_type != JSONRPC_CONTENT_TYPE {
            return Err(DapError::InvalidHeader(format!(
                "unsupported content type '{media_type}'"
            )));
        }

        for caps in self.param_regex.captures_iter(params) {
            let name = caps.get(1).map_or("", |m| m.as_str());
            if !name.eq_ignore_ascii_case("charset") {
                continue;
            }
            let charset = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str())
                .to_ascii_lowercase();
            if charset != "utf-8" && charset != "utf8" {
                return Err(DapError::InvalidHeader(format!(
                    "unsupported charset '{charset}'"
                )));
            }
        }
        Ok(())
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a frame body: one message object or an array of them.
fn decode_body(body: &[u8]) -> Result<Vec<ProtocolMessage>, DapError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| DapError::InvalidResponse(format!("JSON parse error: {e}")))?;
    match value {
        serde_json::Value::Array(items) => items.into_iter().map(decode_one).collect(),
        other => decode_one(other).map(|m| vec![m]),
    }
}

fn decode_one(value: serde_json::Value) -> Result<ProtocolMessage, DapError> {
    serde_json::from_value(value)
        .map_err(|e| DapError::InvalidResponse(format!("not a DAP message: {e}")))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Event, Request};
    use serde_json::json;

    fn frame(body: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
    }

    fn event_body(seq: i64, event: &str) -> String {
        json!({"seq": seq, "type": "event", "event": event}).to_string()
    }

    fn decode_all(decoder: &mut FrameDecoder) -> Vec<ProtocolMessage> {
        let mut out = Vec::new();
        while let Some(batch) = decoder.next_frame().unwrap() {
            out.extend(batch);
        }
        out
    }

    #[test]
    fn codec_encode_writes_only_content_length() {
        let msg = ProtocolMessage::Request(Request {
            seq: 1,
            command: "next".into(),
            arguments: Some(json!({"threadId": 1})),
        });
        let bytes = encode_message(&msg).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let (header, body) = text.split_once("\r\n\r\n").unwrap();
        assert_eq!(header, format!("Content-Length: {}", body.len()));
        assert!(!text.contains("Content-Type"));
        assert!(body.contains(r#""command":"next""#));
        assert!(body.contains(r#""threadId":1"#));
    }

    #[test]
    fn codec_encode_counts_utf8_bytes() {
        let msg = ProtocolMessage::Event(Event {
            seq: 1,
            event: "output".into(),
            body: Some(json!({"output": "héllo ✓"})),
        });
        let bytes = encode_message(&msg).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        let (_, body) = text.split_once("\r\n\r\n").unwrap();
        assert!(text.starts_with(&format!("Content-Length: {}\r\n", body.len())));
        assert!(body.len() > body.chars().count());
    }

    #[test]
    fn codec_partial_frames_wait_for_completion() {
        let bytes = frame(&event_body(1, "initialized"));
        let mut decoder = FrameDecoder::new();

        for (i, byte) in bytes.iter().enumerate() {
            decoder.push(std::slice::from_ref(byte));
            let result = decoder.next_frame().unwrap();
            if i + 1 < bytes.len() {
                assert!(result.is_none(), "decoded early at byte {i}");
            } else {
                let msgs = result.unwrap();
                assert_eq!(msgs.len(), 1);
                assert_eq!(msgs[0].kind(), "event");
            }
        }
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn codec_multiple_frames_in_one_chunk() {
        let mut bytes = frame(&event_body(1, "initialized"));
        bytes.extend(frame(&event_body(2, "output")));
        let tail = frame(&event_body(3, "stopped"));
        bytes.extend_from_slice(&tail[..10]);

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);
        let msgs = decode_all(&mut decoder);
        assert_eq!(msgs.iter().map(|m| m.seq()).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(decoder.buffered_len(), 10);

        decoder.push(&tail[10..]);
        let msgs = decode_all(&mut decoder);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].seq(), 3);
    }

    #[test]
    fn codec_extra_headers_and_case_insensitive_names() {
        let body = event_body(1, "output");
        let bytes = format!(
            "X-Custom: yes\r\ncontent-length: {}\r\nContent-Type: application/vscode-jsonrpc; charset=\"UTF-8\"\r\n\r\n{}",
            body.len(),
            body
        );
        let mut decoder = FrameDecoder::new();
        decoder.push(bytes.as_bytes());
        assert_eq!(decode_all(&mut decoder).len(), 1);
    }

    #[test]
    fn codec_accepts_bare_utf8_charset() {
        let body = event_body(1, "output");
        let bytes = format!(
            "Content-Length: {}\r\nContent-Type: application/vscode-jsonrpc; charset=utf8\r\n\r\n{}",
            body.len(),
            body
        );
        let mut decoder = FrameDecoder::new();
        decoder.push(bytes.as_bytes());
        assert_eq!(decode_all(&mut decoder).len(), 1);
    }

    #[test]
    fn codec_non_ascii_body() {
        let body = json!({
            "seq": 4,
            "type": "event",
            "event": "output",
            "body": {"output": "Grüße, 世界\n"}
        })
        .to_string();
        let mut decoder = FrameDecoder::new();
        decoder.push(&frame(&body));
        let msgs = decode_all(&mut decoder);
        match &msgs[0] {
            ProtocolMessage::Event(e) => {
                assert_eq!(e.body.as_ref().unwrap()["output"], "Grüße, 世界\n")
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn codec_missing_content_length_is_error() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"Bad-Header: 42\r\n\r\n{}");
        let err = decoder.next_frame().unwrap_err();
        assert!(err.to_string().contains("missing Content-Length"), "got: {err}");
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn codec_invalid_content_length_is_error() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"Content-Length: lots\r\n\r\n{}");
        assert!(matches!(decoder.next_frame(), Err(DapError::InvalidHeader(_))));
    }

    #[test]
    fn codec_unsupported_charset_is_error() {
        let body = event_body(1, "output");
        let bytes = format!(
            "Content-Length: {}\r\nContent-Type: application/vscode-jsonrpc; charset=latin-1\r\n\r\n{}",
            body.len(),
            body
        );
        let mut decoder = FrameDecoder::new();
        decoder.push(bytes.as_bytes());
        let err = decoder.next_frame().unwrap_err();
        assert!(err.to_string().contains("latin-1"), "got: {err}");
    }

    #[test]
    fn codec_unsupported_content_type_is_error() {
        let bytes = b"Content-Length: 2\r\nContent-Type: text/plain\r\n\r\n{}";
        let mut decoder = FrameDecoder::new();
        decoder.push(bytes);
        assert!(matches!(decoder.next_frame(), Err(DapError::InvalidHeader(_))));
    }

    #[test]
    fn codec_batch_array_decodes_in_order() {
        let body = json!([
            {"seq": 1, "type": "event", "event": "output", "body": {"output": "a"}},
            {"seq": 2, "type": "response", "request_seq": 1, "success": true, "command": "launch"}
        ])
        .to_string();
        let mut decoder = FrameDecoder::new();
        decoder.push(&frame(&body));
        let msgs = decoder.next_frame().unwrap().unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].kind(), "event");
        assert_eq!(msgs[1].kind(), "response");
    }

    #[test]
    fn codec_unknown_type_is_error() {
        let body = json!({"seq": 1, "type": "notification", "method": "x"}).to_string();
        let mut decoder = FrameDecoder::new();
        decoder.push(&frame(&body));
        assert!(matches!(decoder.next_frame(), Err(DapError::InvalidResponse(_))));
    }

    #[test]
    fn codec_huge_content_length_is_error() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"Content-Length: 18446744073709551615\r\n\r\n{}");
        let err = decoder.next_frame().unwrap_err();
        assert!(matches!(err, DapError::InvalidHeader(_)), "got {err:?}");
        assert_eq!(decoder.buffered_len(), 0);

        decoder.push(format!("Content-Length: {}\r\n\r\n", MAX_FRAME_SIZE + 1).as_bytes());
        assert!(matches!(decoder.next_frame(), Err(DapError::InvalidHeader(_))));
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn codec_unterminated_header_is_bounded() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&vec![b'x'; MAX_HEADER_SIZE]);
        assert!(decoder.next_frame().unwrap().is_none());

        decoder.push(b"xx");
        let err = decoder.next_frame().unwrap_err();
        assert!(matches!(err, DapError::InvalidHeader(_)), "got {err:?}");
        assert_eq!(decoder.buffered_len(), 0);

        decoder.push(&frame(&event_body(1, "initialized")));
        assert_eq!(decode_all(&mut decoder).len(), 1);
    }

    #[test]
    fn codec_error_discards_buffer_and_recovers() {
        let mut bytes = frame("{not json");
        bytes.extend(frame(&event_body(2, "output")));
        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);

        assert!(decoder.next_frame().is_err());
        assert_eq!(decoder.buffered_len(), 0);
        assert!(decoder.next_frame().unwrap().is_none());

        decoder.push(&frame(&event_body(3, "output")));
        let msgs = decode_all(&mut decoder);
        assert_eq!(msgs[0].seq(), 3);
    }
}
