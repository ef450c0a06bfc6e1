//! Reply Frame Decoding
//!
//! A streamed reply is a sequence of frames separated by a blank line. Each
//! frame carries a `data:` line holding a JSON object with optional fields
//! `token`, `reply`, `done`, `intent` and `error`.
//!
//! ```text
//! data: {"token":"Hel"}
//!
//! data: {"token":"lo"}
//!
//! data: {"done":true,"intent":"AI_REPLY"}
//! ```
//!
//! Malformed frames are skipped; one bad frame never aborts a stream.

use serde::Deserialize;
use serde_json::Value;

/// Separator between frames on a chunked body
const FRAME_SEPARATOR: &[u8] = b"\n\n";

/// Prefix of the payload line inside a frame
const DATA_PREFIX: &str = "data:";

/// JSON payload of a frame
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FramePayload {
    /// Incremental token
    #[serde(default)]
    pub token: Option<String>,
    /// Legacy whole-reply payload
    #[serde(default)]
    pub reply: Option<String>,
    /// Truthy once the reply is complete
    #[serde(default)]
    pub done: Option<Value>,
    /// Classification tag sent with `done`
    #[serde(default)]
    pub intent: Option<String>,
    /// Truthy when the backend failed
    #[serde(default)]
    pub error: Option<Value>,
}

/// What a frame asks the consumer to do, in order
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameAction {
    /// Append a piece of text
    Token(String),
    /// Finish successfully
    Done {
        /// Classification tag
        intent: Option<String>,
    },
    /// Finish with a failure
    Error(String),
}

impl FramePayload {
    /// Translate the payload into actions
    ///
    /// Order: `token`, then `reply` when no token is present, then `done`,
    /// then `error` when no token is present.
    #[must_use]
    pub fn actions(self) -> Vec<FrameAction> {
        let mut actions = Vec::new();
        let has_token = self.token.as_deref().is_some_and(|t| !t.is_empty());

        if let Some(token) = self.token.filter(|t| !t.is_empty()) {
            actions.push(FrameAction::Token(token));
        }
        if !has_token {
            if let Some(reply) = self.reply.filter(|r| !r.is_empty()) {
                actions.push(FrameAction::Token(reply));
            }
        }
        if self.done.as_ref().is_some_and(truthy) {
            actions.push(FrameAction::Done {
                intent: self.intent,
            });
        }
        if !has_token {
            if let Some(error) = self.error.filter(truthy) {
                actions.push(FrameAction::Error(describe_error(&error)));
            }
        }
        actions
    }
}

/// JSON truthiness: everything except `null`, `false`, `0` and `""`
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn describe_error(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), str::to_string),
        other => other.to_string(),
    }
}

/// Find the payload of the first `data:` line of a frame
#[must_use]
pub fn data_line(frame: &str) -> Option<&str> {
    frame
        .lines()
        .find_map(|line| line.strip_prefix(DATA_PREFIX))
        .map(str::trim_start)
}

/// Parse a frame payload, logging and discarding anything malformed
#[must_use]
pub fn parse_payload(data: &str) -> Option<FramePayload> {
    match serde_json::from_str::<FramePayload>(data) {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::debug!(error = %e, data = %data, "Skipping malformed frame");
            None
        }
    }
}

/// Splits a chunked body into frames
///
/// Bytes are buffered until a separator arrives, so frames and UTF-8
/// sequences split across chunks are reassembled.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and take every frame it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = find_separator(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..pos + FRAME_SEPARATOR.len()).collect();
            let frame = String::from_utf8_lossy(&raw[..pos]).into_owned();
            if !frame.trim().is_empty() {
                frames.push(frame);
            }
        }
        frames
    }

    /// Take whatever is left once the body has ended
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let frame = String::from_utf8_lossy(&rest).into_owned();
        if frame.trim().is_empty() {
            None
        } else {
            Some(frame)
        }
    }
}

fn find_separator(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(FRAME_SEPARATOR.len())
        .position(|window| window == FRAME_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn actions(data: &str) -> Vec<FrameAction> {
        parse_payload(data).unwrap().actions()
    }

    #[test]
    fn test_decoder_splits_frames() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"data: {\"token\":\"a\"}\n\ndata: {\"token\":\"b\"}\n\n");
        assert_eq!(frames, vec!["data: {\"token\":\"a\"}", "data: {\"token\":\"b\"}"]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_decoder_reassembles_across_chunks() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"tok").is_empty());
        assert!(decoder.push(b"en\":\"x\"}\n").is_empty());
        assert_eq!(decoder.push(b"\ndata:"), vec!["data: {\"token\":\"x\"}"]);
        assert_eq!(decoder.finish().as_deref(), Some("data:"));
    }

    #[test]
    fn test_decoder_keeps_split_utf8_intact() {
        let frame = "data: {\"token\":\"ção\"}\n\n".as_bytes();
        // Split inside the two-byte 'ç'
        let split = frame.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&frame[..split]).is_empty());
        let frames = decoder.push(&frame[split..]);

        assert_eq!(frames.len(), 1);
        assert_eq!(
            actions(data_line(&frames[0]).unwrap()),
            vec![FrameAction::Token("ção".to_string())]
        );
    }

    #[test]
    fn test_decoder_skips_blank_frames() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"\n\n\n\ndata: {}\n\n");
        assert_eq!(frames, vec!["data: {}"]);
    }

    #[test]
    fn test_data_line() {
        assert_eq!(data_line("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(data_line("data:{\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(data_line("event: token\ndata: {}"), Some("{}"));
        assert_eq!(data_line("id: 4\r\ndata: {}\r\n"), Some("{}"));
        assert_eq!(data_line("token: {\"token\":\"x\"}"), None);
    }

    #[test]
    fn test_malformed_payload_is_skipped() {
        assert!(parse_payload("{not json").is_none());
        assert!(parse_payload("[DONE]").is_none());
    }

    #[test]
    fn test_token_and_done() {
        assert_eq!(actions(r#"{"token":"Hi"}"#), vec![FrameAction::Token("Hi".into())]);
        assert_eq!(
            actions(r#"{"done":true,"intent":"QUOTA_EXCEEDED"}"#),
            vec![FrameAction::Done {
                intent: Some("QUOTA_EXCEEDED".into())
            }]
        );
        assert_eq!(
            actions(r#"{"token":"!","done":true}"#),
            vec![
                FrameAction::Token("!".into()),
                FrameAction::Done { intent: None }
            ]
        );
    }

    #[test]
    fn test_legacy_reply_payload() {
        assert_eq!(
            actions(r#"{"reply":"Whole answer","done":true,"intent":"AI_REPLY"}"#),
            vec![
                FrameAction::Token("Whole answer".into()),
                FrameAction::Done {
                    intent: Some("AI_REPLY".into())
                }
            ]
        );
        // reply is ignored when a token rides along
        assert_eq!(
            actions(r#"{"token":"a","reply":"ignored"}"#),
            vec![FrameAction::Token("a".into())]
        );
    }

    #[test]
    fn test_error_frames() {
        assert_eq!(
            actions(r#"{"error":"model overloaded"}"#),
            vec![FrameAction::Error("model overloaded".into())]
        );
        assert_eq!(
            actions(r#"{"error":{"message":"quota"}}"#),
            vec![FrameAction::Error("quota".into())]
        );
        assert_eq!(
            actions(r#"{"error":true,"token":"x"}"#),
            vec![FrameAction::Token("x".into())]
        );
        assert!(actions(r#"{"error":false}"#).is_empty());
        assert!(actions(r#"{"error":""}"#).is_empty());
    }

    #[test]
    fn test_truthiness() {
        assert!(actions(r#"{"done":false}"#).is_empty());
        assert!(actions(r#"{"done":0}"#).is_empty());
        assert!(actions(r#"{"done":null}"#).is_empty());
        assert_eq!(actions(r#"{"done":1}"#), vec![FrameAction::Done { intent: None }]);
        assert_eq!(
            actions(r#"{"done":"yes"}"#),
            vec![FrameAction::Done { intent: None }]
        );
        assert!(actions(r#"{"token":""}"#).is_empty());
    }
}
