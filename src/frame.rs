//! Inbound frame codec.
//!
//! The server sends one JSON object per socket message:
//!
//! ```json
//! {"message": "partial text", "marker": "begin"}
//! ```
//!
//! Outbound traffic is the raw text the user typed, not JSON.

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// Role of a frame in assembling an assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Marker {
    /// A complete message in a single frame.
    Full,
    /// First chunk of a streamed message.
    Begin,
    /// Middle chunk of a streamed message.
    Content,
    /// Last chunk of a streamed message; triggers formatting.
    End,
}

impl std::fmt::Display for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Marker::Full => write!(f, "full"),
            Marker::Begin => write!(f, "begin"),
            Marker::Content => write!(f, "content"),
            Marker::End => write!(f, "end"),
        }
    }
}

/// One decoded inbound unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "message")]
    pub content: String,
    pub marker: Marker,
}

impl Frame {
    pub fn new(content: impl Into<String>, marker: Marker) -> Self {
        Self {
            content: content.into(),
            marker,
        }
    }

    pub fn full(content: impl Into<String>) -> Self {
        Self::new(content, Marker::Full)
    }

    pub fn begin(content: impl Into<String>) -> Self {
        Self::new(content, Marker::Begin)
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self::new(content, Marker::Content)
    }

    pub fn end(content: impl Into<String>) -> Self {
        Self::new(content, Marker::End)
    }

    /// Decode a socket payload.
    ///
    /// Anything other than a JSON object with a string `message` and a known
    /// `marker` is a [`ChatError::FrameParse`]. The payload is kept on the
    /// error (truncated) so it can be logged.
    pub fn parse(payload: &str) -> Result<Frame> {
        serde_json::from_str::<Frame>(payload).map_err(|e| ChatError::FrameParse {
            detail: e.to_string(),
            payload: truncate_payload(payload),
        })
    }

    /// Encode as the JSON wire form. Used by test servers and fixtures.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Longest payload excerpt kept on a parse error.
const MAX_PAYLOAD_EXCERPT: usize = 256;

fn truncate_payload(payload: &str) -> String {
    if payload.len() <= MAX_PAYLOAD_EXCERPT {
        return payload.to_string();
    }
    let mut end = MAX_PAYLOAD_EXCERPT;
    while !payload.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &payload[..end])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_begin_frame() {
        let frame = Frame::parse(r#"{"message":"Hel","marker":"begin"}"#).unwrap();
        assert_eq!(frame, Frame::begin("Hel"));
    }

    #[test]
    fn test_parse_ignores_extra_fields() {
        let frame = Frame::parse(r#"{"message":"x","marker":"full","id":7}"#).unwrap();
        assert_eq!(frame.marker, Marker::Full);
    }

    #[test]
    fn test_parse_unknown_marker_is_error() {
        let err = Frame::parse(r#"{"message":"x","marker":"middle"}"#).unwrap_err();
        assert!(matches!(err, ChatError::FrameParse { .. }));
    }

    #[test]
    fn test_parse_raw_string_is_error() {
        // Raw HTML strings were an older protocol variant and are not decoded.
        let err = Frame::parse("Error! EOF<br>Please refresh the page").unwrap_err();
        match err {
            ChatError::FrameParse { payload, .. } => {
                assert!(payload.starts_with("Error!"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_missing_message_is_error() {
        assert!(Frame::parse(r#"{"marker":"end"}"#).is_err());
    }

    #[test]
    fn test_to_json_uses_wire_field_names() {
        let json = Frame::end(" world").to_json();
        assert_eq!(json, r#"{"message":" world","marker":"end"}"#);
    }

    #[test]
    fn test_marker_display_matches_wire_name() {
        assert_eq!(Marker::Content.to_string(), "content");
        assert_eq!(Marker::Full.to_string(), "full");
    }

    #[test]
    fn test_truncate_payload_respects_char_boundaries() {
        let long = "é".repeat(300);
        let out = truncate_payload(&long);
        assert!(out.ends_with("[truncated]"));
        assert!(out.len() < long.len());
    }
}
