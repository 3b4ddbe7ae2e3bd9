//! JSON codec using `serde_json`.
//!
//! Outbound records become WebSocket text messages; inbound messages are
//! decoded from raw bytes, whether they arrived as text or binary.
//!
//! # Example
//!
//! ```
//! use rustcon::codec::JsonCodec;
//! use rustcon::protocol::{CommandFrame, GenericFrame};
//!
//! let text = JsonCodec::encode(&CommandFrame::new(7, "status")).unwrap();
//! assert!(text.contains("\"Identifier\":7"));
//!
//! let frame: GenericFrame =
//!     JsonCodec::decode(br#"{"Identifier":7,"Message":"ok","Type":"Generic"}"#).unwrap();
//! assert_eq!(frame.identifier, 7);
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{RconError, Result};
use crate::protocol::{ChatEvent, GenericFrame};

/// JSON codec for wire records.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a record to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`RconError::Encode`] if the value cannot be serialized.
    #[inline]
    pub fn encode<T: Serialize>(value: &T) -> Result<String> {
        serde_json::to_string(value).map_err(RconError::Encode)
    }

    /// Decode JSON bytes to a record.
    ///
    /// # Errors
    ///
    /// Returns [`RconError::Decode`] if the bytes are not a valid `T`.
    #[inline]
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(RconError::Decode)
    }

    /// Decode the nested chat payload carried in a frame's body.
    pub fn decode_chat(frame: &GenericFrame) -> Result<ChatEvent> {
        serde_json::from_str(&frame.message).map_err(RconError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CommandFrame;

    #[test]
    fn test_encode_command() {
        let text = JsonCodec::encode(&CommandFrame::new(42, "status")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["Identifier"], 42);
        assert_eq!(value["Message"], "status");
        assert_eq!(value["Name"], "RCON");
    }

    #[test]
    fn test_command_text_is_not_escaped_away() {
        let text = JsonCodec::encode(&CommandFrame::new(1, "say \"hi\" \\o/")).unwrap();
        let back: CommandFrame = JsonCodec::decode(text.as_bytes()).unwrap();
        assert_eq!(back.message, "say \"hi\" \\o/");
    }

    #[test]
    fn test_decode_invalid_json() {
        let result: Result<GenericFrame> = JsonCodec::decode(b"{not json");
        assert!(matches!(result, Err(RconError::Decode(_))));
    }

    #[test]
    fn test_decode_wrong_shape() {
        let result: Result<GenericFrame> = JsonCodec::decode(br#"{"Identifier":"abc"}"#);
        assert!(matches!(result, Err(RconError::Decode(_))));
    }

    #[test]
    fn test_decode_chat_payload() {
        let frame = GenericFrame {
            message: r##"{"Channel":1,"Message":"gg","UserId":"1","Username":"ann","Color":"#fff","Time":5}"##
                .to_string(),
            identifier: 0,
            kind: "Chat".to_string(),
            stacktrace: None,
        };

        let chat = JsonCodec::decode_chat(&frame).unwrap();
        assert_eq!(chat.channel, 1);
        assert_eq!(chat.message, "gg");
        assert_eq!(chat.username, "ann");
        assert_eq!(chat.time, 5);
    }

    #[test]
    fn test_decode_chat_payload_not_json() {
        let frame = GenericFrame {
            message: "plain text".to_string(),
            kind: "Chat".to_string(),
            ..GenericFrame::default()
        };
        assert!(matches!(
            JsonCodec::decode_chat(&frame),
            Err(RconError::Decode(_))
        ));
    }
}
