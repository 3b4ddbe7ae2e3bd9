//! Wire records exchanged with the server.
//!
//! Every WebSocket message carries exactly one JSON object. Field names are
//! PascalCase on the wire:
//!
//! ```text
//! client → server   {"Identifier": 42, "Message": "status", "Name": "RCON"}
//! server → client   {"Identifier": 42, "Message": "...", "Type": "Generic", "Stacktrace": ""}
//! ```
//!
//! When `Type` is `"Chat"` the `Message` field is itself a JSON-encoded
//! [`ChatEvent`].
//!
//! # Example
//!
//! ```
//! use rustcon::protocol::{CommandFrame, RCON_NAME};
//!
//! let command = CommandFrame::new(42, "status");
//! assert_eq!(command.identifier, 42);
//! assert_eq!(command.name, RCON_NAME);
//! ```

use serde::{Deserialize, Serialize};

use super::message_type::MessageType;

/// Correlation identifier carried by every frame.
///
/// 64-bit and signed: the server echoes whatever integer it was given and
/// uses non-positive values for broadcasts.
pub type Identifier = i64;

/// Identifier used by unsolicited frames and by fire-and-forget commands.
///
/// Never matches a pending reply: allocated identifiers start at 1.
pub const UNSOLICITED_IDENTIFIER: Identifier = 0;

/// Fixed `Name` tag on every outbound command.
pub const RCON_NAME: &str = "RCON";

/// Inbound envelope: either a reply to a command or an unsolicited event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GenericFrame {
    /// Free-text body. For chat frames this is a nested JSON document.
    pub message: String,
    /// Identifier of the command this replies to, or 0 for broadcasts.
    pub identifier: Identifier,
    /// Raw type tag, e.g. `"Generic"`, `"Chat"`, `"Error"`.
    #[serde(rename = "Type")]
    pub kind: String,
    /// Server-side stack trace, if any.
    pub stacktrace: Option<String>,
}

impl GenericFrame {
    /// Classify the type tag.
    pub fn message_type(&self) -> MessageType {
        MessageType::from_tag(&self.kind)
    }

    /// Check if the body holds a nested chat payload.
    #[inline]
    pub fn is_chat(&self) -> bool {
        self.message_type() == MessageType::Chat
    }

    /// Check if this frame is unsolicited (not a reply to any command).
    #[inline]
    pub fn is_unsolicited(&self) -> bool {
        self.identifier == UNSOLICITED_IDENTIFIER
    }

    /// Stack trace, treating an empty string as absent.
    pub fn stacktrace(&self) -> Option<&str> {
        self.stacktrace.as_deref().filter(|s| !s.is_empty())
    }
}

/// Chat line broadcast by the server, nested inside a `"Chat"` frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ChatEvent {
    /// Chat channel (global, team, ...).
    pub channel: i64,
    /// Chat text.
    pub message: String,
    /// Sender's platform user id.
    pub user_id: String,
    /// Sender's display name.
    pub username: String,
    /// Display colour, e.g. `"#5af"`.
    pub color: String,
    /// Unix timestamp in seconds.
    pub time: i64,
}

/// Outbound command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommandFrame {
    /// Allocated identifier, or 0 when no reply is awaited.
    pub identifier: Identifier,
    /// Command text, passed through verbatim.
    pub message: String,
    /// Always [`RCON_NAME`].
    pub name: String,
}

impl CommandFrame {
    /// Create a command carrying the given identifier.
    pub fn new(identifier: Identifier, message: impl Into<String>) -> Self {
        Self {
            identifier,
            message: message.into(),
            name: RCON_NAME.to_string(),
        }
    }

    /// Create a command that expects no correlated reply.
    pub fn detached(message: impl Into<String>) -> Self {
        Self::new(UNSOLICITED_IDENTIFIER, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_shape() {
        let command = CommandFrame::new(42, "status");
        let value = serde_json::to_value(&command).unwrap();

        assert_eq!(value["Identifier"], 42);
        assert_eq!(value["Message"], "status");
        assert_eq!(value["Name"], "RCON");
        assert_eq!(value.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_detached_command_uses_zero() {
        let command = CommandFrame::detached("say hello");
        assert_eq!(command.identifier, UNSOLICITED_IDENTIFIER);
        assert_eq!(command.name, RCON_NAME);
    }

    #[test]
    fn test_generic_frame_from_wire() {
        let frame: GenericFrame = serde_json::from_str(
            r#"{"Message":"ok","Identifier":42,"Type":"Generic","Stacktrace":""}"#,
        )
        .unwrap();

        assert_eq!(frame.message, "ok");
        assert_eq!(frame.identifier, 42);
        assert_eq!(frame.kind, "Generic");
        assert_eq!(frame.message_type(), MessageType::Generic);
        assert!(!frame.is_chat());
        assert!(!frame.is_unsolicited());
        assert_eq!(frame.stacktrace(), None);
    }

    #[test]
    fn test_generic_frame_missing_fields() {
        let frame: GenericFrame = serde_json::from_str(r#"{"Message":"hi"}"#).unwrap();

        assert_eq!(frame.identifier, 0);
        assert!(frame.is_unsolicited());
        assert_eq!(frame.kind, "");
        assert_eq!(frame.stacktrace, None);
    }

    #[test]
    fn test_generic_frame_null_stacktrace() {
        let frame: GenericFrame = serde_json::from_str(
            r#"{"Message":"boom","Identifier":0,"Type":"Error","Stacktrace":null}"#,
        )
        .unwrap();
        assert_eq!(frame.stacktrace, None);
        assert_eq!(frame.message_type(), MessageType::Error);

        let frame: GenericFrame = serde_json::from_str(
            r#"{"Message":"boom","Identifier":0,"Type":"Error","Stacktrace":"at Foo()"}"#,
        )
        .unwrap();
        assert_eq!(frame.stacktrace(), Some("at Foo()"));
    }

    #[test]
    fn test_chat_event_from_wire() {
        let chat: ChatEvent = serde_json::from_str(
            r##"{"Channel":0,"Message":"hello","UserId":"76561198000000000","Username":"bob","Color":"#5af","Time":1700000000}"##,
        )
        .unwrap();

        assert_eq!(chat.channel, 0);
        assert_eq!(chat.message, "hello");
        assert_eq!(chat.user_id, "76561198000000000");
        assert_eq!(chat.username, "bob");
        assert_eq!(chat.color, "#5af");
        assert_eq!(chat.time, 1_700_000_000);
    }
}
