//! Classification of the `Type` tag on inbound frames.

use std::fmt;

/// Known values of the `Type` tag.
///
/// Unknown tags are preserved in [`MessageType::Other`] so that observers
/// still see them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Command output and plain console lines.
    Generic,
    /// Server log line.
    Log,
    /// Server warning.
    Warning,
    /// Server error, usually with a stack trace.
    Error,
    /// Chat broadcast; the body is a nested JSON chat payload.
    Chat,
    /// Player report.
    Report,
    /// Any other tag, kept verbatim.
    Other(String),
}

impl MessageType {
    /// Parse a wire tag. Matching is exact, as the server always sends
    /// capitalised tags.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "Generic" => Self::Generic,
            "Log" => Self::Log,
            "Warning" => Self::Warning,
            "Error" => Self::Error,
            "Chat" => Self::Chat,
            "Report" => Self::Report,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire representation of this tag.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Generic => "Generic",
            Self::Log => "Log",
            Self::Warning => "Warning",
            Self::Error => "Error",
            Self::Chat => "Chat",
            Self::Report => "Report",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tags() {
        for tag in ["Generic", "Log", "Warning", "Error", "Chat", "Report"] {
            let parsed = MessageType::from_tag(tag);
            assert!(!matches!(parsed, MessageType::Other(_)), "{tag}");
            assert_eq!(parsed.as_str(), tag);
        }
    }

    #[test]
    fn test_unknown_tag_preserved() {
        let parsed = MessageType::from_tag("Heartbeat");
        assert_eq!(parsed, MessageType::Other("Heartbeat".to_string()));
        assert_eq!(parsed.to_string(), "Heartbeat");
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        assert_eq!(
            MessageType::from_tag("chat"),
            MessageType::Other("chat".to_string())
        );
    }
}
