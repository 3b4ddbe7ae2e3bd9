//! Error types for rustcon.

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::protocol::Identifier;

/// Main error type for all RCON operations.
#[derive(Debug, Error)]
pub enum RconError {
    /// Connection settings rejected before any I/O took place.
    #[error("invalid configuration: {field}: {reason}")]
    InvalidConfiguration {
        /// Name of the offending setting.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// WebSocket dial or handshake failed.
    #[error("failed to connect: {0}")]
    Connect(#[source] tungstenite::Error),

    /// `connect` was called on a session that already has a transport.
    #[error("already connected to server")]
    AlreadyConnected,

    /// Operation requires an attached transport.
    #[error("not connected to server")]
    NotConnected,

    /// Transport write failed while sending a frame.
    #[error("failed to send frame: {0}")]
    Send(#[source] tungstenite::Error),

    /// Transport read failed; the session is torn down.
    #[error("failed to receive frame: {0}")]
    Receive(#[source] tungstenite::Error),

    /// No correlated reply arrived within the bound.
    #[error("timed out after {timeout:?} waiting for response to command {identifier}")]
    Timeout {
        /// Identifier of the command that went unanswered.
        identifier: Identifier,
        /// The bound that elapsed.
        timeout: Duration,
    },

    /// Session was torn down while a caller awaited a reply.
    #[error("connection closed")]
    ConnectionClosed,

    /// Malformed inbound frame or chat payload.
    #[error("failed to decode frame: {0}")]
    Decode(#[source] serde_json::Error),

    /// Outbound record could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),

    /// Every identifier in the allocation range is held by a live slot.
    #[error("all {capacity} command identifiers are in use")]
    ExhaustedIdentifierSpace {
        /// Size of the identifier range.
        capacity: Identifier,
    },

    /// A slot for this identifier is already registered.
    #[error("command identifier {0} is already registered")]
    DuplicateIdentifier(Identifier),
}

impl RconError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type alias using RconError.
pub type Result<T> = std::result::Result<T, RconError>;
