//! Protocol module - wire records and type tags.
//!
//! - [`GenericFrame`] - inbound reply or event envelope
//! - [`ChatEvent`] - nested payload of `"Chat"` frames
//! - [`CommandFrame`] - outbound command
//! - [`MessageType`] - classification of the `Type` tag

mod frame;
mod message_type;

pub use frame::{
    ChatEvent, CommandFrame, GenericFrame, Identifier, RCON_NAME, UNSOLICITED_IDENTIFIER,
};
pub use message_type::MessageType;
