//! Observer hooks for connection lifecycle and unsolicited frames.
//!
//! Implement [`RconObserver`] and override only the hooks you need, or
//! register closures on [`RconConnectionBuilder`](crate::RconConnectionBuilder).
//!
//! Hooks run on runtime worker threads. `on_message` and `on_chat_message`
//! may run concurrently with each other unless the connection is
//! configured with [`DispatchMode::Sequential`](crate::DispatchMode::Sequential).

use crate::protocol::{ChatEvent, GenericFrame};

/// Receiver of connection events. Every method defaults to a no-op.
pub trait RconObserver: Send + Sync + 'static {
    /// The transport is attached. Runs before `connect` returns.
    fn on_connected(&self) {}

    /// A frame that is not a reply to any outstanding command and not a
    /// chat broadcast.
    fn on_message(&self, message: GenericFrame) {
        let _ = message;
    }

    /// A decoded chat broadcast.
    fn on_chat_message(&self, chat: ChatEvent) {
        let _ = chat;
    }

    /// The session was torn down, explicitly or by the peer. Runs exactly
    /// once per successful connect.
    fn on_disconnected(&self) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RconObserver for NoopObserver {}

type Hook = Box<dyn Fn() + Send + Sync>;
type MessageHook = Box<dyn Fn(GenericFrame) + Send + Sync>;
type ChatHook = Box<dyn Fn(ChatEvent) + Send + Sync>;

/// Observer assembled from optional closures.
#[derive(Default)]
pub(crate) struct CallbackObserver {
    pub(crate) on_connected: Option<Hook>,
    pub(crate) on_message: Option<MessageHook>,
    pub(crate) on_chat_message: Option<ChatHook>,
    pub(crate) on_disconnected: Option<Hook>,
}

impl CallbackObserver {
    pub(crate) fn is_empty(&self) -> bool {
        self.on_connected.is_none()
            && self.on_message.is_none()
            && self.on_chat_message.is_none()
            && self.on_disconnected.is_none()
    }
}

impl RconObserver for CallbackObserver {
    fn on_connected(&self) {
        if let Some(hook) = &self.on_connected {
            hook();
        }
    }

    fn on_message(&self, message: GenericFrame) {
        if let Some(hook) = &self.on_message {
            hook(message);
        }
    }

    fn on_chat_message(&self, chat: ChatEvent) {
        if let Some(hook) = &self.on_chat_message {
            hook(chat);
        }
    }

    fn on_disconnected(&self) {
        if let Some(hook) = &self.on_disconnected {
            hook();
        }
    }
}
