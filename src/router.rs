//! Classification of inbound frames.
//!
//! ```text
//!  bytes ─► decode GenericFrame ─┬─ error ───────────────────────► drop (warn)
//!                                │
//!                   identifier≠0 ├─ waiter found ─────────────────► reply slot
//!                                │
//!                   Type="Chat"  ├─ decode ChatEvent ─┬─ ok ──────► Route::Chat
//!                                │                    └─ error ───► drop (warn)
//!                                └────────────────────────────────► Route::Message
//! ```
//!
//! Routing never calls into user code: replies are handed to their slot and
//! everything else comes back as a [`Route`] for [`Router::notify`], which
//! the reader runs off the read path. A frame that reaches a reply slot is
//! never also shown to an observer.

use std::sync::Arc;

use crate::codec::JsonCodec;
use crate::correlation::CorrelationTable;
use crate::observer::RconObserver;
use crate::protocol::{ChatEvent, GenericFrame, Identifier};

/// Where a routed frame ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Delivered to the command waiting on this identifier.
    Reply(Identifier),
    /// Bound for `on_chat_message`.
    Chat(ChatEvent),
    /// Bound for `on_message`.
    Message(GenericFrame),
    /// Undecodable; reported and discarded.
    Dropped,
}

impl Route {
    /// Check if this route still has an observer call to make.
    #[inline]
    pub fn needs_observer(&self) -> bool {
        matches!(self, Self::Chat(_) | Self::Message(_))
    }
}

/// Routes decoded frames to reply slots or observer hooks.
pub struct Router {
    pending: CorrelationTable,
    observer: Arc<dyn RconObserver>,
}

impl Router {
    /// Create a router over the given table and observer.
    pub fn new(pending: CorrelationTable, observer: Arc<dyn RconObserver>) -> Self {
        Self { pending, observer }
    }

    /// Table of commands awaiting replies.
    #[inline]
    pub fn pending(&self) -> &CorrelationTable {
        &self.pending
    }

    /// The registered observer.
    #[inline]
    pub fn observer(&self) -> &dyn RconObserver {
        self.observer.as_ref()
    }

    /// Decode one inbound message and deliver it if it is a reply.
    ///
    /// Never fails: malformed input is logged and reported as
    /// [`Route::Dropped`].
    pub fn route(&self, payload: &[u8]) -> Route {
        let frame: GenericFrame = match JsonCodec::decode(payload) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, len = payload.len(), "dropping undecodable frame");
                return Route::Dropped;
            }
        };
        self.route_frame(frame)
    }

    /// Route an already decoded frame.
    pub fn route_frame(&self, frame: GenericFrame) -> Route {
        let frame = if frame.is_unsolicited() {
            frame
        } else {
            let identifier = frame.identifier;
            match self.pending.try_deliver(identifier, frame) {
                None => {
                    tracing::debug!(identifier, "reply delivered");
                    return Route::Reply(identifier);
                }
                Some(frame) => {
                    tracing::debug!(identifier, "no command waiting for reply");
                    frame
                }
            }
        };

        if !frame.is_chat() {
            return Route::Message(frame);
        }
        match JsonCodec::decode_chat(&frame) {
            Ok(chat) => Route::Chat(chat),
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed chat payload");
                Route::Dropped
            }
        }
    }

    /// Run the observer hook a route calls for, if any.
    ///
    /// This calls user code and may block.
    pub fn notify(&self, route: Route) {
        match route {
            Route::Chat(chat) => self.observer.on_chat_message(chat),
            Route::Message(frame) => self.observer.on_message(frame),
            Route::Reply(_) | Route::Dropped => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<GenericFrame>>,
        chats: Mutex<Vec<ChatEvent>>,
    }

    impl RconObserver for Recorder {
        fn on_message(&self, message: GenericFrame) {
            self.messages.lock().push(message);
        }

        fn on_chat_message(&self, chat: ChatEvent) {
            self.chats.lock().push(chat);
        }
    }

    fn router() -> (Router, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let router = Router::new(CorrelationTable::new(), recorder.clone());
        (router, recorder)
    }

    fn message_of(route: Route) -> GenericFrame {
        match route {
            Route::Message(frame) => frame,
            other => panic!("expected Route::Message, got {other:?}"),
        }
    }

    const CHAT: &[u8] = br##"{"Identifier":0,"Type":"Chat","Message":"{\"Channel\":0,\"Message\":\"hi all\",\"UserId\":\"7656\",\"Username\":\"bob\",\"Color\":\"#5af\",\"Time\":1700000000}"}"##;

    #[tokio::test]
    async fn test_reply_goes_only_to_waiter() {
        let (router, recorder) = router();
        let slot = router.pending().register(42).unwrap();

        let route = router.route(br#"{"Identifier":42,"Message":"ok","Type":"Generic"}"#);
        assert_eq!(route, Route::Reply(42));
        assert!(!route.needs_observer());
        router.notify(route);

        let reply = slot.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(reply.message, "ok");
        assert!(recorder.messages.lock().is_empty());
        assert!(recorder.chats.lock().is_empty());
        assert!(!router.pending().contains(42));
    }

    #[tokio::test]
    async fn test_chat_typed_reply_still_goes_to_waiter() {
        let (router, recorder) = router();
        let slot = router.pending().register(3).unwrap();

        let route = router.route(br#"{"Identifier":3,"Message":"{}","Type":"Chat"}"#);
        assert_eq!(route, Route::Reply(3));
        assert!(slot.wait(Duration::from_secs(1)).await.is_ok());
        assert!(recorder.chats.lock().is_empty());
    }

    #[test]
    fn test_chat_broadcast() {
        let (router, recorder) = router();

        let route = router.route(CHAT);
        let Route::Chat(chat) = &route else {
            panic!("expected Route::Chat, got {route:?}");
        };
        assert_eq!(chat.message, "hi all");
        assert_eq!(chat.username, "bob");
        assert_eq!(chat.user_id, "7656");
        assert_eq!(chat.color, "#5af");
        assert_eq!(chat.time, 1_700_000_000);

        // Routing alone never calls the observer
        assert!(recorder.chats.lock().is_empty());
        router.notify(route);

        assert_eq!(recorder.chats.lock().len(), 1);
        assert!(recorder.messages.lock().is_empty());
    }

    #[test]
    fn test_generic_broadcast() {
        let (router, recorder) = router();

        let route = router.route(br#"{"Identifier":0,"Message":"Saving...","Type":"Log"}"#);
        assert!(route.needs_observer());
        router.notify(route);

        let messages = recorder.messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message, "Saving...");
        assert_eq!(messages[0].kind, "Log");
    }

    #[test]
    fn test_unmatched_reply_falls_through_to_observer() {
        let (router, _recorder) = router();

        let route = router.route(br#"{"Identifier":17,"Message":"late","Type":"Generic"}"#);
        assert_eq!(message_of(route).identifier, 17);
    }

    #[test]
    fn test_identifier_beyond_32_bits() {
        let (router, _recorder) = router();

        let route =
            router.route(br#"{"Identifier":5000000000,"Message":"big","Type":"Generic"}"#);
        let frame = message_of(route);
        assert_eq!(frame.identifier, 5_000_000_000);
        assert_eq!(frame.message, "big");
    }

    #[test]
    fn test_undecodable_frame_dropped() {
        let (router, recorder) = router();

        assert_eq!(router.route(b"not json at all"), Route::Dropped);
        router.notify(Route::Dropped);
        assert!(recorder.messages.lock().is_empty());
        assert!(recorder.chats.lock().is_empty());
    }

    #[test]
    fn test_malformed_chat_payload_dropped() {
        let (router, recorder) = router();

        let route = router.route(br#"{"Identifier":0,"Message":"not a chat object","Type":"Chat"}"#);
        assert_eq!(route, Route::Dropped);
        assert!(recorder.chats.lock().is_empty());
        assert!(recorder.messages.lock().is_empty());
    }
}
