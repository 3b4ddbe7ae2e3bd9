//! Reader loop - drains the socket and dispatches frames to the router.
//!
//! Only the reader ever polls the receive half. Each text or binary
//! message is decoded and routed on the spot, so a reply reaches its
//! waiter as soon as it is read. Observer calls never run on the read
//! path: they are queued to a notifier task that runs each one on the
//! blocking pool.
//!
//! ```text
//! socket ─► Reader ─► Router::route ─┬─► reply slot
//!                                    └─► mpsc ─► notifier ─► spawn_blocking(on_message / on_chat_message)
//! ```
//!
//! In [`DispatchMode::Concurrent`] up to `max_concurrent_dispatch`
//! callbacks run at once and later ones wait for a permit in the notifier,
//! never in the reader. In [`DispatchMode::Sequential`] callbacks run one
//! at a time in receive order.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::{mpsc, Semaphore};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::config::{ConnectionConfig, DispatchMode};
use crate::error::{RconError, Result};
use crate::router::{Route, Router};

/// Drives one connection's receive half.
pub struct Reader {
    router: Arc<Router>,
    mode: DispatchMode,
    semaphore: Arc<Semaphore>,
}

impl Reader {
    /// Create a reader dispatching to `router`.
    pub fn new(router: Arc<Router>, mode: DispatchMode, max_concurrent: usize) -> Self {
        Self {
            router,
            mode,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Create a reader with the dispatch settings from `config`.
    pub fn from_config(router: Arc<Router>, config: &ConnectionConfig) -> Self {
        Self::new(router, config.dispatch, config.max_concurrent_dispatch)
    }

    /// Read until the peer closes or the transport fails.
    ///
    /// Returns `Ok(())` on a close frame or end of stream and
    /// [`RconError::Receive`] on a transport error. Observer calls already
    /// queued still run after this returns.
    pub async fn run<St>(self, mut stream: St) -> Result<()>
    where
        St: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
    {
        tracing::debug!(mode = ?self.mode, "reader started");

        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        tokio::spawn(notify_loop(
            self.router.clone(),
            self.mode,
            self.semaphore.clone(),
            notify_rx,
        ));

        loop {
            let message = match stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(RconError::Receive(e)),
                None => {
                    tracing::debug!("websocket stream ended");
                    return Ok(());
                }
            };

            let payload: Bytes = match message {
                Message::Text(_) | Message::Binary(_) => message.into_data(),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "server closed connection");
                    return Ok(());
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    tracing::debug!("skipping control frame");
                    continue;
                }
            };

            let route = self.router.route(&payload);
            if route.needs_observer() {
                // The notifier outlives the reader, so this cannot fail
                let _ = notify_tx.send(route);
            }
        }
    }
}

/// Run queued observer calls on the blocking pool until the reader is gone.
async fn notify_loop(
    router: Arc<Router>,
    mode: DispatchMode,
    semaphore: Arc<Semaphore>,
    mut rx: mpsc::UnboundedReceiver<Route>,
) {
    while let Some(route) = rx.recv().await {
        let router = router.clone();
        match mode {
            DispatchMode::Sequential => {
                let _ = tokio::task::spawn_blocking(move || notify(&router, route)).await;
            }
            DispatchMode::Concurrent => {
                // Permit is held until the callback returns
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    return;
                };
                tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    notify(&router, route);
                });
            }
        }
    }
    tracing::debug!("notifier stopped");
}

fn notify(router: &Router, route: Route) {
    if panic::catch_unwind(AssertUnwindSafe(|| router.notify(route))).is_err() {
        tracing::error!("observer callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::CorrelationTable;
    use crate::observer::RconObserver;
    use crate::protocol::{ChatEvent, GenericFrame};
    use futures_util::stream;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        /// Wait until `count` callbacks have run, then return them.
        async fn wait_for(&self, count: usize) -> Vec<String> {
            tokio::time::timeout(Duration::from_secs(1), async {
                while self.events.lock().len() < count {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .unwrap();
            self.events.lock().clone()
        }
    }

    impl RconObserver for Recorder {
        fn on_message(&self, message: GenericFrame) {
            if message.message == "panic" {
                panic!("observer failure");
            }
            self.events.lock().push(message.message);
        }

        fn on_chat_message(&self, chat: ChatEvent) {
            self.events.lock().push(format!("chat:{}", chat.message));
        }
    }

    fn broadcast(text: &str) -> std::result::Result<Message, WsError> {
        Ok(Message::text(format!(
            r#"{{"Identifier":0,"Message":"{text}","Type":"Generic"}}"#
        )))
    }

    fn setup(mode: DispatchMode) -> (Reader, Arc<Router>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let router = Arc::new(Router::new(CorrelationTable::new(), recorder.clone()));
        (Reader::new(router.clone(), mode, 8), router, recorder)
    }

    #[tokio::test]
    async fn test_sequential_preserves_order() {
        let (reader, _router, recorder) = setup(DispatchMode::Sequential);
        let frames = stream::iter(vec![broadcast("a"), broadcast("b"), broadcast("c")]);

        reader.run(frames).await.unwrap();
        assert_eq!(recorder.wait_for(3).await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_skips_control_frames_and_stops_on_close() {
        let (reader, _router, recorder) = setup(DispatchMode::Sequential);
        let frames = stream::iter(vec![
            Ok(Message::Ping(Bytes::from_static(b"p"))),
            broadcast("before"),
            Ok(Message::Pong(Bytes::new())),
            Ok(Message::Close(None)),
            broadcast("after"),
        ]);

        reader.run(frames).await.unwrap();
        assert_eq!(recorder.wait_for(1).await, vec!["before"]);
    }

    #[tokio::test]
    async fn test_binary_frames_are_routed() {
        let (reader, _router, recorder) = setup(DispatchMode::Sequential);
        let frames = stream::iter(vec![Ok(Message::binary(
            br#"{"Identifier":0,"Message":"bin","Type":"Generic"}"#.to_vec(),
        ))]);

        reader.run(frames).await.unwrap();
        assert_eq!(recorder.wait_for(1).await, vec!["bin"]);
    }

    #[tokio::test]
    async fn test_bad_frame_does_not_stop_reader() {
        let (reader, _router, recorder) = setup(DispatchMode::Sequential);
        let frames = stream::iter(vec![
            Ok(Message::text("garbage".to_string())),
            broadcast("still here"),
        ]);

        reader.run(frames).await.unwrap();
        assert_eq!(recorder.wait_for(1).await, vec!["still here"]);
    }

    #[tokio::test]
    async fn test_panicking_observer_does_not_stop_dispatch() {
        let (reader, router, recorder) = setup(DispatchMode::Sequential);
        let slot = router.pending().register(5).unwrap();
        let frames = stream::iter(vec![
            broadcast("panic"),
            broadcast("after panic"),
            Ok(Message::text(
                r#"{"Identifier":5,"Message":"ok","Type":"Generic"}"#.to_string(),
            )),
        ]);

        reader.run(frames).await.unwrap();

        assert_eq!(slot.wait(Duration::from_secs(1)).await.unwrap().message, "ok");
        assert_eq!(recorder.wait_for(1).await, vec!["after panic"]);
    }

    #[tokio::test]
    async fn test_transport_error_ends_loop() {
        let (reader, _router, recorder) = setup(DispatchMode::Sequential);
        let frames = stream::iter(vec![
            broadcast("one"),
            Err(WsError::ConnectionClosed),
            broadcast("never"),
        ]);

        let result = reader.run(frames).await;
        assert!(matches!(result, Err(RconError::Receive(_))));
        assert_eq!(recorder.wait_for(1).await, vec!["one"]);
    }

    #[tokio::test]
    async fn test_concurrent_dispatch_delivers_replies() {
        let (reader, router, recorder) = setup(DispatchMode::Concurrent);
        let slot = router.pending().register(42).unwrap();
        let frames = stream::iter(vec![
            broadcast("noise"),
            Ok(Message::text(
                r#"{"Identifier":42,"Message":"ok","Type":"Generic"}"#.to_string(),
            )),
        ]);

        reader.run(frames).await.unwrap();

        let reply = slot.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(reply.message, "ok");
        assert_eq!(recorder.wait_for(1).await, vec!["noise"]);
    }

    /// Observer whose hooks block their thread until the gate is dropped.
    struct Gated {
        gate: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl RconObserver for Gated {
        fn on_message(&self, _message: GenericFrame) {
            let _ = self.gate.lock().recv_timeout(Duration::from_secs(5));
        }
    }

    #[tokio::test]
    async fn test_reply_not_held_behind_blocked_callbacks() {
        let (release, gate) = std::sync::mpsc::channel::<()>();
        let observer = Arc::new(Gated {
            gate: Mutex::new(gate),
        });
        let router = Arc::new(Router::new(CorrelationTable::new(), observer));
        let slot = router.pending().register(9).unwrap();
        // One permit: every broadcast after the first queues in the notifier
        let reader = Reader::new(Arc::clone(&router), DispatchMode::Concurrent, 1);

        let mut frames: Vec<_> = (0..4).map(|i| broadcast(&format!("b{i}"))).collect();
        frames.push(Ok(Message::text(
            r#"{"Identifier":9,"Message":"pong","Type":"Generic"}"#.to_string(),
        )));

        reader.run(stream::iter(frames)).await.unwrap();
        let reply = slot.wait(Duration::from_secs(1)).await;
        drop(release);

        assert_eq!(reply.unwrap().message, "pong");
    }
}
