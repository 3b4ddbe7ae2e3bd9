//! Dedicated writer task owning the WebSocket send half.
//!
//! Callers never touch the sink directly. They queue frames on an mpsc
//! channel and the writer task feeds them to the socket, flushing once per
//! batch.
//!
//! ```text
//! send_command 1 ─┐
//! send_command 2 ─┼─► mpsc::Sender<Outbound> ─► Writer Task ─► WebSocket
//! disconnect     ─┘
//! ```
//!
//! Each queued frame carries a completion channel, so a caller learns
//! whether its own frame reached the socket rather than merely the queue.

use futures_util::{Sink, SinkExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::error::{RconError, Result};

/// Maximum frames to batch before a flush.
const MAX_BATCH_SIZE: usize = 64;

/// A request to the writer task.
#[derive(Debug)]
enum Outbound {
    /// Write one message.
    Frame {
        message: Message,
        done: oneshot::Sender<Result<()>>,
    },
    /// Send a close frame and stop.
    Close { done: oneshot::Sender<Result<()>> },
}

impl Outbound {
    fn reject(self) {
        let (Self::Frame { done, .. } | Self::Close { done }) = self;
        let _ = done.send(Err(RconError::ConnectionClosed));
    }
}

/// Handle for queueing frames on the writer task.
///
/// This is cheaply cloneable and can be shared across tasks.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Outbound>,
}

impl WriterHandle {
    /// Send a text message and wait until it has been flushed.
    ///
    /// # Errors
    ///
    /// - [`RconError::Send`] if the socket write failed.
    /// - [`RconError::ConnectionClosed`] if the writer has stopped.
    pub async fn send_text(&self, text: String) -> Result<()> {
        let (done, rx) = oneshot::channel();
        let frame = Outbound::Frame {
            message: Message::text(text),
            done,
        };
        self.tx
            .send(frame)
            .await
            .map_err(|_| RconError::ConnectionClosed)?;
        rx.await.map_err(|_| RconError::ConnectionClosed)?
    }

    /// Flush anything queued ahead, send a close frame, and stop the task.
    ///
    /// Closing an already stopped writer succeeds.
    pub async fn close(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        if self.tx.send(Outbound::Close { done }).await.is_err() {
            return Ok(());
        }
        rx.await.unwrap_or(Ok(()))
    }

    /// Check if the writer task has stopped.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for queueing frames.
///
/// The task ends after a close request, after a write error, or once every
/// handle has been dropped.
pub fn spawn_writer_task<S>(sink: S, channel_capacity: usize) -> (WriterHandle, JoinHandle<()>)
where
    S: Sink<Message, Error = WsError> + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(channel_capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, sink));
    (WriterHandle { tx }, task)
}

/// Main writer loop - receives frames and writes them to the socket.
async fn writer_loop<S>(mut rx: mpsc::Receiver<Outbound>, mut sink: S)
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(first) = rx.recv().await {
        // Collect additional ready frames (non-blocking)
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(outbound) => batch.push(outbound),
                Err(_) => break,
            }
        }

        if !write_batch(&mut sink, batch).await {
            rx.close();
            while let Ok(outbound) = rx.try_recv() {
                outbound.reject();
            }
            return;
        }
    }

    // Every handle dropped without an explicit close
    let _ = close_sink(&mut sink).await;
}

/// Feed a batch into the sink and flush it once.
///
/// Returns `false` once the writer should stop.
async fn write_batch<S>(sink: &mut S, batch: Vec<Outbound>) -> bool
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let mut written = Vec::with_capacity(batch.len());
    let mut close = None;
    let mut batch = batch.into_iter();

    while let Some(outbound) = batch.next() {
        match outbound {
            Outbound::Frame { message, done } if close.is_none() => {
                if let Err(e) = sink.feed(message).await {
                    tracing::error!(error = %e, "websocket write failed");
                    fail(done, written, e);
                    batch.for_each(Outbound::reject);
                    return false;
                }
                written.push(done);
            }
            Outbound::Close { done } if close.is_none() => close = Some(done),
            // Anything queued behind a close request
            other => other.reject(),
        }
    }

    if let Err(e) = sink.flush().await {
        tracing::error!(error = %e, "websocket flush failed");
        let mut written = written.into_iter();
        if let Some(first) = written.next() {
            fail(first, written, e);
        }
        if let Some(done) = close {
            let _ = done.send(Ok(()));
        }
        return false;
    }

    for done in written {
        let _ = done.send(Ok(()));
    }

    match close {
        Some(done) => {
            let _ = done.send(close_sink(sink).await);
            false
        }
        None => true,
    }
}

/// Report a write error to the frame that hit it; frames written alongside
/// it in the same batch are reported as closed.
fn fail(
    failed: oneshot::Sender<Result<()>>,
    others: impl IntoIterator<Item = oneshot::Sender<Result<()>>>,
    error: WsError,
) {
    let _ = failed.send(Err(RconError::Send(error)));
    for done in others {
        let _ = done.send(Err(RconError::ConnectionClosed));
    }
}

async fn close_sink<S>(sink: &mut S) -> Result<()>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    match sink.close().await {
        Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
        Err(e) => Err(RconError::Send(e)),
    }
}
