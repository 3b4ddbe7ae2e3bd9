//! Connection facade and builder.
//!
//! [`RconConnection`] owns the session lifecycle:
//! 1. Validate settings and build the handshake URI
//! 2. Dial the WebSocket and split it
//! 3. Spawn the writer task, fire `on_connected`
//! 4. Spawn the reader loop
//!
//! Teardown runs at most once per session, whether it starts from
//! [`RconConnection::disconnect`] or from the reader loop ending.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::codec::JsonCodec;
use crate::config::{ConnectionConfig, DispatchMode};
use crate::correlation::{CorrelationTable, PendingReply};
use crate::error::{RconError, Result};
use crate::observer::{CallbackObserver, NoopObserver, RconObserver};
use crate::protocol::{ChatEvent, CommandFrame, GenericFrame, Identifier};
use crate::reader::Reader;
use crate::router::Router;
use crate::writer::{spawn_writer_task, WriterHandle};

/// Builder for an [`RconConnection`].
///
/// Hooks may be given as closures or as a single [`RconObserver`], not both.
pub struct RconConnectionBuilder {
    config: ConnectionConfig,
    callbacks: CallbackObserver,
    observer: Option<Arc<dyn RconObserver>>,
}

impl RconConnectionBuilder {
    fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            callbacks: CallbackObserver::default(),
            observer: None,
        }
    }

    /// Time to wait for a correlated reply.
    ///
    /// Default: 10 seconds
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Upper bound of the identifier range.
    ///
    /// Default: 1000
    pub fn max_identifier(mut self, max: Identifier) -> Self {
        self.config.max_identifier = max;
        self
    }

    /// Inbound dispatch strategy.
    pub fn dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.config.dispatch = mode;
        self
    }

    /// Maximum frames routed at once in concurrent mode.
    ///
    /// Default: 256
    pub fn max_concurrent_dispatch(mut self, limit: usize) -> Self {
        self.config.max_concurrent_dispatch = limit;
        self
    }

    /// Capacity of the outbound frame queue.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set the close flush bound used by `disconnect`.
    ///
    /// Default: 1 second
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout = timeout;
        self
    }

    /// Called once the transport is attached, before `connect` returns.
    pub fn on_connected<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks.on_connected = Some(Box::new(hook));
        self
    }

    /// Called for every frame that is neither a reply nor a chat line.
    pub fn on_message<F>(mut self, hook: F) -> Self
    where
        F: Fn(GenericFrame) + Send + Sync + 'static,
    {
        self.callbacks.on_message = Some(Box::new(hook));
        self
    }

    /// Called for every decoded chat broadcast.
    pub fn on_chat_message<F>(mut self, hook: F) -> Self
    where
        F: Fn(ChatEvent) + Send + Sync + 'static,
    {
        self.callbacks.on_chat_message = Some(Box::new(hook));
        self
    }

    /// Called once per session when it is torn down.
    pub fn on_disconnected<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks.on_disconnected = Some(Box::new(hook));
        self
    }

    /// Use a custom observer instead of closure hooks.
    pub fn observer(mut self, observer: Arc<dyn RconObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Validate the settings and create a detached connection.
    ///
    /// No I/O takes place until [`RconConnection::connect`].
    pub fn build(self) -> Result<RconConnection> {
        let observer = match self.observer {
            Some(_) if !self.callbacks.is_empty() => {
                return Err(RconError::invalid(
                    "observer",
                    "closure hooks and a custom observer cannot be combined",
                ));
            }
            Some(observer) => observer,
            None => Arc::new(self.callbacks),
        };
        RconConnection::with_observer(self.config, observer)
    }
}

/// An attached transport.
struct Session {
    generation: u64,
    writer: WriterHandle,
    writer_task: JoinHandle<()>,
    reader_task: Option<JoinHandle<()>>,
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}

struct Inner {
    config: ConnectionConfig,
    router: Arc<Router>,
    session: Mutex<Option<Session>>,
    generation: AtomicU64,
}

impl Inner {
    /// Tear down the current session.
    ///
    /// With `origin` set, only the session of that generation is torn down;
    /// a reader that outlived its session finds nothing to do.
    async fn detach(&self, origin: Option<u64>) -> Result<()> {
        let session = {
            let mut guard = self.session.lock();
            match guard.as_ref() {
                Some(session) if origin.map_or(true, |g| g == session.generation) => guard.take(),
                _ => None,
            }
        };
        let Some(session) = session else {
            return Err(RconError::NotConnected);
        };

        let abandoned = self.router.pending().drain_all();
        let bound = self.config.close_timeout;
        let closed = match tokio::time::timeout(bound, session.writer.close()).await {
            Ok(closed) => closed,
            Err(_elapsed) => {
                tracing::warn!(timeout = ?bound, "close frame not flushed, dropping transport");
                session.writer_task.abort();
                Ok(())
            }
        };
        let generation = session.generation;
        drop(session);

        tracing::debug!(generation, abandoned, "disconnected");
        self.router.observer().on_disconnected();
        closed
    }
}

/// Client for one RCON server.
///
/// Cloning yields another handle to the same session, so commands can be
/// issued from many tasks at once.
///
/// # Example
///
/// ```ignore
/// let rcon = RconConnection::builder("127.0.0.1", 28016, "password")
///     .on_chat_message(|chat| println!("{}: {}", chat.username, chat.message))
///     .build()?;
///
/// rcon.connect().await?;
/// let reply = rcon.send_command("status").await?;
/// println!("{}", reply.message);
/// rcon.disconnect().await?;
/// ```
#[derive(Clone)]
pub struct RconConnection {
    inner: Arc<Inner>,
}

impl RconConnection {
    /// Start building a connection with default tuning.
    pub fn builder(
        address: impl Into<String>,
        port: u16,
        password: impl Into<String>,
    ) -> RconConnectionBuilder {
        RconConnectionBuilder::new(ConnectionConfig::new(address, port, password))
    }

    /// Create a detached connection without observer hooks.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        Self::with_observer(config, Arc::new(NoopObserver))
    }

    /// Create a detached connection reporting to `observer`.
    ///
    /// # Errors
    ///
    /// [`RconError::InvalidConfiguration`] if `config` fails validation.
    pub fn with_observer(
        config: ConnectionConfig,
        observer: Arc<dyn RconObserver>,
    ) -> Result<Self> {
        config.validate()?;
        let pending = CorrelationTable::with_capacity(config.max_identifier);
        Ok(Self {
            inner: Arc::new(Inner {
                router: Arc::new(Router::new(pending, observer)),
                config,
                session: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        })
    }

    /// Dial the server and start the reader loop.
    ///
    /// `on_connected` runs before this returns and before any inbound frame
    /// is routed.
    ///
    /// # Errors
    ///
    /// - [`RconError::InvalidConfiguration`] before any I/O.
    /// - [`RconError::AlreadyConnected`] if a transport is attached.
    /// - [`RconError::Connect`] if the dial or handshake fails, including a
    ///   rejected password.
    pub async fn connect(&self) -> Result<()> {
        let url = self.inner.config.endpoint()?;
        if self.is_connected() {
            return Err(RconError::AlreadyConnected);
        }

        let config = &self.inner.config;
        tracing::debug!(address = %config.address, port = config.port, "connecting");

        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(RconError::Connect)?;
        let (sink, stream) = socket.split();

        let (writer, writer_task) = spawn_writer_task(sink, config.channel_capacity);
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;

        let raced = {
            let mut session = self.inner.session.lock();
            if session.is_some() {
                Some(writer)
            } else {
                *session = Some(Session {
                    generation,
                    writer,
                    writer_task,
                    reader_task: None,
                });
                None
            }
        };
        if let Some(writer) = raced {
            // Lost a race with another connect on this handle
            let _ = writer.close().await;
            return Err(RconError::AlreadyConnected);
        }

        tracing::debug!(address = %config.address, port = config.port, generation, "connected");
        self.inner.router.observer().on_connected();

        let reader = Reader::from_config(self.inner.router.clone(), config);
        let exit = ReaderExit {
            inner: Arc::downgrade(&self.inner),
            generation,
        };
        let task = tokio::spawn(async move {
            let _exit = exit;
            if let Err(e) = reader.run(stream).await {
                tracing::warn!(error = %e, "reader loop failed");
            }
        });

        let mut session = self.inner.session.lock();
        match session.as_mut() {
            Some(session) if session.generation == generation => session.reader_task = Some(task),
            // Torn down before the reader was recorded
            _ => task.abort(),
        }
        Ok(())
    }

    /// Send a command and wait for its correlated reply.
    ///
    /// # Errors
    ///
    /// - [`RconError::NotConnected`] if no transport is attached; no
    ///   identifier is allocated.
    /// - [`RconError::ExhaustedIdentifierSpace`] if every identifier is in use.
    /// - [`RconError::Send`] if the frame could not be written.
    /// - [`RconError::Timeout`] if no reply arrives within the command timeout.
    /// - [`RconError::ConnectionClosed`] if the session ends mid-wait.
    pub async fn send_command(&self, command: &str) -> Result<GenericFrame> {
        let (writer, slot) = self.reserve()?;
        let identifier = slot.identifier();

        // On failure the slot drops here and frees the identifier
        let text = JsonCodec::encode(&CommandFrame::new(identifier, command))?;
        let len = text.len();
        writer.send_text(text).await?;
        tracing::debug!(identifier, len, "command sent");

        let timeout = self.inner.config.command_timeout;
        let reply = slot.wait(timeout).await;
        if let Err(RconError::Timeout { .. }) = &reply {
            tracing::warn!(identifier, ?timeout, "command timed out");
        }
        reply
    }

    /// Send a command with identifier 0 without waiting for a reply.
    ///
    /// Anything the server pushes back surfaces through `on_message`.
    pub async fn send_command_detached(&self, command: &str) -> Result<()> {
        let writer = self.writer()?;
        let text = JsonCodec::encode(&CommandFrame::detached(command))?;
        writer.send_text(text).await
    }

    /// Fail every outstanding command, close the transport, and fire
    /// `on_disconnected`.
    ///
    /// # Errors
    ///
    /// - [`RconError::NotConnected`] if already detached.
    /// - [`RconError::Send`] if the close frame could not be written; the
    ///   session is torn down regardless.
    pub async fn disconnect(&self) -> Result<()> {
        self.inner.detach(None).await
    }

    /// Check if a transport is attached.
    pub fn is_connected(&self) -> bool {
        self.inner.session.lock().is_some()
    }

    /// Number of commands awaiting a reply.
    pub fn pending_replies(&self) -> usize {
        self.inner.router.pending().len()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn address(&self) -> &str {
        &self.inner.config.address
    }

    pub fn port(&self) -> u16 {
        self.inner.config.port
    }

    pub fn password(&self) -> &str {
        &self.inner.config.password
    }

    fn writer(&self) -> Result<WriterHandle> {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(|session| session.writer.clone())
            .ok_or(RconError::NotConnected)
    }

    /// Reserve a reply slot while holding the session lock, so a concurrent
    /// disconnect either sees the slot in its drain or leaves us detached.
    fn reserve(&self) -> Result<(WriterHandle, PendingReply<'_>)> {
        let session = self.inner.session.lock();
        let session = session.as_ref().ok_or(RconError::NotConnected)?;
        let slot = self.inner.router.pending().reserve()?;
        Ok((session.writer.clone(), slot))
    }
}

impl std::fmt::Debug for RconConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RconConnection")
            .field("address", &self.inner.config.address)
            .field("port", &self.inner.config.port)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// Tears the session down when the reader task ends, whether it returned,
/// panicked, or was aborted.
///
/// Teardown runs on its own task so that aborting the reader cannot cut
/// it short.
struct ReaderExit {
    inner: Weak<Inner>,
    generation: u64,
}

impl Drop for ReaderExit {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let generation = self.generation;
        runtime.spawn(async move {
            match inner.detach(Some(generation)).await {
                Ok(()) | Err(RconError::NotConnected) => {}
                Err(e) => tracing::debug!(error = %e, "close after reader exit failed"),
            }
        });
    }
}
