//! Connection settings.
//!
//! [`ConnectionConfig`] holds everything needed to dial a server plus the
//! tuning knobs of the correlation engine. All checks run in
//! [`ConnectionConfig::validate`], before any I/O.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use url::Url;

use crate::correlation::DEFAULT_MAX_IDENTIFIER;
use crate::error::{RconError, Result};
use crate::protocol::Identifier;

/// Default time to wait for a correlated reply.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum number of observer callbacks running at once.
pub const DEFAULT_MAX_CONCURRENT_DISPATCH: usize = 256;

/// Default time allowed for the close frame to flush on disconnect.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Default capacity of the outbound frame queue.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// How observer callbacks are scheduled.
///
/// Replies are delivered by the reader itself in either mode, so a slow
/// callback never holds one up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Callbacks run in parallel on the blocking pool, up to
    /// `max_concurrent_dispatch` at once. Callbacks for different frames
    /// may run out of order.
    #[default]
    Concurrent,
    /// Callbacks run one at a time, in receive order.
    Sequential,
}

/// Settings for one RCON session.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server IP address (IPv4 or IPv6 literal, no hostnames).
    pub address: String,
    /// RCON port.
    pub port: u16,
    /// RCON password, sent as the handshake path.
    pub password: String,
    /// Time to wait for a reply in `send_command`.
    pub command_timeout: Duration,
    /// Identifiers are allocated from `1..=max_identifier`.
    pub max_identifier: Identifier,
    /// Inbound dispatch strategy.
    pub dispatch: DispatchMode,
    /// Bound on concurrently running callbacks in [`DispatchMode::Concurrent`].
    pub max_concurrent_dispatch: usize,
    /// Capacity of the outbound frame queue.
    pub channel_capacity: usize,
    /// Time `disconnect` waits for queued frames and the close frame to
    /// flush before dropping the transport.
    pub close_timeout: Duration,
}

impl ConnectionConfig {
    /// Create a configuration with default tuning values.
    pub fn new(address: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port,
            password: password.into(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            max_identifier: DEFAULT_MAX_IDENTIFIER,
            dispatch: DispatchMode::default(),
            max_concurrent_dispatch: DEFAULT_MAX_CONCURRENT_DISPATCH,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Check every setting, returning the parsed address.
    ///
    /// # Errors
    ///
    /// [`RconError::InvalidConfiguration`] naming the first offending field.
    pub fn validate(&self) -> Result<IpAddr> {
        let ip: IpAddr = self.address.parse().map_err(|_| {
            RconError::invalid(
                "address",
                format!("{:?} is not an IP address", self.address),
            )
        })?;

        if self.port == 0 {
            return Err(RconError::invalid("port", "must be between 1 and 65535"));
        }
        if self.password.is_empty() {
            return Err(RconError::invalid("password", "cannot be empty"));
        }
        if self.max_identifier < 1 {
            return Err(RconError::invalid("max_identifier", "must be at least 1"));
        }
        if self.max_concurrent_dispatch == 0 {
            return Err(RconError::invalid(
                "max_concurrent_dispatch",
                "must be at least 1",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(RconError::invalid("channel_capacity", "must be at least 1"));
        }

        Ok(ip)
    }

    /// Socket address of the server.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::new(self.validate()?, self.port))
    }

    /// Handshake URI: `ws://<ip>:<port>/<password>`.
    ///
    /// The password is percent-encoded as a single path segment.
    pub fn endpoint(&self) -> Result<Url> {
        let addr = self.socket_addr()?;
        let mut url = Url::parse(&format!("ws://{addr}/"))
            .map_err(|e| RconError::invalid("address", e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| RconError::invalid("address", "cannot form a websocket URI"))?
            .pop_if_empty()
            .push(&self.password);
        Ok(url)
    }
}
