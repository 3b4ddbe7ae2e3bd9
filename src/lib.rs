//! # rustcon
//!
//! Async client for the WebSocket RCON protocol spoken by Rust game servers.
//!
//! One connection carries two kinds of traffic:
//!
//! - **Commands**: the client tags each command with an identifier and the
//!   server echoes it back on the reply.
//! - **Broadcasts**: chat lines and log output pushed by the server with
//!   identifier 0, delivered to an [`RconObserver`].
//!
//! A background reader drains the socket and routes every frame either to
//! the caller waiting on its identifier or to the observer, never both.
//!
//! ## Example
//!
//! ```ignore
//! use rustcon::RconConnection;
//!
//! #[tokio::main]
//! async fn main() -> rustcon::Result<()> {
//!     let rcon = RconConnection::builder("127.0.0.1", 28016, "password")
//!         .on_message(|frame| println!("[{}] {}", frame.kind, frame.message))
//!         .on_chat_message(|chat| println!("{}: {}", chat.username, chat.message))
//!         .build()?;
//!
//!     rcon.connect().await?;
//!     let reply = rcon.send_command("status").await?;
//!     println!("{}", reply.message);
//!     rcon.disconnect().await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod correlation;
pub mod error;
pub mod observer;
pub mod protocol;
pub mod reader;
pub mod router;
pub mod writer;

mod connection;

pub use config::{ConnectionConfig, DispatchMode};
pub use connection::{RconConnection, RconConnectionBuilder};
pub use error::{RconError, Result};
pub use observer::{NoopObserver, RconObserver};
pub use protocol::{ChatEvent, CommandFrame, GenericFrame, MessageType};
