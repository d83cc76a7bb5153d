//! # netframe
//!
//! netframe is an asynchronous TCP server framework built on tokio. It
//! provides the plumbing every framed TCP service needs and nothing else:
//! bounded admission control, per-connection session state machines, and
//! pluggable message framing that turns a raw byte stream into discrete
//! application messages.
//!
//! ## Architecture Overview
//!
//! The crate is organized around a small set of components:
//!
//! - [`framing`] - the [`Framer`] contract plus the built-in
//!   character-delimiter and length-prefix framers
//! - [`pool`] - a process-wide LIFO pool of reusable I/O operation
//!   descriptors that keeps steady-state servers allocation-free
//! - [`session`] - [`ClientSession`], the per-connection receive loop and
//!   state machine
//! - [`server`] - [`Server`], which accepts connections up to a configured
//!   limit and routes session events to a user-supplied [`Handler`]
//! - [`config`] - [`ServerConfig`] with validation and environment loading
//!
//! Every accepted connection consumes one admission permit, runs as its own
//! task, and releases the permit exactly once when it disconnects. Framing
//! failures, socket errors, peer hangups, and cancellation all converge on
//! the same orderly session teardown.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use netframe::{ClientSession, DelimiterFramerFactory, Handler, Server, ServerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! struct Echo;
//!
//! impl Handler<String> for Echo {
//!     async fn on_connected(&self, _session: &Arc<ClientSession<String>>) {}
//!
//!     async fn on_message(
//!         &self,
//!         session: &Arc<ClientSession<String>>,
//!         message: String,
//!     ) -> netframe::Result<()> {
//!         session.send(message.as_bytes()).await
//!     }
//!
//!     async fn on_disconnected(&self, _session: &Arc<ClientSession<String>>) {}
//! }
//!
//! #[tokio::main]
//! async fn main() -> netframe::Result<()> {
//!     let config = ServerConfig::new("0.0.0.0", 7000).with_max_connections(64);
//!     let server = Server::new(config, DelimiterFramerFactory::default(), Echo)?;
//!     server.run(CancellationToken::new()).await
//! }
//! ```
//!
//! ## Wire Formats
//!
//! The wire format is whatever the configured framer says it is:
//!
//! - **Delimiter framing**: payload bytes terminated by a delimiter
//!   character (default `\n`). Messages are delivered as `String` including
//!   the trailing delimiter.
//! - **Length-prefix framing**: a big-endian unsigned length across a fixed
//!   number of header bytes (default 4), followed by exactly that many
//!   payload bytes, delivered as [`bytes::Bytes`].
//!
//! Anything else can be plugged in through the [`FramerFactory`] trait.

pub mod config;
pub mod framing;
pub mod handler;
pub mod pool;
pub mod server;
pub mod session;

pub use config::{ServerConfig, TransportProtocol};
pub use framing::{
    DelimiterFramer, DelimiterFramerFactory, Framer, FramerFactory, FramingError,
    LengthPrefixFramer, LengthPrefixFramerFactory,
};
pub use handler::Handler;
pub use pool::{IoOp, IoOpPool, PoolError, PoolStats};
pub use server::Server;
pub use session::{ClientError, ClientSession, SessionEvents, SessionId};

use thiserror::Error;

/// netframe error types
///
/// This enum represents all failure conditions surfaced by the framework.
///
/// # Error Categories
///
/// - **I/O**: socket bind/accept/read/write failures
/// - **Configuration**: invalid addresses, ports, or sizes, rejected before
///   the server starts
/// - **Framing**: a peer exceeded the configured unframed-byte bound or
///   declared an invalid frame length; fatal for that session only
/// - **Client**: misuse of the session API, e.g. sending after stop;
///   recoverable by the caller
/// - **Pool**: the I/O op pool was used after disposal
/// - **Handler**: an application callback rejected a message
/// - **Cancelled**: the server's run future was cancelled via its token
#[derive(Debug, Error)]
pub enum NetframeError {
    /// Socket and listener I/O failures
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration validation and parsing errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Fatal framing violations from a peer
    #[error("Framing error: {0}")]
    Framing(#[from] framing::FramingError),

    /// Session API misuse
    #[error("Client error: {0}")]
    Client(#[from] session::ClientError),

    /// I/O op pool used after disposal
    #[error("Pool error: {0}")]
    Pool(#[from] pool::PoolError),

    /// Application handler rejected a message
    #[error("Handler error: {0}")]
    Handler(String),

    /// The server run loop was cancelled
    #[error("Server cancelled")]
    Cancelled,
}

/// Result type alias for netframe operations
pub type Result<T> = std::result::Result<T, NetframeError>;
