//! # Message Framing
//!
//! A TCP stream delivers bytes with no message boundaries. A [`Framer`]
//! restores them: it consumes arbitrarily fragmented chunks via
//! [`Framer::feed`] and hands back complete messages via [`Framer::next`],
//! buffering partial frames in between.
//!
//! Two framers ship with the crate:
//!
//! - [`DelimiterFramer`] - character-delimited text messages (default `\n`),
//!   delivered as `String` including the trailing delimiter
//! - [`LengthPrefixFramer`] - big-endian length-prefixed binary messages,
//!   delivered as [`bytes::Bytes`]
//!
//! Both enforce a bound on buffered, unframed input. Exceeding the bound is
//! a [`FramingError`] and is fatal: the framer is poisoned and the owning
//! session must disconnect.
//!
//! A [`FramerFactory`] builds one fresh framer per accepted connection, so
//! framer state is never shared between sessions.

pub mod delimiter;
pub mod length_prefix;
#[cfg(test)]
mod tests;

pub use delimiter::{DelimiterFramer, DelimiterFramerFactory};
pub use length_prefix::{LengthPrefixFramer, LengthPrefixFramerFactory};

use thiserror::Error;

/// Fatal framing violations.
///
/// Either variant means the peer is not speaking the configured protocol;
/// the session that observes one disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FramingError {
    /// More unframed bytes buffered than the configured limit allows.
    #[error("buffered {buffered} unframed bytes, exceeding the {limit} byte limit")]
    UnframedOverflow { buffered: usize, limit: usize },

    /// A length header declared a frame size outside the accepted range.
    #[error("declared frame length {declared} outside the allowed range 1..={max}")]
    InvalidLength { declared: u64, max: usize },
}

/// Stateful byte-stream parser producing messages of type `M`.
///
/// Call [`feed`](Framer::feed) once per received chunk, then drain with
/// [`next`](Framer::next) until it returns `Ok(None)`. An `Err` from either
/// call poisons the framer; callers must not feed it further.
pub trait Framer<M>: Send {
    /// Append a chunk of raw bytes from the stream.
    fn feed(&mut self, chunk: &[u8]) -> Result<(), FramingError>;

    /// Extract the next complete message, if one is buffered.
    fn next(&mut self) -> Result<Option<M>, FramingError>;
}

/// Builds a fresh [`Framer`] for each accepted connection.
///
/// One factory instance is shared by the server; every session gets its own
/// framer with private buffers.
pub trait FramerFactory<M>: Send + Sync + 'static {
    fn create(&self) -> Box<dyn Framer<M>>;
}
