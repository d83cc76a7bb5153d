//! Length-prefix framing for binary protocols.

use bytes::{Buf, Bytes, BytesMut};

use super::{Framer, FramerFactory, FramingError};
use crate::{NetframeError, Result};

/// Frames a byte stream on a fixed-width length header.
///
/// Each frame is a `header_size`-byte unsigned big-endian length followed by
/// exactly that many payload bytes. The payload is returned without the
/// header. Declared lengths of zero, or larger than `max_message_size`, are
/// protocol errors.
pub struct LengthPrefixFramer {
    header_size: usize,
    max_message_size: usize,
    buffer: BytesMut,
    // Length decoded from the current header, cached until its payload is
    // fully buffered and extracted.
    pending_len: Option<usize>,
}

impl LengthPrefixFramer {
    pub const DEFAULT_HEADER_SIZE: usize = 4;
    pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

    /// Create a framer with the given header width and payload bound.
    ///
    /// `header_size` must be between 1 and 8 bytes.
    pub fn new(header_size: usize, max_message_size: usize) -> Result<Self> {
        validate_params(header_size, max_message_size)?;
        Ok(Self::from_parts(header_size, max_message_size))
    }

    fn from_parts(header_size: usize, max_message_size: usize) -> Self {
        Self {
            header_size,
            max_message_size,
            buffer: BytesMut::new(),
            pending_len: None,
        }
    }

    /// Decode and validate the buffered header, caching the result.
    ///
    /// `Ok(None)` means the header is not fully buffered yet.
    fn pending(&mut self) -> std::result::Result<Option<usize>, FramingError> {
        if let Some(len) = self.pending_len {
            return Ok(Some(len));
        }
        if self.buffer.len() < self.header_size {
            return Ok(None);
        }
        let declared = self.buffer[..self.header_size]
            .iter()
            .fold(0u64, |len, &b| (len << 8) | u64::from(b));
        if declared == 0 || declared > self.max_message_size as u64 {
            return Err(FramingError::InvalidLength {
                declared,
                max: self.max_message_size,
            });
        }
        let len = declared as usize;
        self.pending_len = Some(len);
        Ok(Some(len))
    }
}

impl Framer<Bytes> for LengthPrefixFramer {
    fn feed(&mut self, chunk: &[u8]) -> std::result::Result<(), FramingError> {
        if !chunk.is_empty() {
            self.buffer.extend_from_slice(chunk);
        }
        // Reject a bad header as soon as it is visible rather than waiting
        // for a drain pass.
        self.pending().map(|_| ())
    }

    fn next(&mut self) -> std::result::Result<Option<Bytes>, FramingError> {
        let Some(len) = self.pending()? else {
            return Ok(None);
        };
        if self.buffer.len() < self.header_size + len {
            return Ok(None);
        }
        self.buffer.advance(self.header_size);
        let payload = self.buffer.split_to(len).freeze();
        self.pending_len = None;
        Ok(Some(payload))
    }
}

/// Factory producing [`LengthPrefixFramer`] instances, one per connection.
#[derive(Debug, Clone)]
pub struct LengthPrefixFramerFactory {
    header_size: usize,
    max_message_size: usize,
}

impl LengthPrefixFramerFactory {
    pub fn new(header_size: usize, max_message_size: usize) -> Result<Self> {
        validate_params(header_size, max_message_size)?;
        Ok(Self {
            header_size,
            max_message_size,
        })
    }
}

impl Default for LengthPrefixFramerFactory {
    fn default() -> Self {
        Self {
            header_size: LengthPrefixFramer::DEFAULT_HEADER_SIZE,
            max_message_size: LengthPrefixFramer::DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl FramerFactory<Bytes> for LengthPrefixFramerFactory {
    fn create(&self) -> Box<dyn Framer<Bytes>> {
        Box::new(LengthPrefixFramer::from_parts(
            self.header_size,
            self.max_message_size,
        ))
    }
}

fn validate_params(header_size: usize, max_message_size: usize) -> Result<()> {
    if header_size == 0 || header_size > 8 {
        return Err(NetframeError::Config(
            "header_size must be between 1 and 8 bytes".to_string(),
        ));
    }
    if max_message_size == 0 {
        return Err(NetframeError::Config(
            "max_message_size must be > 0".to_string(),
        ));
    }
    Ok(())
}
