//! Character-delimiter framing for text protocols.

use bytes::BytesMut;

use super::{Framer, FramerFactory, FramingError};
use crate::{NetframeError, Result};

/// Frames a byte stream on a delimiter character.
///
/// Messages are decoded as UTF-8 (invalid sequences are replaced, never
/// fatal) and include the trailing delimiter. The delimiter is matched on
/// its UTF-8 byte encoding, so multi-byte delimiters work, though `\n` is
/// the common case.
pub struct DelimiterFramer {
    delimiter: [u8; 4],
    delimiter_len: usize,
    max_unframed: usize,
    buffer: BytesMut,
}

impl DelimiterFramer {
    pub const DEFAULT_DELIMITER: char = '\n';
    pub const DEFAULT_MAX_UNFRAMED: usize = 1024;

    /// Create a framer with the given delimiter and unframed-byte bound.
    pub fn new(delimiter: char, max_unframed: usize) -> Result<Self> {
        if max_unframed == 0 {
            return Err(NetframeError::Config(
                "max_unframed must be > 0".to_string(),
            ));
        }
        Ok(Self::from_parts(delimiter, max_unframed))
    }

    fn from_parts(delimiter: char, max_unframed: usize) -> Self {
        let mut encoded = [0u8; 4];
        let delimiter_len = delimiter.encode_utf8(&mut encoded).len();
        Self {
            delimiter: encoded,
            delimiter_len,
            max_unframed,
            buffer: BytesMut::new(),
        }
    }

    /// Byte index of the first delimiter in the buffer, if any.
    fn find_delimiter(&self) -> Option<usize> {
        if self.delimiter_len == 1 {
            let byte = self.delimiter[0];
            self.buffer.iter().position(|&b| b == byte)
        } else {
            self.buffer
                .windows(self.delimiter_len)
                .position(|window| window == &self.delimiter[..self.delimiter_len])
        }
    }
}

impl Framer<String> for DelimiterFramer {
    fn feed(&mut self, chunk: &[u8]) -> std::result::Result<(), FramingError> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.buffer.extend_from_slice(chunk);
        if self.buffer.len() > self.max_unframed && self.find_delimiter().is_none() {
            return Err(FramingError::UnframedOverflow {
                buffered: self.buffer.len(),
                limit: self.max_unframed,
            });
        }
        Ok(())
    }

    fn next(&mut self) -> std::result::Result<Option<String>, FramingError> {
        match self.find_delimiter() {
            Some(position) => {
                let frame = self.buffer.split_to(position + self.delimiter_len);
                Ok(Some(String::from_utf8_lossy(&frame[..]).into_owned()))
            }
            None => Ok(None),
        }
    }
}

/// Factory producing [`DelimiterFramer`] instances, one per connection.
#[derive(Debug, Clone)]
pub struct DelimiterFramerFactory {
    delimiter: char,
    max_unframed: usize,
}

impl DelimiterFramerFactory {
    pub fn new(delimiter: char, max_unframed: usize) -> Result<Self> {
        if max_unframed == 0 {
            return Err(NetframeError::Config(
                "max_unframed must be > 0".to_string(),
            ));
        }
        Ok(Self {
            delimiter,
            max_unframed,
        })
    }
}

impl Default for DelimiterFramerFactory {
    fn default() -> Self {
        Self {
            delimiter: DelimiterFramer::DEFAULT_DELIMITER,
            max_unframed: DelimiterFramer::DEFAULT_MAX_UNFRAMED,
        }
    }
}

impl FramerFactory<String> for DelimiterFramerFactory {
    fn create(&self) -> Box<dyn Framer<String>> {
        Box::new(DelimiterFramer::from_parts(
            self.delimiter,
            self.max_unframed,
        ))
    }
}
