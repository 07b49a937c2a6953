//! Incremental framing for the streamed tail response.
//!
//! The tail endpoint answers with one JSON array that grows as entries
//! arrive: `[{...}\n,{...}\n` and eventually `]`. [`JsonStreamDecoder`] pulls
//! complete top-level objects out of that byte stream as soon as their
//! closing brace is buffered. Plain newline-delimited objects decode too.

use bytes::{Buf, BytesMut};
use serde::de::Error as _;
use serde_json::{Deserializer, Value};

/// Largest single tail message held while waiting for its end.
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug)]
pub struct JsonStreamDecoder {
    buf: BytesMut,
    limit: usize,
}

impl Default for JsonStreamDecoder {
    fn default() -> Self {
        Self::with_limit(MAX_MESSAGE_BYTES)
    }
}

impl JsonStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail once an unfinished message grows past `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            limit,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes buffered but not yet decoded.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete object, or `Ok(None)` if more bytes are needed.
    pub fn next_object(&mut self) -> Result<Option<Value>, serde_json::Error> {
        let skip = self
            .buf
            .iter()
            .take_while(|b| matches!(b, b'[' | b']' | b',' | b' ' | b'\t' | b'\r' | b'\n'))
            .count();
        self.buf.advance(skip);
        if self.buf.is_empty() {
            return Ok(None);
        }
        if self.buf[0] != b'{' {
            let end = self.buf.len().min(64);
            return Err(serde_json::Error::custom(format!(
                "expected an object in tail stream, got {:?}",
                String::from_utf8_lossy(&self.buf[..end])
            )));
        }

        let (next, used) = {
            let mut stream = Deserializer::from_slice(&self.buf).into_iter::<Value>();
            let next = stream.next();
            (next, stream.byte_offset())
        };
        match next {
            Some(Ok(value)) => {
                self.buf.advance(used);
                Ok(Some(value))
            }
            Some(Err(e)) if e.is_eof() => {
                if self.buf.len() > self.limit {
                    return Err(serde_json::Error::custom(format!(
                        "tail message exceeds {} bytes",
                        self.limit
                    )));
                }
                Ok(None)
            }
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}
