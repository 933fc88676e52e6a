//! Incremental line framing for streamed response bodies.
//!
//! Both SSE (`data:` lines) and NDJSON bodies arrive as arbitrary byte
//! chunks; complete lines only exist once a newline has been buffered.

use memchr::memchr;

use crate::backend::BackendError;

/// Accumulates response bytes and yields complete, trimmed lines.
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete line, or `None` when no newline is buffered yet.
    ///
    /// Multi-byte characters split across chunk boundaries are fine — bytes
    /// sit in the buffer until their line completes. Invalid UTF-8 inside a
    /// complete line is a protocol error.
    pub fn next_line(&mut self) -> Result<Option<String>, BackendError> {
        let Some(newline_pos) = memchr(b'\n', &self.buf) else {
            return Ok(None);
        };

        let line = match std::str::from_utf8(&self.buf[..newline_pos]) {
            Ok(s) => s.trim().to_string(),
            Err(e) => {
                self.buf.drain(..=newline_pos);
                return Err(BackendError::Stream(format!("invalid UTF-8 in stream: {e}")));
            }
        };
        self.buf.drain(..=newline_pos);
        Ok(Some(line))
    }
}
