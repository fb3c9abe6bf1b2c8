//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need at least 4 bytes
//! - `WaitingForPayload`: Length parsed, need N more payload bytes
//!
//! Feeding a byte stream in any chunking yields the same payloads as feeding
//! it whole.
//!
//! # Example
//!
//! ```
//! use remote_address_book::protocol::{build_frame, FrameBuffer};
//!
//! let mut buffer = FrameBuffer::new();
//! let frame = build_frame(b"payload").unwrap();
//!
//! assert!(buffer.push(&frame[..3]).unwrap().is_empty());
//! let payloads = buffer.push(&frame[3..]).unwrap();
//! assert_eq!(&payloads[0][..], b"payload");
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{decode_header, validate_length, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use crate::error::Result;

/// Initial buffer capacity.
const INITIAL_CAPACITY: usize = 16 * 1024;

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for the 4-byte length prefix.
    WaitingForHeader,
    /// Length parsed, waiting for payload bytes.
    WaitingForPayload { remaining: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frame payloads.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed payload size.
    max_payload_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with the default 16 MiB payload limit.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a new frame buffer with custom max payload size.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            state: State::WaitingForHeader,
            max_payload_size,
        }
    }

    /// Push data into the buffer and extract all complete frame payloads.
    ///
    /// Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns `PayloadTooLarge` if a header announces more than the
    /// configured maximum. The buffer is unusable afterwards; the connection
    /// it serves must be closed.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut payloads = Vec::new();
        while let Some(payload) = self.try_extract_one()? {
            payloads.push(payload);
        }
        Ok(payloads)
    }

    /// Try to extract a single payload from the buffer.
    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.state {
                State::WaitingForHeader => {
                    let Some(length) = decode_header(&self.buffer) else {
                        return Ok(None);
                    };
                    validate_length(length, self.max_payload_size)?;

                    let _ = self.buffer.split_to(HEADER_SIZE);
                    self.state = State::WaitingForPayload {
                        remaining: length as usize,
                    };
                }
                State::WaitingForPayload { remaining } => {
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }

                    let payload = self.buffer.split_to(remaining).freeze();
                    self.state = State::WaitingForHeader;
                    return Ok(Some(payload));
                }
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
