//! Wire format encoding and decoding.
//!
//! Every frame starts with a 4-byte length prefix:
//! ```text
//! ┌──────────────┬──────────────────────────────┐
//! │ Length       │ Payload                      │
//! │ 4 bytes      │ `Length` bytes, MsgPack map  │
//! │ uint32 BE    │                              │
//! └──────────────┴──────────────────────────────┘
//! ```

use crate::error::{RemoteAddressBookError, Result};

/// Header size in bytes (fixed, exactly 4).
pub const HEADER_SIZE: usize = 4;

/// Default maximum payload size (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Encode a payload length as a frame header (Big Endian).
///
/// # Example
///
/// ```
/// use remote_address_book::protocol::encode_header;
///
/// assert_eq!(encode_header(258), [0, 0, 1, 2]);
/// ```
#[inline]
pub fn encode_header(payload_length: u32) -> [u8; HEADER_SIZE] {
    payload_length.to_be_bytes()
}

/// Decode a frame header, returning the announced payload length.
///
/// Returns `None` if the buffer is too short.
#[inline]
pub fn decode_header(buf: &[u8]) -> Option<u32> {
    let bytes: [u8; HEADER_SIZE] = buf.get(..HEADER_SIZE)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Reject payload lengths above `max_payload_size`.
pub fn validate_length(payload_length: u32, max_payload_size: u32) -> Result<()> {
    if payload_length > max_payload_size {
        return Err(RemoteAddressBookError::PayloadTooLarge {
            size: payload_length,
            max: max_payload_size,
        });
    }
    Ok(())
}
