//! Frame encoding and one-shot frame decoding.
//!
//! [`encode_frame`] turns a [`Command`] into wire bytes. [`decode_frame`]
//! parses the first frame in a buffer without consuming it, reporting how many
//! bytes the frame occupied; the resumable form is
//! [`FrameBuffer`](super::FrameBuffer).
//!
//! # Example
//!
//! ```
//! use remote_address_book::protocol::{
//!     decode_frame, encode_frame, Command, CommandName, DecodeStatus, DEFAULT_MAX_PAYLOAD_SIZE,
//! };
//!
//! let command = Command::request(CommandName::AllPeople, None);
//! let bytes = encode_frame(&command).unwrap();
//!
//! match decode_frame(&bytes, DEFAULT_MAX_PAYLOAD_SIZE).unwrap() {
//!     DecodeStatus::Complete { command: decoded, consumed } => {
//!         assert_eq!(decoded, command);
//!         assert_eq!(consumed, bytes.len());
//!     }
//!     DecodeStatus::NeedMoreData => unreachable!(),
//! }
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::command::Command;
use super::wire_format::{decode_header, encode_header, validate_length, HEADER_SIZE};
use crate::error::{RemoteAddressBookError, Result};

/// Outcome of [`decode_frame`].
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeStatus {
    /// A whole frame was parsed.
    Complete {
        /// The decoded command.
        command: Command,
        /// Bytes occupied by the frame, header included.
        consumed: usize,
    },
    /// The buffer holds less than one whole frame.
    NeedMoreData,
}

/// Build a frame from an already serialized payload.
///
/// # Errors
///
/// Returns `PayloadTooLarge` if the payload does not fit the length prefix.
pub fn build_frame(payload: &[u8]) -> Result<Bytes> {
    let length = u32::try_from(payload.len()).map_err(|_| RemoteAddressBookError::PayloadTooLarge {
        size: u32::MAX,
        max: u32::MAX,
    })?;
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_slice(&encode_header(length));
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Serialize a command into a complete frame.
pub fn encode_frame(command: &Command) -> Result<Bytes> {
    build_frame(&command.to_payload()?)
}

/// Parse the first frame in `buf`.
///
/// # Errors
///
/// `PayloadTooLarge` when the header announces more than `max_payload_size`
/// bytes (checked before waiting for the payload), otherwise any error from
/// [`Command::from_payload`].
pub fn decode_frame(buf: &[u8], max_payload_size: u32) -> Result<DecodeStatus> {
    let Some(length) = decode_header(buf) else {
        return Ok(DecodeStatus::NeedMoreData);
    };
    validate_length(length, max_payload_size)?;

    let end = usize::try_from(length)
        .ok()
        .and_then(|length| length.checked_add(HEADER_SIZE))
        .ok_or(RemoteAddressBookError::PayloadTooLarge {
            size: length,
            max: max_payload_size,
        })?;
    let Some(payload) = buf.get(HEADER_SIZE..end) else {
        return Ok(DecodeStatus::NeedMoreData);
    };

    Ok(DecodeStatus::Complete {
        command: Command::from_payload(payload)?,
        consumed: end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CommandName, TransactionId, DEFAULT_MAX_PAYLOAD_SIZE};
    use serde_json::json;

    #[test]
    fn test_build_frame_prefixes_length() {
        let frame = build_frame(b"hello").unwrap();
        assert_eq!(&frame[..HEADER_SIZE], &[0, 0, 0, 5]);
        assert_eq!(&frame[HEADER_SIZE..], b"hello");
    }

    #[test]
    fn test_decode_reports_consumed_and_ignores_trailing() {
        let command = Command::reply(TransactionId::new(), Ok(json!(["a", "b"])));
        let mut bytes = encode_frame(&command).unwrap().to_vec();
        let frame_len = bytes.len();
        bytes.extend_from_slice(&[0, 0]);

        match decode_frame(&bytes, DEFAULT_MAX_PAYLOAD_SIZE).unwrap() {
            DecodeStatus::Complete { command: decoded, consumed } => {
                assert_eq!(decoded, command);
                assert_eq!(consumed, frame_len);
            }
            DecodeStatus::NeedMoreData => panic!("frame should be complete"),
        }
    }

    #[test]
    fn test_decode_needs_more_data() {
        let bytes = encode_frame(&Command::request(CommandName::AllPeople, None)).unwrap();

        for cut in [0, 2, HEADER_SIZE, bytes.len() - 1] {
            assert_eq!(
                decode_frame(&bytes[..cut], DEFAULT_MAX_PAYLOAD_SIZE).unwrap(),
                DecodeStatus::NeedMoreData
            );
        }
    }

    #[test]
    fn test_decode_rejects_oversized_before_payload_arrives() {
        let header = encode_header(1_000);
        let err = decode_frame(&header, 100).unwrap_err();
        assert!(matches!(err, RemoteAddressBookError::PayloadTooLarge { size: 1_000, max: 100 }));
    }

    #[test]
    fn test_decode_largest_announced_length_does_not_overflow() {
        let header = encode_header(u32::MAX);

        // Waits for the payload where it fits in memory, refuses it otherwise.
        match decode_frame(&header, u32::MAX) {
            Ok(DecodeStatus::NeedMoreData) => {}
            Err(RemoteAddressBookError::PayloadTooLarge { size, .. }) => assert_eq!(size, u32::MAX),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_decode_malformed_payload() {
        let frame = build_frame(b"\x93\x01\x02\x03").unwrap();
        let err = decode_frame(&frame, DEFAULT_MAX_PAYLOAD_SIZE).unwrap_err();
        assert!(matches!(err, RemoteAddressBookError::MalformedFrame(_)));
    }
}
