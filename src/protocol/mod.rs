//! Protocol module - wire format, framing, and command types.
//!
//! This module implements the framed command protocol:
//! - 4-byte length prefix encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - [`Command`] with its closed name vocabulary

mod command;
mod frame;
mod frame_buffer;
mod wire_format;

pub use command::{Command, CommandName, RemoteError, TransactionId};
pub use frame::{build_frame, decode_frame, encode_frame, DecodeStatus};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    decode_header, encode_header, validate_length, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE,
};
