//! Error types for remote-address-book.

use thiserror::Error;

use crate::protocol::RemoteError;

/// Name of the error domain all [`ErrorCode`]s belong to.
pub const ERROR_DOMAIN: &str = "remote-address-book";

/// Stable numeric codes within [`ERROR_DOMAIN`].
///
/// Codes travel inside [`RemoteError`] descriptors, so existing values must
/// never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum ErrorCode {
    /// Success.
    NoError = 0,
    /// The named service is not advertised or could not be resolved.
    ServiceNotFound = 1,
    /// Underlying stream I/O failed.
    StreamIo = 2,
    /// A frame could not be parsed or was too large.
    MalformedFrame = 3,
    /// The connection closed before the operation completed.
    ConnectionClosed = 4,
    /// The peer violated the command protocol.
    Protocol = 5,
    /// The peer's command handler reported a failure.
    Remote = 6,
    /// The remote handle was used after `disconnect()`.
    StaleHandle = 7,
    /// The discovery backend failed.
    Discovery = 8,
    /// The send queue was full; the connection stays open.
    Backpressure = 9,
}

impl ErrorCode {
    /// Numeric value of the code.
    #[inline]
    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

/// Main error type for all remote address book operations.
#[derive(Debug, Error)]
pub enum RemoteAddressBookError {
    /// I/O error on the socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream stopped accepting bytes mid-write.
    #[error("stream closed after {written} of {total} bytes were written")]
    StreamClosed {
        /// Bytes accepted before the stream closed.
        written: usize,
        /// Bytes the caller asked to write.
        total: usize,
    },

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Frame payload could not be parsed as a command.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Frame header announced a payload above the configured maximum.
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// Announced payload length.
        size: u32,
        /// Configured maximum.
        max: u32,
    },

    /// Inbound command carried a `name` outside the command vocabulary.
    #[error("unknown command name: {0}")]
    UnknownCommand(String),

    /// A reply arrived with a shape the caller did not expect.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// The peer's handler answered with an error descriptor.
    #[error("remote error: {0}")]
    Remote(RemoteError),

    /// Named service is not advertised or failed to resolve in time.
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    /// Discovery backend failure.
    #[error("discovery error: {0}")]
    Discovery(String),

    /// Connection closed before the operation completed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Send queue is full.
    #[error("send queue full")]
    Backpressure,

    /// Handle used after `disconnect()`.
    #[error("remote address book handle is no longer connected")]
    StaleHandle,

    /// No reply arrived within the configured request timeout.
    #[error("request {0} timed out")]
    RequestTimedOut(String),
}

impl RemoteAddressBookError {
    /// Code of this error within [`ERROR_DOMAIN`].
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Io(_) | Self::StreamClosed { .. } => ErrorCode::StreamIo,
            Self::MsgPackEncode(_)
            | Self::MsgPackDecode(_)
            | Self::MalformedFrame(_)
            | Self::PayloadTooLarge { .. } => ErrorCode::MalformedFrame,
            Self::UnknownCommand(_) | Self::UnexpectedReply(_) | Self::RequestTimedOut(_) => {
                ErrorCode::Protocol
            }
            Self::Remote(_) => ErrorCode::Remote,
            Self::ServiceNotFound(_) => ErrorCode::ServiceNotFound,
            Self::Discovery(_) => ErrorCode::Discovery,
            Self::ConnectionClosed => ErrorCode::ConnectionClosed,
            Self::Backpressure => ErrorCode::Backpressure,
            Self::StaleHandle => ErrorCode::StaleHandle,
        }
    }

    /// Whether this error ends the connection it occurred on.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::StreamIo | ErrorCode::MalformedFrame | ErrorCode::ConnectionClosed
        )
    }
}

/// Result type alias using RemoteAddressBookError.
pub type Result<T> = std::result::Result<T, RemoteAddressBookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(ErrorCode::NoError.as_i64(), 0);
        assert_eq!(ErrorCode::ServiceNotFound.as_i64(), 1);
        assert_eq!(
            RemoteAddressBookError::ServiceNotFound("x".into()).code(),
            ErrorCode::ServiceNotFound
        );
        assert_eq!(
            RemoteAddressBookError::PayloadTooLarge { size: 10, max: 1 }.code(),
            ErrorCode::MalformedFrame
        );
    }

    #[test]
    fn test_fatality() {
        assert!(RemoteAddressBookError::ConnectionClosed.is_connection_fatal());
        assert!(RemoteAddressBookError::MalformedFrame("bad".into()).is_connection_fatal());
        assert!(!RemoteAddressBookError::UnknownCommand("nope".into()).is_connection_fatal());
        assert!(!RemoteAddressBookError::Remote(RemoteError::new(6, "boom")).is_connection_fatal());
    }

    #[test]
    fn test_full_queue_is_not_fatal() {
        let error = RemoteAddressBookError::Backpressure;

        assert_eq!(error.code(), ErrorCode::Backpressure);
        assert_eq!(error.code().as_i64(), 9);
        assert!(!error.is_connection_fatal());
    }
}
