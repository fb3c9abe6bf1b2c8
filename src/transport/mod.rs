//! Transport module - TCP connections between peers.
//!
//! Any `AsyncRead + AsyncWrite` stream can carry a connection; this module
//! supplies the TCP one the browser and server use.

mod tcp;

pub use tcp::{connect, AddressBookListener, AddressBookStream};
