//! Codec module - serialization of command payloads.
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (`to_vec_named`, so
//!   structs travel as maps keyed by field name)
//!
//! Codecs are marker structs with static methods rather than trait objects.

mod msgpack;

pub use msgpack::MsgPackCodec;
