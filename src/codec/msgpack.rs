//! MsgPack codec using `rmp-serde`.
//!
//! Always use `to_vec_named`, never `to_vec`: commands are key/value maps on
//! the wire, and `to_vec` would serialize structs as positional arrays.
//!
//! # Example
//!
//! ```
//! use remote_address_book::codec::MsgPackCodec;
//! use serde_json::json;
//!
//! let record = json!({"id": "42", "emails": ["alice@example.com"]});
//! let encoded = MsgPackCodec::encode(&record).unwrap();
//! let decoded: serde_json::Value = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, record);
//! ```

use crate::error::Result;

/// MessagePack codec for command payloads.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes in struct-as-map format.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct MailingAddress {
        label: String,
        street: String,
        city: String,
    }

    #[test]
    fn test_struct_encodes_as_map() {
        let address = MailingAddress {
            label: "home".to_string(),
            street: "1 Infinite Loop".to_string(),
            city: "Cupertino".to_string(),
        };

        let encoded = MsgPackCodec::encode(&address).unwrap();

        // 0x83 = fixmap with 3 entries; an array would start with 0x93
        assert_eq!(encoded[0], 0x83);
        let decoded: MailingAddress = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, address);
    }

    #[test]
    fn test_value_shapes_roundtrip() {
        for value in [
            json!("scalar"),
            json!([]),
            json!(["555-0100", "555-0199"]),
            json!([{"id": "1", "name": "Alice"}, {"id": "2", "name": "Bob"}]),
            json!({"nested": {"list": [1, -2, 3]}}),
        ] {
            let encoded = MsgPackCodec::encode(&value).unwrap();
            let decoded: Value = MsgPackCodec::decode(&encoded).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn test_none_encodes_as_nil() {
        let encoded = MsgPackCodec::encode(&None::<String>).unwrap();
        assert_eq!(encoded, vec![0xc0]);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: Result<MailingAddress> = MsgPackCodec::decode(b"not valid msgpack");
        assert!(result.is_err());
    }
}
