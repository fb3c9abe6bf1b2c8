//! Command messages exchanged over a connection.
//!
//! A command is a string-keyed map. On the wire it is a MsgPack map with the
//! keys `name`, `uuid`, and optionally `person-id`, `value` and `error`.
//! Absent optional keys are omitted, not sent as nil.
//!
//! # Example
//!
//! ```
//! use remote_address_book::protocol::{Command, CommandName};
//!
//! let request = Command::request(CommandName::GetEmailAddresses, Some("42".into()));
//! let payload = request.to_payload().unwrap();
//! let decoded = Command::from_payload(&payload).unwrap();
//! assert_eq!(decoded, request);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

use crate::codec::MsgPackCodec;
use crate::error::{ErrorCode, RemoteAddressBookError, Result, ERROR_DOMAIN};

/// Command identifiers understood by both peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandName {
    /// List every entry in the address book.
    AllPeople,
    /// Mailing addresses of one person.
    GetMailingAddresses,
    /// Email addresses of one person.
    GetEmailAddresses,
    /// Phone numbers of one person.
    GetPhoneNumbers,
    /// Answer to an earlier request.
    Reply,
}

/// Wire spelling of every [`CommandName`].
const COMMAND_NAMES: [(CommandName, &str); 5] = [
    (CommandName::AllPeople, "all-people"),
    (CommandName::GetMailingAddresses, "get-mailing-addresses"),
    (CommandName::GetEmailAddresses, "get-email-addresses"),
    (CommandName::GetPhoneNumbers, "get-phone-numbers"),
    (CommandName::Reply, "reply"),
];

impl CommandName {
    /// Wire spelling of this name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllPeople => "all-people",
            Self::GetMailingAddresses => "get-mailing-addresses",
            Self::GetEmailAddresses => "get-email-addresses",
            Self::GetPhoneNumbers => "get-phone-numbers",
            Self::Reply => "reply",
        }
    }

    /// Look up a name by its wire spelling.
    pub fn from_wire(s: &str) -> Option<Self> {
        COMMAND_NAMES
            .iter()
            .find(|(_, wire)| *wire == s)
            .map(|(name, _)| *name)
    }

    /// Check if this is the reply name.
    #[inline]
    pub fn is_reply(self) -> bool {
        self == Self::Reply
    }

    /// Whether requests with this name must carry `person-id`.
    #[inline]
    pub fn requires_person_id(self) -> bool {
        matches!(
            self,
            Self::GetMailingAddresses | Self::GetEmailAddresses | Self::GetPhoneNumbers
        )
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandName {
    type Err = RemoteAddressBookError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_wire(s).ok_or_else(|| RemoteAddressBookError::UnknownCommand(s.to_string()))
    }
}

impl Serialize for CommandName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Transaction identifier correlating a reply with its request.
///
/// Carried on the wire as the hyphenated UUID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Mint a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for TransactionId {
    type Err = RemoteAddressBookError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| RemoteAddressBookError::MalformedFrame(format!("invalid uuid {s:?}: {e}")))
    }
}

impl Serialize for TransactionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Failure description carried in a reply's `error` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Error domain the code belongs to.
    pub domain: String,
    /// Code within the domain.
    pub code: i64,
    /// Human-readable description.
    pub message: String,
}

impl RemoteError {
    /// Create an error in this crate's domain.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            domain: ERROR_DOMAIN.to_string(),
            code,
            message: message.into(),
        }
    }

    /// Error sent back for requests the local side cannot serve.
    pub fn unsupported(name: CommandName) -> Self {
        Self::new(
            ErrorCode::Protocol.as_i64(),
            format!("unsupported command: {name}"),
        )
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.message, self.domain, self.code)
    }
}

/// A decoded command.
///
/// `value` holds `None` rather than `Some(Value::Null)`: nil is never sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    /// Command identifier.
    pub name: CommandName,
    /// Transaction identifier.
    pub uuid: TransactionId,
    /// Target person, for the `get-*` commands.
    #[serde(rename = "person-id", skip_serializing_if = "Option::is_none")]
    pub person_id: Option<String>,
    /// Reply payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Reply failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

/// Loosely typed form used while decoding, so unknown names and bad uuids
/// surface as their own errors instead of a generic decode failure.
#[derive(Deserialize)]
struct WireCommand {
    name: String,
    uuid: String,
    #[serde(rename = "person-id", default)]
    person_id: Option<String>,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    error: Option<RemoteError>,
}

impl Command {
    /// Create a request with a freshly minted transaction id.
    pub fn request(name: CommandName, person_id: Option<String>) -> Self {
        Self {
            name,
            uuid: TransactionId::new(),
            person_id,
            value: None,
            error: None,
        }
    }

    /// Create the reply to transaction `uuid`.
    pub fn reply(uuid: TransactionId, result: std::result::Result<Value, RemoteError>) -> Self {
        let (value, error) = match result {
            Ok(Value::Null) => (None, None),
            Ok(value) => (Some(value), None),
            Err(error) => (None, Some(error)),
        };
        Self {
            name: CommandName::Reply,
            uuid,
            person_id: None,
            value,
            error,
        }
    }

    /// Check if this command is a reply.
    #[inline]
    pub fn is_reply(&self) -> bool {
        self.name.is_reply()
    }

    /// Serialize into a frame payload.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        MsgPackCodec::encode(self)
    }

    /// Parse a frame payload.
    ///
    /// # Errors
    ///
    /// `UnknownCommand` for a well-formed map with an unrecognized `name`;
    /// `MalformedFrame` for anything that is not a command map.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let wire: WireCommand = MsgPackCodec::decode(payload)
            .map_err(|e| RemoteAddressBookError::MalformedFrame(e.to_string()))?;
        let name = wire.name.parse()?;
        let uuid = wire.uuid.parse()?;
        Ok(Self {
            name,
            uuid,
            person_id: wire.person_id,
            value: wire.value.filter(|v| !v.is_null()),
            error: wire.error,
        })
    }

    /// Turn a reply into the result its request resolves with.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(RemoteAddressBookError::Remote(error)),
            None => Ok(self.value.unwrap_or(Value::Null)),
        }
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        use serde::de::Error;

        let wire = WireCommand::deserialize(deserializer)?;
        let name = CommandName::from_wire(&wire.name)
            .ok_or_else(|| D::Error::custom(format!("unknown command name: {}", wire.name)))?;
        let uuid = wire.uuid.parse().map_err(D::Error::custom)?;
        Ok(Self {
            name,
            uuid,
            person_id: wire.person_id,
            value: wire.value.filter(|v| !v.is_null()),
            error: wire.error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roundtrip(command: &Command) -> Command {
        Command::from_payload(&command.to_payload().unwrap()).unwrap()
    }

    #[test]
    fn test_name_mapping_is_bijective() {
        for (name, wire) in COMMAND_NAMES {
            assert_eq!(name.as_str(), wire);
            assert_eq!(CommandName::from_wire(wire), Some(name));
        }
        assert_eq!(CommandName::from_wire("delete-everyone"), None);
    }

    #[test]
    fn test_requires_person_id() {
        assert!(!CommandName::AllPeople.requires_person_id());
        assert!(CommandName::GetPhoneNumbers.requires_person_id());
        assert!(!CommandName::Reply.requires_person_id());
    }

    #[test]
    fn test_request_has_fresh_uuid() {
        let a = Command::request(CommandName::AllPeople, None);
        let b = Command::request(CommandName::AllPeople, None);
        assert_ne!(a.uuid, b.uuid);
    }

    #[test]
    fn test_request_roundtrip() {
        let request = Command::request(CommandName::GetMailingAddresses, Some("42".into()));
        assert_eq!(roundtrip(&request), request);
    }

    #[test]
    fn test_reply_with_records_roundtrip() {
        let uuid = TransactionId::new();
        let value = json!([
            {"id": "1", "firstName": "Alice", "lastName": "Liddell"},
            {"id": "2", "firstName": "Bob", "lastName": "Builder"},
        ]);
        let reply = Command::reply(uuid, Ok(value.clone()));
        let decoded = roundtrip(&reply);
        assert_eq!(decoded, reply);
        assert_eq!(decoded.into_result().unwrap(), value);
    }

    #[test]
    fn test_reply_with_empty_list_roundtrip() {
        let reply = Command::reply(TransactionId::new(), Ok(json!([])));
        assert_eq!(roundtrip(&reply).value, Some(json!([])));
    }

    #[test]
    fn test_reply_with_error_roundtrip() {
        let reply = Command::reply(TransactionId::new(), Err(RemoteError::new(6, "no such person")));
        let decoded = roundtrip(&reply);
        assert_eq!(decoded, reply);
        match decoded.into_result() {
            Err(RemoteAddressBookError::Remote(e)) => assert_eq!(e.message, "no such person"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_null_value_is_omitted() {
        let reply = Command::reply(TransactionId::new(), Ok(Value::Null));
        assert_eq!(reply.value, None);
        assert_eq!(roundtrip(&reply), reply);
    }

    #[test]
    fn test_uuid_travels_as_string() {
        let request = Command::request(CommandName::AllPeople, None);
        let payload = request.to_payload().unwrap();
        let as_json: Value = MsgPackCodec::decode(&payload).unwrap();
        assert_eq!(as_json["uuid"], json!(request.uuid.to_string()));
        assert_eq!(as_json["name"], json!("all-people"));
        assert!(as_json.get("person-id").is_none());
    }

    #[test]
    fn test_unknown_name_is_distinct_error() {
        let payload = MsgPackCodec::encode(&json!({
            "name": "launch-rockets",
            "uuid": TransactionId::new().to_string(),
        }))
        .unwrap();
        let err = Command::from_payload(&payload).unwrap_err();
        assert!(matches!(err, RemoteAddressBookError::UnknownCommand(ref n) if n == "launch-rockets"));
        assert!(!err.is_connection_fatal());
    }

    #[test]
    fn test_bad_uuid_is_malformed() {
        let payload = MsgPackCodec::encode(&json!({"name": "reply", "uuid": "not-a-uuid"})).unwrap();
        let err = Command::from_payload(&payload).unwrap_err();
        assert!(matches!(err, RemoteAddressBookError::MalformedFrame(_)));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = Command::from_payload(b"\xc1\xc1\xc1").unwrap_err();
        assert!(matches!(err, RemoteAddressBookError::MalformedFrame(_)));
    }

    #[test]
    fn test_serde_deserialize_matches_from_payload() {
        let request = Command::request(CommandName::GetPhoneNumbers, Some("7".into()));
        let decoded: Command = MsgPackCodec::decode(&request.to_payload().unwrap()).unwrap();
        assert_eq!(decoded, request);
    }
}
