//! Inbound request as handed to a [`CommandHandler`](super::CommandHandler).

use crate::error::ErrorCode;
use crate::protocol::{Command, CommandName, RemoteError, TransactionId};

/// A request received from the peer.
///
/// Built only from commands that passed validation: never a `reply`, and
/// `person_id` is present for the `get-*` commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    /// Requested operation.
    pub name: CommandName,
    /// Transaction id the reply must echo.
    pub uuid: TransactionId,
    /// Target person, for the `get-*` commands.
    pub person_id: Option<String>,
}

impl InboundRequest {
    /// The target person, for handlers serving `get-*` commands.
    pub fn person_id(&self) -> Result<&str, RemoteError> {
        self.person_id.as_deref().ok_or_else(|| missing_person_id(self.name))
    }
}

impl TryFrom<Command> for InboundRequest {
    type Error = RemoteError;

    fn try_from(command: Command) -> Result<Self, RemoteError> {
        if command.is_reply() {
            return Err(RemoteError::new(
                ErrorCode::Protocol.as_i64(),
                "a reply is not a request",
            ));
        }
        if command.name.requires_person_id() && command.person_id.is_none() {
            return Err(missing_person_id(command.name));
        }
        Ok(Self {
            name: command.name,
            uuid: command.uuid,
            person_id: command.person_id,
        })
    }
}

fn missing_person_id(name: CommandName) -> RemoteError {
    RemoteError::new(
        ErrorCode::Protocol.as_i64(),
        format!("{name} requires person-id"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_requests() {
        let all = InboundRequest::try_from(Command::request(CommandName::AllPeople, None)).unwrap();
        assert_eq!(all.name, CommandName::AllPeople);
        assert!(all.person_id.is_none());

        let command = Command::request(CommandName::GetMailingAddresses, Some("42".into()));
        let uuid = command.uuid;
        let get = InboundRequest::try_from(command).unwrap();
        assert_eq!(get.uuid, uuid);
        assert_eq!(get.person_id().unwrap(), "42");
    }

    #[test]
    fn test_missing_person_id_rejected() {
        let err = InboundRequest::try_from(Command::request(CommandName::GetPhoneNumbers, None))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Protocol.as_i64());
        assert_eq!(err.message, "get-phone-numbers requires person-id");
    }

    #[test]
    fn test_reply_rejected() {
        let reply = Command::reply(TransactionId::new(), Ok(json!("x")));
        assert!(InboundRequest::try_from(reply).is_err());
    }
}
