//! The application-facing remote address book.
//!
//! # Example
//!
//! ```ignore
//! use remote_address_book::RemoteAddressBook;
//!
//! let book = browser.connect("Alice's Contacts").await?;
//! for person in book.all_people().await? {
//!     println!("{person}");
//! }
//! book.disconnect();
//! ```

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::dispatcher::{PendingReply, RemoteCommandDispatcher};
use crate::error::{RemoteAddressBookError, Result};
use crate::protocol::CommandName;

/// Queries against a peer's address book.
#[async_trait]
pub trait RemoteAddressBook: Send + Sync {
    /// Every entry in the book.
    async fn all_people(&self) -> Result<Vec<Value>>;

    /// Mailing addresses of `person_id`.
    async fn mailing_addresses(&self, person_id: &str) -> Result<Vec<Value>>;

    /// Email addresses of `person_id`.
    async fn email_addresses(&self, person_id: &str) -> Result<Vec<Value>>;

    /// Phone numbers of `person_id`.
    async fn phone_numbers(&self, person_id: &str) -> Result<Vec<Value>>;

    /// Close the connection. Later calls fail with `StaleHandle`.
    fn disconnect(&self);
}

/// Handle to one connected peer, returned by
/// [`ServiceBrowser::connect`](crate::ServiceBrowser::connect).
pub struct RemoteAddressBookHandle {
    service_name: String,
    dispatcher: RwLock<Option<RemoteCommandDispatcher>>,
}

impl RemoteAddressBookHandle {
    pub(crate) fn new(service_name: impl Into<String>, dispatcher: RemoteCommandDispatcher) -> Self {
        Self {
            service_name: service_name.into(),
            dispatcher: RwLock::new(Some(dispatcher)),
        }
    }

    /// Name of the service this handle is connected to.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Check if the handle is live and its connection open.
    pub fn is_connected(&self) -> bool {
        self.dispatcher
            .read()
            .as_ref()
            .map_or(false, RemoteCommandDispatcher::is_connected)
    }

    fn issue(&self, name: CommandName, person_id: Option<&str>) -> Result<PendingReply> {
        let dispatcher = self.dispatcher.read();
        let dispatcher = dispatcher.as_ref().ok_or(RemoteAddressBookError::StaleHandle)?;
        dispatcher.issue(name, person_id.map(str::to_string))
    }

    async fn list(&self, name: CommandName, person_id: Option<&str>) -> Result<Vec<Value>> {
        let reply = self.issue(name, person_id)?;
        into_list(name, reply.wait().await?)
    }
}

/// Every query answers with a list; an absent value is an empty one.
fn into_list(name: CommandName, value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(RemoteAddressBookError::UnexpectedReply(format!(
            "{name} answered with {other}, expected a list"
        ))),
    }
}

#[async_trait]
impl RemoteAddressBook for RemoteAddressBookHandle {
    async fn all_people(&self) -> Result<Vec<Value>> {
        self.list(CommandName::AllPeople, None).await
    }

    async fn mailing_addresses(&self, person_id: &str) -> Result<Vec<Value>> {
        self.list(CommandName::GetMailingAddresses, Some(person_id)).await
    }

    async fn email_addresses(&self, person_id: &str) -> Result<Vec<Value>> {
        self.list(CommandName::GetEmailAddresses, Some(person_id)).await
    }

    async fn phone_numbers(&self, person_id: &str) -> Result<Vec<Value>> {
        self.list(CommandName::GetPhoneNumbers, Some(person_id)).await
    }

    fn disconnect(&self) {
        if let Some(dispatcher) = self.dispatcher.write().take() {
            tracing::debug!("disconnecting from {:?}", self.service_name);
            dispatcher.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::protocol::{encode_frame, Command, FrameBuffer};
    use serde_json::json;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::runtime::Handle;

    fn connect() -> (RemoteAddressBookHandle, DuplexStream) {
        let (local, remote) = duplex(4096);
        let dispatcher =
            RemoteCommandDispatcher::new(local, &Handle::current(), &ConnectionConfig::default());
        (RemoteAddressBookHandle::new("Alice's Contacts", dispatcher), remote)
    }

    /// Answer the next request on `remote` with `value`.
    async fn answer(remote: &mut DuplexStream, value: Value) -> Command {
        let mut buffer = FrameBuffer::new();
        let mut buf = [0u8; 1024];
        let request = loop {
            let n = remote.read(&mut buf).await.unwrap();
            assert!(n > 0);
            if let Some(payload) = buffer.push(&buf[..n]).unwrap().into_iter().next() {
                break Command::from_payload(&payload).unwrap();
            }
        };
        remote
            .write_all(&encode_frame(&Command::reply(request.uuid, Ok(value))).unwrap())
            .await
            .unwrap();
        request
    }

    #[tokio::test]
    async fn test_query_methods_send_expected_commands() {
        let (book, mut remote) = connect();
        assert_eq!(book.service_name(), "Alice's Contacts");

        let (people, request) = tokio::join!(
            book.all_people(),
            answer(&mut remote, json!([{"id": "1", "name": "Alice"}]))
        );
        assert_eq!(people.unwrap(), vec![json!({"id": "1", "name": "Alice"})]);
        assert_eq!(request.name, CommandName::AllPeople);
        assert_eq!(request.person_id, None);

        let (phones, request) = tokio::join!(
            book.phone_numbers("1"),
            answer(&mut remote, json!(["555-0100"]))
        );
        assert_eq!(phones.unwrap(), vec![json!("555-0100")]);
        assert_eq!(request.name, CommandName::GetPhoneNumbers);
        assert_eq!(request.person_id.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_empty_and_non_list_answers() {
        let (book, mut remote) = connect();

        let (emails, _) = tokio::join!(book.email_addresses("2"), answer(&mut remote, Value::Null));
        assert!(emails.unwrap().is_empty());

        let (addresses, _) = tokio::join!(
            book.mailing_addresses("2"),
            answer(&mut remote, json!("not a list"))
        );
        assert!(matches!(
            addresses,
            Err(RemoteAddressBookError::UnexpectedReply(_))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_makes_handle_stale() {
        let (book, _remote) = connect();
        assert!(book.is_connected());

        book.disconnect();
        book.disconnect();

        assert!(!book.is_connected());
        assert!(matches!(
            book.all_people().await,
            Err(RemoteAddressBookError::StaleHandle)
        ));
        assert!(matches!(
            book.phone_numbers("1").await,
            Err(RemoteAddressBookError::StaleHandle)
        ));
    }
}
