//! Address book client: one duplex byte stream to one peer.
//!
//! The [`AddressBookClient`] manages the connection lifecycle:
//! 1. Split the stream into read and write halves
//! 2. Spawn the writer task and the read loop on the given runtime
//! 3. Reassemble frames and hand each decoded command to the observer
//! 4. Close once, on end of stream, error or `disconnect()`
//!
//! # Example
//!
//! ```ignore
//! use remote_address_book::client::{AddressBookClient, ClientObserver};
//!
//! let stream = tokio::net::TcpStream::connect(addr).await?;
//! let client = AddressBookClient::new(stream, observer, &Handle::current(), &config);
//! client.send(&Command::request(CommandName::AllPeople, None))?;
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::config::ConnectionConfig;
use crate::error::{RemoteAddressBookError, Result};
use crate::protocol::{Command, FrameBuffer};
use crate::writer::{spawn_writer_task, CommandSender};

/// Lifecycle of a connection. A closed connection is never reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Streams are being wrapped and scheduled.
    Initializing,
    /// Both directions are live.
    StreamsOpen,
    /// Terminal.
    Closed,
}

/// Receives what a connection reads.
///
/// Both methods are called from the read loop and must not block.
pub trait ClientObserver: Send + Sync + 'static {
    /// A complete command arrived. `replies` queues frames on the same
    /// connection.
    fn handle_command(&self, command: Command, replies: &CommandSender);

    /// The connection failed or the peer closed it. Called at most once, and
    /// never after `disconnect()`.
    fn connection_failed(&self, error: RemoteAddressBookError);
}

/// State shared between the client handle and its tasks.
struct Shared {
    state: Mutex<ConnectionState>,
    tasks: Mutex<Vec<AbortHandle>>,
    observer: Arc<dyn ClientObserver>,
}

impl Shared {
    fn is_closed(&self) -> bool {
        *self.state.lock() == ConnectionState::Closed
    }

    /// Enter `Closed` and stop both tasks. Returns `false` if already closed.
    fn close(&self, cause: Option<RemoteAddressBookError>) -> bool {
        {
            let mut state = self.state.lock();
            if *state == ConnectionState::Closed {
                return false;
            }
            *state = ConnectionState::Closed;
        }

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        if let Some(error) = cause {
            tracing::debug!("connection closed: {}", error);
            self.observer.connection_failed(error);
        }
        true
    }
}

/// A live connection to one peer.
///
/// Dropping the client disconnects it.
pub struct AddressBookClient {
    shared: Arc<Shared>,
    sender: CommandSender,
}

impl AddressBookClient {
    /// Wrap `stream` and schedule its read loop and writer task on `runtime`.
    ///
    /// Both tasks run on `runtime`; the connection must not be driven from
    /// any other runtime.
    pub fn new<S>(
        stream: S,
        observer: Arc<dyn ClientObserver>,
        runtime: &Handle,
        config: &ConnectionConfig,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(ConnectionState::Initializing),
            tasks: Mutex::new(Vec::with_capacity(2)),
            observer,
        });

        let (reader, write_half) = tokio::io::split(stream);
        let (sender, writer_task) =
            spawn_writer_task(write_half, config.send_queue_capacity, runtime);

        // Hold the task list while spawning so an immediate close cannot miss
        // a task.
        let mut tasks = shared.tasks.lock();
        *shared.state.lock() = ConnectionState::StreamsOpen;

        tasks.push(writer_task.abort_handle());
        let supervisor = shared.clone();
        runtime.spawn(async move {
            if let Ok(Err(e)) = writer_task.await {
                tracing::error!("Writer error: {}", e);
                supervisor.close(Some(e));
            }
        });

        let read_loop = runtime.spawn(Self::read_loop(
            reader,
            shared.clone(),
            sender.clone(),
            config.max_payload_size,
            config.read_buffer_size,
        ));
        tasks.push(read_loop.abort_handle());
        drop(tasks);

        Self { shared, sender }
    }

    /// Read until the stream ends or fails, then close.
    async fn read_loop<R>(
        reader: R,
        shared: Arc<Shared>,
        sender: CommandSender,
        max_payload_size: u32,
        read_buffer_size: usize,
    ) where
        R: AsyncRead + Unpin,
    {
        let cause = match Self::read_commands(
            reader,
            &shared,
            &sender,
            max_payload_size,
            read_buffer_size,
        )
        .await
        {
            Ok(()) => RemoteAddressBookError::ConnectionClosed,
            Err(e) => {
                tracing::error!("Read loop error: {}", e);
                e
            }
        };
        shared.close(Some(cause));
    }

    async fn read_commands<R>(
        mut reader: R,
        shared: &Shared,
        sender: &CommandSender,
        max_payload_size: u32,
        read_buffer_size: usize,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut frame_buffer = FrameBuffer::with_max_payload(max_payload_size);
        let mut buf = vec![0u8; read_buffer_size.max(1)];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(RemoteAddressBookError::Io(e)),
            };

            for payload in frame_buffer.push(&buf[..n])? {
                if shared.is_closed() {
                    return Ok(());
                }
                match Command::from_payload(&payload) {
                    Ok(command) => shared.observer.handle_command(command, sender),
                    Err(RemoteAddressBookError::UnknownCommand(name)) => {
                        tracing::warn!("Dropping command with unknown name {:?}", name);
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }

    /// Queue a command for sending.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` once the connection is closed, `Backpressure` if
    /// the send queue is full.
    pub fn send(&self, command: &Command) -> Result<()> {
        if self.shared.is_closed() {
            return Err(RemoteAddressBookError::ConnectionClosed);
        }
        self.sender.send_command(command)
    }

    /// A sender for queueing frames on this connection.
    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// Check if the connection is still open.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::StreamsOpen
    }

    /// Close both directions now. Unsent frames are discarded and the
    /// observer is not notified. Idempotent.
    pub fn disconnect(&self) {
        if self.shared.close(None) {
            tracing::debug!("client disconnected");
        }
    }
}

impl Drop for AddressBookClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MsgPackCodec;
    use crate::protocol::{build_frame, encode_frame, encode_header, CommandName, TransactionId};
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};
    use tokio::sync::mpsc;

    #[derive(Debug)]
    enum Event {
        Command(Command),
        Failed(RemoteAddressBookError),
    }

    struct RecordingObserver {
        events: mpsc::UnboundedSender<Event>,
    }

    impl ClientObserver for RecordingObserver {
        fn handle_command(&self, command: Command, _replies: &CommandSender) {
            let _ = self.events.send(Event::Command(command));
        }

        fn connection_failed(&self, error: RemoteAddressBookError) {
            let _ = self.events.send(Event::Failed(error));
        }
    }

    fn connect(config: &ConnectionConfig) -> (AddressBookClient, DuplexStream, mpsc::UnboundedReceiver<Event>) {
        let (local, remote) = duplex(4096);
        let (tx, rx) = mpsc::unbounded_channel();
        let observer = Arc::new(RecordingObserver { events: tx });
        let client = AddressBookClient::new(local, observer, &Handle::current(), config);
        (client, remote, rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("observer dropped")
    }

    #[tokio::test]
    async fn test_client_starts_open() {
        let (client, _remote, _rx) = connect(&ConnectionConfig::default());
        assert_eq!(client.state(), ConnectionState::StreamsOpen);
        assert!(client.is_open());
    }

    #[tokio::test]
    async fn test_inbound_commands_in_order_across_fragments() {
        let (_client, mut remote, mut rx) = connect(&ConnectionConfig::default());

        let commands: Vec<Command> = (0..3)
            .map(|i| Command::request(CommandName::GetEmailAddresses, Some(i.to_string())))
            .collect();
        let bytes: Vec<u8> = commands
            .iter()
            .flat_map(|c| encode_frame(c).unwrap().to_vec())
            .collect();

        for chunk in bytes.chunks(7) {
            remote.write_all(chunk).await.unwrap();
            remote.flush().await.unwrap();
        }

        for expected in &commands {
            match next_event(&mut rx).await {
                Event::Command(command) => assert_eq!(&command, expected),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_send_reaches_peer() {
        let (client, mut remote, _rx) = connect(&ConnectionConfig::default());
        let command = Command::request(CommandName::AllPeople, None);

        client.send(&command).unwrap();

        let expected = encode_frame(&command).unwrap();
        let mut received = vec![0u8; expected.len()];
        remote.read_exact(&mut received).await.unwrap();
        assert_eq!(received, expected.to_vec());
    }

    #[tokio::test]
    async fn test_peer_eof_reports_connection_closed_once() {
        let (client, remote, mut rx) = connect(&ConnectionConfig::default());

        drop(remote);

        assert!(matches!(
            next_event(&mut rx).await,
            Event::Failed(RemoteAddressBookError::ConnectionClosed)
        ));
        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(matches!(
            client.send(&Command::request(CommandName::AllPeople, None)),
            Err(RemoteAddressBookError::ConnectionClosed)
        ));

        client.disconnect();
        drop(client);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_frame_closes_connection() {
        let (client, mut remote, mut rx) = connect(&ConnectionConfig::default());

        remote.write_all(&build_frame(b"\x93\x01\x02\x03").unwrap()).await.unwrap();

        assert!(matches!(
            next_event(&mut rx).await,
            Event::Failed(RemoteAddressBookError::MalformedFrame(_))
        ));
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_oversized_frame_closes_connection() {
        let config = ConnectionConfig {
            max_payload_size: 64,
            ..ConnectionConfig::default()
        };
        let (_client, mut remote, mut rx) = connect(&config);

        remote.write_all(&encode_header(1 << 20)).await.unwrap();

        assert!(matches!(
            next_event(&mut rx).await,
            Event::Failed(RemoteAddressBookError::PayloadTooLarge { max: 64, .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_command_is_skipped() {
        let (client, mut remote, mut rx) = connect(&ConnectionConfig::default());

        let unknown = MsgPackCodec::encode(&json!({
            "name": "set-everything",
            "uuid": TransactionId::new().to_string(),
        }))
        .unwrap();
        let known = Command::request(CommandName::AllPeople, None);

        remote.write_all(&build_frame(&unknown).unwrap()).await.unwrap();
        remote.write_all(&encode_frame(&known).unwrap()).await.unwrap();

        match next_event(&mut rx).await {
            Event::Command(command) => assert_eq!(command, known),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(client.is_open());
    }

    #[tokio::test]
    async fn test_disconnect_is_silent_and_closes_stream() {
        let (client, mut remote, mut rx) = connect(&ConnectionConfig::default());

        client.disconnect();
        client.disconnect();

        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(matches!(
            client.send(&Command::request(CommandName::AllPeople, None)),
            Err(RemoteAddressBookError::ConnectionClosed)
        ));

        let mut buf = Vec::new();
        let n = tokio::time::timeout(Duration::from_secs(5), remote.read_to_end(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);

        drop(client);
        assert!(rx.recv().await.is_none());
    }
}
