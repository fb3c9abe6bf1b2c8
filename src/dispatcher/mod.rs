//! Remote command dispatcher: request/reply correlation over one connection.
//!
//! ```text
//! issue() ──► PendingRequests.insert(uuid) ──► CommandSender ──► peer
//!                                                                 │
//! PendingReply.wait() ◄── PendingRequests.complete(uuid) ◄── reply┘
//! ```
//!
//! Replies are matched by transaction id, never by arrival order. Requests
//! from the peer are handed to the installed [`CommandHandler`] on their own
//! task and answered with a `reply` echoing their transaction id.

mod pending;

pub use pending::{PendingReply, PendingRequests};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::client::{AddressBookClient, ClientObserver, ConnectionState};
use crate::config::ConnectionConfig;
use crate::error::{ErrorCode, RemoteAddressBookError, Result};
use crate::handler::{CommandHandler, InboundRequest};
use crate::protocol::{Command, CommandName, RemoteError};
use crate::writer::CommandSender;

/// Receives connection-level failures.
pub type ErrorHandler = Arc<dyn Fn(RemoteAddressBookError) + Send + Sync>;

/// State the connection's read loop reports into.
struct Inner {
    pending: Arc<PendingRequests>,
    handler: RwLock<Option<Arc<dyn CommandHandler>>>,
    error_handler: RwLock<Option<ErrorHandler>>,
    /// Bounds concurrently running handler tasks.
    semaphore: Arc<Semaphore>,
    handler_tasks: Mutex<HandlerTasks>,
    runtime: Handle,
}

/// Handler tasks still running for this connection.
#[derive(Default)]
struct HandlerTasks {
    running: Vec<JoinHandle<()>>,
    closed: bool,
}

impl Inner {
    /// Abort every running handler and refuse new ones.
    fn stop_handlers(&self) {
        let running = {
            let mut tasks = self.handler_tasks.lock();
            tasks.closed = true;
            std::mem::take(&mut tasks.running)
        };
        for task in &running {
            task.abort();
        }
        if !running.is_empty() {
            tracing::debug!("aborted {} running handlers", running.len());
        }
    }

    fn handle_reply(&self, command: Command) {
        let uuid = command.uuid;
        if !self.pending.complete(&uuid, command.into_result()) {
            tracing::warn!("Dropping reply for unknown transaction {}", uuid);
        }
    }

    fn handle_request(&self, command: Command, replies: &CommandSender) {
        let uuid = command.uuid;
        let name = command.name;

        let Some(handler) = self.handler.read().clone() else {
            tracing::debug!("No command handler installed, refusing {}", name);
            send_reply(replies, Command::reply(uuid, Err(RemoteError::unsupported(name))));
            return;
        };

        let request = match InboundRequest::try_from(command) {
            Ok(request) => request,
            Err(error) => {
                tracing::warn!("Rejecting {} {}: {}", name, uuid, error);
                send_reply(replies, Command::reply(uuid, Err(error)));
                return;
            }
        };

        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!("Handler capacity reached, refusing {} {}", name, uuid);
                let busy = RemoteError::new(
                    ErrorCode::Protocol.as_i64(),
                    "too many concurrent requests",
                );
                send_reply(replies, Command::reply(uuid, Err(busy)));
                return;
            }
        };

        // Held while spawning so a concurrent close cannot miss the task.
        let mut tasks = self.handler_tasks.lock();
        if tasks.closed {
            tracing::debug!("Connection closed, dropping {} {}", name, uuid);
            return;
        }
        tasks.running.retain(|task| !task.is_finished());

        let replies = replies.clone();
        let task = self.runtime.spawn(async move {
            // Permit is held until this task completes
            let _permit = permit;

            let result = handler.call(request).await;
            if let Err(error) = &result {
                tracing::debug!("Handler error for {} {}: {}", name, uuid, error);
            }
            send_reply(&replies, Command::reply(uuid, result));
        });
        tasks.running.push(task);
    }
}

fn send_reply(replies: &CommandSender, reply: Command) {
    match replies.send_command(&reply) {
        Ok(()) => {}
        Err(RemoteAddressBookError::ConnectionClosed) => {
            tracing::debug!("Connection closed before reply {} was sent", reply.uuid);
        }
        Err(e) => tracing::error!("Failed to send reply {}: {}", reply.uuid, e),
    }
}

impl ClientObserver for Inner {
    fn handle_command(&self, command: Command, replies: &CommandSender) {
        if command.is_reply() {
            self.handle_reply(command);
        } else {
            self.handle_request(command, replies);
        }
    }

    fn connection_failed(&self, error: RemoteAddressBookError) {
        self.stop_handlers();
        let failed = self.pending.fail_all();
        tracing::debug!("connection failed with {} pending requests: {}", failed, error);

        let sink = self.error_handler.read().clone();
        match sink {
            Some(sink) => sink(error),
            None => tracing::warn!("Connection error: {}", error),
        }
    }
}

/// Typed request/reply surface over one connection.
///
/// Dropping the dispatcher disconnects it.
pub struct RemoteCommandDispatcher {
    inner: Arc<Inner>,
    client: AddressBookClient,
    request_timeout: Option<Duration>,
}

impl RemoteCommandDispatcher {
    /// Wrap `stream` in a connection driven on `runtime`.
    pub fn new<S>(stream: S, runtime: &Handle, config: &ConnectionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let inner = Arc::new(Inner {
            pending: Arc::new(PendingRequests::new()),
            handler: RwLock::new(None),
            error_handler: RwLock::new(None),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_handlers.max(1))),
            handler_tasks: Mutex::new(HandlerTasks::default()),
            runtime: runtime.clone(),
        });
        let client = AddressBookClient::new(stream, inner.clone(), runtime, config);

        Self {
            inner,
            client,
            request_timeout: config.request_timeout,
        }
    }

    /// Send a request and return its pending reply without waiting.
    ///
    /// # Errors
    ///
    /// `UnexpectedReply` if `name` is `reply`; `ConnectionClosed` or
    /// `Backpressure` if the request cannot be queued. No entry is left
    /// behind on error.
    pub fn issue(&self, name: CommandName, person_id: Option<String>) -> Result<PendingReply> {
        if name.is_reply() {
            return Err(RemoteAddressBookError::UnexpectedReply(
                "a reply cannot be issued as a request".to_string(),
            ));
        }

        let command = Command::request(name, person_id);
        let uuid = command.uuid;
        let rx = self.inner.pending.insert(uuid)?;

        if let Err(e) = self.client.send(&command) {
            self.inner.pending.remove(&uuid);
            return Err(e);
        }

        Ok(PendingReply::new(
            uuid,
            rx,
            self.inner.pending.clone(),
            self.request_timeout,
        ))
    }

    /// Send a request and wait for its reply.
    pub async fn request(&self, name: CommandName, person_id: Option<String>) -> Result<Value> {
        self.issue(name, person_id)?.wait().await
    }

    /// Send a request and run `callback` with the outcome.
    ///
    /// The callback runs exactly once, on the connection's runtime, even when
    /// the request cannot be sent.
    pub fn issue_with<F>(&self, name: CommandName, person_id: Option<String>, callback: F)
    where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        match self.issue(name, person_id) {
            Ok(reply) => {
                self.inner.runtime.spawn(async move { callback(reply.wait().await) });
            }
            Err(e) => {
                self.inner.runtime.spawn(async move { callback(Err(e)) });
            }
        }
    }

    /// Install the handler for requests from the peer, replacing any other.
    pub fn register_command_handler(&self, handler: Arc<dyn CommandHandler>) {
        *self.inner.handler.write() = Some(handler);
    }

    /// Install the sink for connection failures, replacing any other.
    pub fn set_error_handler(&self, error_handler: ErrorHandler) {
        *self.inner.error_handler.write() = Some(error_handler);
    }

    /// Number of requests awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Lifecycle state of the underlying connection.
    pub fn state(&self) -> ConnectionState {
        self.client.state()
    }

    /// Check if the connection is still open.
    pub fn is_connected(&self) -> bool {
        self.client.is_open()
    }

    /// Close the connection. Outstanding requests fail with
    /// `ConnectionClosed` and running handlers are aborted; the error handler
    /// is not called. Idempotent.
    pub fn disconnect(&self) {
        self.client.disconnect();
        self.inner.stop_handlers();
        let failed = self.inner.pending.fail_all();
        if failed > 0 {
            tracing::debug!("disconnect failed {} pending requests", failed);
        }
    }
}

impl Drop for RemoteCommandDispatcher {
    fn drop(&mut self) {
        self.disconnect();
    }
}
